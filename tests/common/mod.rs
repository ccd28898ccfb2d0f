//! Shared fixtures: small in-memory PDFs and content inspection.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use quizmark::models::StudentRecord;

/// A PDF with one page per entry in `texts`, each page showing its text.
///
/// MediaBox and Resources live on the page tree node so pages only have them
/// by inheritance.
pub fn make_pdf(texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(
        dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica" },
    );
    let resources_id = doc.add_object(dictionary! { "Font" => dictionary! { "F1" => font_id } });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 18.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(*text)]),
            Operation::new("ET", vec![]),
        ];
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Strings shown with `Tj` on a 1-based page.
pub fn shown_strings(doc: &Document, page_number: u32) -> Vec<String> {
    let pages = doc.get_pages();
    let page_id = pages[&page_number];
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}

/// The source text a page was copied from (`Page N` markers drawn by [`make_pdf`]).
pub fn source_marker(doc: &Document, page_number: u32) -> Option<String> {
    shown_strings(doc, page_number)
        .into_iter()
        .find(|s| s.starts_with("Page "))
}

pub fn record(name: &str, score: f64) -> StudentRecord {
    StudentRecord {
        name: Some(name.to_string()),
        roll: Some(format!("R-{}", name)),
        total_score: score,
        max_score: 100.0,
        ..Default::default()
    }
}

pub fn numbered_pages(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("Page {}", n)).collect()
}

pub fn as_strs(texts: &[String]) -> Vec<&str> {
    texts.iter().map(String::as_str).collect()
}
