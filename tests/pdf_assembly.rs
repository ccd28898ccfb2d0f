//! Pack and roster PDFs built end to end from generated source PDFs.

mod common;

use lopdf::Document;

use quizmark::models::PaperRole;
use quizmark::pack::{assemble, build_pack, build_roster, PackError, PackRole, PageJob};
use quizmark::segmentation::MappingSource;

use common::{as_strs, make_pdf, numbered_pages, record, shown_strings, source_marker};

#[test]
fn test_pack_pages_follow_role_order() {
    // Four students, two pages each, solution key first.
    let texts = numbered_pages(8);
    let source = make_pdf(&as_strs(&texts));
    let records = vec![
        record("solution_paper_quiz_1", 100.0),
        record("Ravi", 55.0),
        record("Mina", 92.0),
        record("Omar", 18.0),
    ];

    let (selection, bytes) = build_pack(&source, &records, 2, true).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 4);

    let roles: Vec<PackRole> = selection.entries.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![PackRole::Solution, PackRole::Best, PackRole::Avg, PackRole::Low]
    );

    // Solution page 0, Best page 4 (92), Avg page 2 (55), Low page 6 (18).
    assert_eq!(source_marker(&doc, 1).as_deref(), Some("Page 1"));
    assert_eq!(source_marker(&doc, 2).as_deref(), Some("Page 5"));
    assert_eq!(source_marker(&doc, 3).as_deref(), Some("Page 3"));
    assert_eq!(source_marker(&doc, 4).as_deref(), Some("Page 7"));

    for (page, tag) in (1..=4).zip(["Solution", "Best", "Avg", "Low"]) {
        let shown = shown_strings(&doc, page);
        assert!(shown.iter().any(|s| s == tag), "page {} lacks tag {}", page, tag);
        assert!(shown.iter().any(|s| s == "VERIFIED"));
    }

    let solution_panel = shown_strings(&doc, 1);
    assert!(solution_panel
        .iter()
        .any(|s| s.starts_with("SOLUTION KEY - Name: solution_paper_quiz_1")));
}

#[test]
fn test_pack_without_solution_flag() {
    // Three single-page papers, no solution key.
    let texts = numbered_pages(3);
    let source = make_pdf(&as_strs(&texts));
    let records = vec![record("A", 40.0), record("B", 90.0), record("C", 10.0)];

    let (selection, bytes) = build_pack(&source, &records, 1, false).unwrap();
    assert_eq!(selection.entries.len(), 3);

    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
    assert_eq!(source_marker(&doc, 1).as_deref(), Some("Page 2"));
    assert_eq!(source_marker(&doc, 2).as_deref(), Some("Page 1"));
    assert_eq!(source_marker(&doc, 3).as_deref(), Some("Page 3"));
}

#[test]
fn test_single_paper_repeats_page() {
    let source = make_pdf(&["Page 1"]);
    let records = vec![record("Only", 12.0)];

    let (_, bytes) = build_pack(&source, &records, 1, true).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 4);
    for page in 1..=4 {
        assert_eq!(source_marker(&doc, page).as_deref(), Some("Page 1"));
    }
}

#[test]
fn test_explicit_role_marks_solution_panel() {
    let source = make_pdf(&["Page 1", "Page 2"]);
    let mut key = record("Answer Key", 0.0);
    key.role = Some(PaperRole::Solution);
    let records = vec![record("Jane", 60.0), key];

    let (selection, bytes) = build_pack(&source, &records, 1, true).unwrap();
    assert_eq!(selection.page_of(PackRole::Solution), Some(1));

    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(source_marker(&doc, 1).as_deref(), Some("Page 2"));
}

#[test]
fn test_pack_errors() {
    let source = make_pdf(&["Page 1"]);
    assert!(matches!(
        build_pack(&source, &[], 1, true),
        Err(PackError::NoGradedResults)
    ));
    assert!(matches!(
        build_pack(&source, &[record("A", 1.0)], 2, true),
        Err(PackError::NoMappedStudents {
            page_count: 1,
            pages_per_student: 2
        })
    ));
    assert!(matches!(
        build_pack(b"not a pdf", &[record("A", 1.0)], 1, true),
        Err(PackError::Pdf(_))
    ));
}

#[test]
fn test_roster_annotates_block_starts() {
    let texts = numbered_pages(6);
    let source = make_pdf(&as_strs(&texts));
    let records = vec![record("A", 10.0), record("B", 20.0), record("C", 30.0)];

    let (mapping, bytes) = build_roster::<String>(&source, &records, 2, None).unwrap();
    assert_eq!(mapping.source, MappingSource::Blocks);

    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 6);
    for page in 1..=6u32 {
        assert_eq!(
            source_marker(&doc, page),
            Some(format!("Page {}", page)),
            "roster keeps source order"
        );
        let annotated = shown_strings(&doc, page)
            .iter()
            .any(|s| s.starts_with("Name: "));
        assert_eq!(annotated, page % 2 == 1, "page {}", page);
    }

    // Roster pages carry no stamp or role tag.
    let first = shown_strings(&doc, 1);
    assert!(!first.iter().any(|s| s == "VERIFIED"));
    assert!(first.iter().any(|s| s == "Name: A | Roll: R-A | Score: 10/100"));
}

#[test]
fn test_roster_uses_headers_from_page_text() {
    // Only the first page has a header; page two spills to the
    // second student.
    let source = make_pdf(&["Page 1", "Page 2"]);
    let records = vec![record("Jane", 70.0), record("Ravi", 50.0)];
    let page_texts = vec![
        "Name: Jane\nRoll: 12\n----\nanswer".to_string(),
        "no header here".to_string(),
    ];

    let (mapping, bytes) =
        build_roster(&source, &records, 2, Some(page_texts.as_slice())).unwrap();
    assert_eq!(mapping.source, MappingSource::Headers);
    assert_eq!(mapping.blocks, vec![vec![0], vec![1]]);

    let doc = Document::load_mem(&bytes).unwrap();
    assert!(shown_strings(&doc, 1).iter().any(|s| s.contains("Name: Jane")));
    assert!(shown_strings(&doc, 2).iter().any(|s| s.contains("Name: Ravi")));
}

#[test]
fn test_roster_even_split_without_text() {
    let texts = numbered_pages(5);
    let source = make_pdf(&as_strs(&texts));
    let records = vec![record("A", 1.0), record("B", 2.0)];

    let (mapping, bytes) = build_roster::<String>(&source, &records, 2, None).unwrap();
    assert_eq!(mapping.source, MappingSource::EvenSplit);
    assert_eq!(mapping.blocks, vec![vec![0, 1, 2], vec![3, 4]]);

    let doc = Document::load_mem(&bytes).unwrap();
    assert!(shown_strings(&doc, 4).iter().any(|s| s.contains("Name: B")));
    assert!(!shown_strings(&doc, 2).iter().any(|s| s.starts_with("Name: ")));
}

#[test]
fn test_assemble_rejects_missing_page() {
    let doc = Document::load_mem(&make_pdf(&["Page 1"])).unwrap();
    let jobs = [PageJob {
        source_page: 3,
        overlay: None,
    }];
    assert!(matches!(assemble(doc, &jobs), Err(PackError::MissingPage(3))));
}

#[test]
fn test_assemble_keeps_inherited_page_box() {
    let doc = Document::load_mem(&make_pdf(&["Page 1", "Page 2"])).unwrap();
    let jobs = [
        PageJob {
            source_page: 1,
            overlay: None,
        },
        PageJob {
            source_page: 1,
            overlay: None,
        },
    ];
    let out = Document::load_mem(&assemble(doc, &jobs).unwrap()).unwrap();
    let pages = out.get_pages();
    assert_eq!(pages.len(), 2);
    for id in pages.values() {
        let page = out.get_dictionary(*id).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_float().unwrap(), 595.0);
        assert!(page.get(b"Resources").is_ok());
    }
    assert_eq!(source_marker(&out, 2).as_deref(), Some("Page 2"));
}
