//! Copy source pages into a new PDF and stamp overlays on them.
//!
//! Pages are rebuilt as direct children of the root page tree, with
//! inherited attributes (MediaBox, CropBox, Rotate, Resources) copied onto
//! each page so that dropping intermediate tree nodes loses nothing. The
//! original content streams are kept and wrapped in `q ... Q` so the overlay
//! always draws with a clean graphics state.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::models::StudentRecord;
use crate::segmentation::{roster_mapping, RosterMapping};

use super::render::{overlay_operations, Overlay, FONT_BOLD, FONT_REGULAR};
use super::selection::{select_pack, PackSelection};
use super::PackError;

/// US Letter, used when a page declares no MediaBox anywhere in its tree.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page tree depth limit when walking `Parent` links.
const MAX_TREE_DEPTH: usize = 32;

/// One output page: a copy of a source page, optionally annotated.
#[derive(Debug, Clone, Copy)]
pub struct PageJob<'a> {
    /// 0-based page index in the source document.
    pub source_page: usize,
    pub overlay: Option<Overlay<'a>>,
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Look up a page attribute, following `Parent` links for inherited values.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn media_box(doc: &Document, page: &Dictionary) -> [f32; 4] {
    inherited(doc, page, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .and_then(|items| {
            let values: Vec<f32> = items
                .iter()
                .filter_map(|o| resolve(doc, o).as_float().ok())
                .collect();
            match values.as_slice() {
                [x0, y0, x1, y1] => Some([*x0, *y0, *x1, *y1]),
                _ => None,
            }
        })
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

fn stream_object(operations: Vec<Operation>) -> Result<Stream, PackError> {
    let content = Content { operations };
    Ok(Stream::new(dictionary! {}, content.encode()?))
}

/// Existing content stream references of a page, flattened.
fn page_contents(doc: &Document, page: &Dictionary) -> Vec<Object> {
    match page.get(b"Contents") {
        Ok(direct) => match resolve(doc, direct) {
            Object::Array(items) => items.clone(),
            _ => vec![direct.clone()],
        },
        Err(_) => Vec::new(),
    }
}

/// Page resources with the overlay fonts added.
fn resources_with_fonts(
    doc: &Document,
    page: &Dictionary,
    regular: ObjectId,
    bold: ObjectId,
) -> Dictionary {
    let mut resources = inherited(doc, page, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    fonts.set(FONT_REGULAR, regular);
    fonts.set(FONT_BOLD, bold);
    resources.set("Font", fonts);
    resources
}

/// Build a new PDF from `jobs`, in order. Source pages may repeat.
pub fn assemble(mut doc: Document, jobs: &[PageJob<'_>]) -> Result<Vec<u8>, PackError> {
    let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
    let pages_id = doc.get_dictionary(catalog_id)?.get(b"Pages")?.as_reference()?;
    let source_pages = doc.get_pages();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let save_state = doc.add_object(stream_object(vec![Operation::new("q", vec![])])?);

    let mut kids: Vec<Object> = Vec::with_capacity(jobs.len());
    for job in jobs {
        let source_id = *source_pages
            .get(&(job.source_page as u32 + 1))
            .ok_or(PackError::MissingPage(job.source_page))?;
        let source = doc.get_dictionary(source_id)?;

        let mut page = source.clone();
        let [x0, y0, x1, y1] = media_box(&doc, source);
        let media: Vec<Object> = vec![x0.into(), y0.into(), x1.into(), y1.into()];
        page.set("MediaBox", media);
        for key in ["CropBox", "Rotate"] {
            if let Some(value) = inherited(&doc, source, key.as_bytes()) {
                page.set(key, value.clone());
            }
        }
        page.set("Parent", pages_id);

        let overlay_stream = match &job.overlay {
            Some(overlay) => {
                page.set("Resources", resources_with_fonts(&doc, source, regular, bold));
                let mut operations = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
                if x0 != 0.0 || y0 != 0.0 {
                    operations.push(Operation::new(
                        "cm",
                        vec![1.into(), 0.into(), 0.into(), 1.into(), x0.into(), y0.into()],
                    ));
                }
                operations.extend(overlay_operations(overlay, x1 - x0, y1 - y0));
                operations.push(Operation::new("Q", vec![]));
                let mut contents = vec![Object::Reference(save_state)];
                contents.extend(page_contents(&doc, source));
                Some((operations, contents))
            }
            None => {
                if let Some(resources) = inherited(&doc, source, b"Resources") {
                    page.set("Resources", resources.clone());
                }
                None
            }
        };

        if let Some((operations, mut contents)) = overlay_stream {
            let overlay_id = doc.add_object(stream_object(operations)?);
            contents.push(Object::Reference(overlay_id));
            page.set("Contents", contents);
        }

        kids.push(Object::Reference(doc.add_object(page)));
    }

    let count = kids.len() as i64;
    let tree = doc.get_object_mut(pages_id)?.as_dict_mut()?;
    tree.set("Kids", kids);
    tree.set("Count", count);
    if let Ok(catalog) = doc.get_object_mut(catalog_id).and_then(Object::as_dict_mut) {
        // Outline entries point at pages that no longer exist.
        catalog.remove(b"Outlines");
    }

    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    debug!("Assembled {} pages ({} bytes)", count, out.len());
    Ok(out)
}

/// Build the composite pack: one annotated page per selected role.
pub fn build_pack(
    source: &[u8],
    records: &[StudentRecord],
    pages_per_student: usize,
    first_paper_is_solution: bool,
) -> Result<(PackSelection, Vec<u8>), PackError> {
    if records.is_empty() {
        return Err(PackError::NoGradedResults);
    }
    let doc = Document::load_mem(source)?;
    let page_count = doc.get_pages().len();
    let selection = select_pack(records, page_count, pages_per_student, first_paper_is_solution)?;

    let jobs: Vec<PageJob<'_>> = selection
        .entries
        .iter()
        .map(|entry| PageJob {
            source_page: entry.student.page_index,
            overlay: Some(Overlay::pack(
                &records[entry.student.student_index],
                entry.role,
            )),
        })
        .collect();

    let bytes = assemble(doc, &jobs)?;
    Ok((selection, bytes))
}

/// Build the full-roster document: every source page in order, with the
/// first page of each student's block annotated.
pub fn build_roster<S: AsRef<str>>(
    source: &[u8],
    records: &[StudentRecord],
    pages_per_student: usize,
    page_texts: Option<&[S]>,
) -> Result<(RosterMapping, Vec<u8>), PackError> {
    if records.is_empty() {
        return Err(PackError::NoGradedResults);
    }
    let doc = Document::load_mem(source)?;
    let page_count = doc.get_pages().len();
    let mapping = roster_mapping(page_count, records.len(), pages_per_student, page_texts);

    let block_starts: HashMap<usize, usize> = mapping
        .blocks
        .iter()
        .enumerate()
        .filter_map(|(student, pages)| pages.first().map(|&page| (page, student)))
        .collect();

    let jobs: Vec<PageJob<'_>> = (0..page_count)
        .map(|page| PageJob {
            source_page: page,
            overlay: block_starts
                .get(&page)
                .map(|&student| Overlay::roster(&records[student])),
        })
        .collect();

    let bytes = assemble(doc, &jobs)?;
    Ok((mapping, bytes))
}
