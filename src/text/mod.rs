//! Text normalization shared by the OCR cascade and the pack builder.
//!
//! - `normalize`: sanitizing OCR output and the meaningfulness gate
//! - `sentinel`: deterministic identity strings for solution / unreadable papers
//! - `pages`: joining and splitting per-page text with page markers

mod normalize;
mod pages;
mod sentinel;

pub use normalize::{
    alphanumeric_count, dedup_lines, is_meaningful, sanitize, to_pdf_ascii, wrap_hard,
    MEANINGFUL_MIN_ALNUM,
};
pub use pages::{join_pages, page_marker, split_pages};
pub use sentinel::{
    has_identity_header, slug, solution_sentinel, unknown_sentinel, SOLUTION_PREFIX,
    UNKNOWN_PREFIX,
};
