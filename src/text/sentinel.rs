//! Deterministic identity strings for papers without a legible student.
//!
//! The OCR step writes these into the `Name:` header of a block's first page,
//! and pack selection recognises them again when picking the solution key.

/// Name prefix marking the solution key paper.
pub const SOLUTION_PREFIX: &str = "solution_paper_";

/// Name prefix marking a paper whose student identity was not legible.
pub const UNKNOWN_PREFIX: &str = "unknown_";

/// Lowercase, trim, turn whitespace runs into `_`, keep only `[a-z0-9_-]`.
pub fn slug(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

fn sentinel(prefix: &str, title: &str, section: &str) -> String {
    let mut out = format!("{}{}", prefix, slug(title));
    let section = slug(section);
    if !section.is_empty() {
        out.push('_');
        out.push_str(&section);
    }
    out
}

/// `solution_paper_<slug(title)>[_<slug(section)>]`
pub fn solution_sentinel(title: &str, section: &str) -> String {
    sentinel(SOLUTION_PREFIX, title, section)
}

/// `unknown_<slug(title)>[_<slug(section)>]`
pub fn unknown_sentinel(title: &str, section: &str) -> String {
    sentinel(UNKNOWN_PREFIX, title, section)
}

/// True when the page text carries both a `name:` and a `roll:` label.
pub fn has_identity_header(page_text: &str) -> bool {
    let lower = page_text.to_lowercase();
    lower.contains("name:") && lower.contains("roll:")
}
