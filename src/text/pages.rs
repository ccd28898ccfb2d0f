//! Per-page text joined into one document with page markers.

use std::sync::LazyLock;

use regex::Regex;

static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--- Page (\d+) ---$").expect("page marker regex is valid")
});

/// Marker line placed before page `number` (1-based).
pub fn page_marker(number: usize) -> String {
    format!("--- Page {} ---", number)
}

/// Join page texts, each preceded by its marker line.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let text = text.as_ref().trim();
            if text.is_empty() {
                page_marker(i + 1)
            } else {
                format!("{}\n{}", page_marker(i + 1), text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split text produced by [`join_pages`] back into per-page texts.
///
/// Text without any marker is treated as a single page. Empty input gives no
/// pages.
pub fn split_pages(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut pages: Vec<Vec<&str>> = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();
    for line in text.lines() {
        if PAGE_MARKER.is_match(line.trim()) {
            pages.push(Vec::new());
        } else if let Some(current) = pages.last_mut() {
            current.push(line);
        } else {
            preamble.push(line);
        }
    }

    if pages.is_empty() {
        return vec![text.trim().to_string()];
    }

    // Anything before the first marker belongs to page one.
    if preamble.iter().any(|l| !l.trim().is_empty()) {
        let mut first = preamble;
        first.append(&mut pages[0]);
        pages[0] = first;
    }

    pages
        .into_iter()
        .map(|lines| lines.join("\n").trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages_format() {
        let joined = join_pages(&["first page", "second"]);
        assert_eq!(
            joined,
            "--- Page 1 ---\nfirst page\n\n--- Page 2 ---\nsecond"
        );
    }

    #[test]
    fn test_split_pages_keeps_empty_pages() {
        let joined = join_pages(&["Name: A\nRoll: 1", "", "tail"]);
        let pages = split_pages(&joined);
        assert_eq!(pages, vec!["Name: A\nRoll: 1", "", "tail"]);
    }

    #[test]
    fn test_split_pages_without_markers() {
        assert_eq!(split_pages("just text\nmore"), vec!["just text\nmore"]);
        assert!(split_pages("  \n").is_empty());
    }
}
