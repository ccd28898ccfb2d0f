//! Sanitizing and quality-gating extracted text.

use std::collections::HashSet;

/// Minimum number of ASCII alphanumerics for text to count as meaningful.
pub const MEANINGFUL_MIN_ALNUM: usize = 30;

/// Restrict text to printable ASCII plus newlines and normalize whitespace.
///
/// Non-newline whitespace (tabs, carriage returns, NBSP) becomes a space, every
/// other character outside `0x20..=0x7E` is dropped. Runs of spaces collapse to
/// one, lines are trimmed, and runs of blank lines collapse to a single blank
/// line. Leading and trailing blank lines are removed.
pub fn sanitize(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter_map(|c| {
            if c == '\n' {
                Some('\n')
            } else if c.is_whitespace() {
                Some(' ')
            } else if (' '..='~').contains(&c) {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    let mut out: Vec<String> = Vec::new();
    let mut blank_run = false;
    for line in filtered.split('\n') {
        let collapsed = line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !out.is_empty() && !blank_run {
                out.push(String::new());
            }
            blank_run = true;
        } else {
            out.push(collapsed);
            blank_run = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Count ASCII letters and digits.
pub fn alphanumeric_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_alphanumeric()).count()
}

/// Quality gate used by the OCR cascade to stop at the first good engine.
///
/// An empty string simply fails the gate.
pub fn is_meaningful(text: &str) -> bool {
    alphanumeric_count(text) >= MEANINGFUL_MIN_ALNUM
}

/// Merge several OCR readings of the same page line by line.
///
/// Lines are trimmed, empty lines dropped, and each distinct line is kept
/// once in first-seen order.
pub fn dedup_lines<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut lines = Vec::new();
    for text in texts {
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if seen.insert(line) {
                lines.push(line);
            }
        }
    }
    lines.join("\n")
}

/// Map text onto the character set the standard PDF fonts can render.
pub fn to_pdf_ascii(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_whitespace() {
                ' '
            } else if (' '..='~').contains(&c) {
                c
            } else {
                '?'
            }
        })
        .collect()
}

/// Wrap text to at most `width` characters per line.
///
/// Breaks on spaces where possible; words longer than `width` are split
/// mid-word.
pub fn wrap_hard(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.len()
            } else {
                current.len() + 1 + word.len()
            };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_non_ascii() {
        assert_eq!(sanitize("caf\u{e9} \u{2014} ok"), "caf ok");
    }

    #[test]
    fn test_sanitize_collapses_spaces_and_keeps_newlines() {
        let input = "  Name:   Jane \t Doe \r\nRoll:  12  \n\n\n\nAnswer  one ";
        assert_eq!(sanitize(input), "Name: Jane Doe\nRoll: 12\n\nAnswer one");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(" \n \n\t"), "");
    }

    #[test]
    fn test_meaningful_boundary() {
        let short = "a".repeat(29);
        let exact = "b".repeat(30);
        assert!(!is_meaningful(&short));
        assert!(is_meaningful(&exact));
    }

    #[test]
    fn test_meaningful_ignores_punctuation() {
        let text = format!("{}!!!---   ...", "x1".repeat(14));
        assert_eq!(alphanumeric_count(&text), 28);
        assert!(!is_meaningful(&text));
        assert!(!is_meaningful(""));
    }

    #[test]
    fn test_meaningful_counts_only_ascii_alnum() {
        let text = "\u{e9}".repeat(40);
        assert!(!is_meaningful(&text));
    }

    #[test]
    fn test_dedup_lines_first_seen_order() {
        let merged = dedup_lines(["b\na\n\n", " a \nc", "b\nd"]);
        assert_eq!(merged, "b\na\nc\nd");
    }

    #[test]
    fn test_wrap_hard_breaks_words() {
        let lines = wrap_hard("short words here", 11);
        assert_eq!(lines, vec!["short words", "here"]);

        let lines = wrap_hard("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_to_pdf_ascii() {
        assert_eq!(to_pdf_ascii("x\u{2264}y\tz"), "x?y z");
    }
}
