//! Page-to-student segmentation.
//!
//! Decides which pages of the scanned PDF belong to which graded record.
//! Three modes, strongest signal first:
//!
//! - explicit blocks of `pages_per_student` pages each
//! - blocks inferred from `Name:` / `Roll:` headers in per-page OCR text
//! - an even split of all pages across the roster
//!
//! Every mapping produced here holds, per student, a page list that is
//! unique, ascending and inside `[0, page_count)`.

use std::ops::Range;

use tracing::debug;

use crate::text::has_identity_header;

/// One page list per student, in roster order.
pub type PageMapping = Vec<Vec<usize>>;

/// Number of students that have a full block in the document.
pub fn usable_students(student_count: usize, page_count: usize, pages_per_student: usize) -> usize {
    student_count.min(page_count / pages_per_student.max(1))
}

/// First page of each usable student's block.
pub fn representative_pages(
    page_count: usize,
    student_count: usize,
    pages_per_student: usize,
) -> Vec<usize> {
    let pps = pages_per_student.max(1);
    (0..usable_students(student_count, page_count, pps))
        .map(|i| i * pps)
        .collect()
}

/// Full fixed-size blocks for each usable student.
pub fn block_pages(page_count: usize, student_count: usize, pages_per_student: usize) -> PageMapping {
    let pps = pages_per_student.max(1);
    representative_pages(page_count, student_count, pps)
        .into_iter()
        .map(|start| (start..start + pps).collect())
        .collect()
}

/// Split `page_count` pages over `n` students in order. The first
/// `page_count % n` students get one extra page.
pub fn even_split(page_count: usize, n: usize) -> PageMapping {
    if n == 0 {
        return Vec::new();
    }
    let base = page_count / n;
    let remainder = page_count - base * n;

    let mut next = 0;
    (0..n)
        .map(|i| {
            let size = base + usize::from(i < remainder);
            let pages: Vec<usize> = (next..next + size).collect();
            next += size;
            pages
        })
        .collect()
}

/// Indices of pages whose text carries an identity header.
pub fn header_starts<S: AsRef<str>>(page_texts: &[S]) -> Vec<usize> {
    page_texts
        .iter()
        .enumerate()
        .filter(|(_, text)| has_identity_header(text.as_ref()))
        .map(|(i, _)| i)
        .collect()
}

/// Infer student blocks from identity headers.
///
/// Each header page starts a block that runs up to the next header; the last
/// one runs to the end of the document. Blocks are aligned 1:1 with the
/// roster in order. When there are fewer blocks than students, the trailing
/// block is capped at the estimated block size and every page left uncovered
/// is spread evenly over the students without a block.
///
/// Returns `None` when no page has a header.
pub fn infer_blocks_from_headers<S: AsRef<str>>(
    page_texts: &[S],
    page_count: usize,
    student_count: usize,
) -> Option<PageMapping> {
    let starts: Vec<usize> = header_starts(page_texts)
        .into_iter()
        .filter(|&i| i < page_count)
        .collect();
    let last = *starts.last()?;
    if student_count == 0 {
        return Some(Vec::new());
    }

    let mut ranges: Vec<Range<usize>> = starts.windows(2).map(|w| w[0]..w[1]).collect();
    ranges.push(last..page_count);
    debug!(
        "Header inference: {} blocks for {} students over {} pages",
        ranges.len(),
        student_count,
        page_count
    );

    if ranges.len() >= student_count {
        ranges.truncate(student_count);
        return Some(normalize(
            ranges.into_iter().map(|r| r.collect()).collect(),
            page_count,
        ));
    }

    let estimate = if ranges.len() >= 2 {
        ranges[0].len()
    } else {
        (page_count / student_count).max(1)
    };
    if let Some(trailing) = ranges.last_mut() {
        trailing.end = trailing.end.min(trailing.start + estimate);
    }

    let mut mapping: PageMapping = ranges.iter().map(|r| r.clone().collect()).collect();
    let uncovered: Vec<usize> = (0..page_count)
        .filter(|p| !ranges.iter().any(|r| r.contains(p)))
        .collect();
    let remaining = student_count - ranges.len();
    for share in even_split(uncovered.len(), remaining) {
        mapping.push(share.into_iter().map(|i| uncovered[i]).collect());
    }

    Some(normalize(mapping, page_count))
}

/// Enforce the mapping invariant: each list sorted, unique and in range.
pub fn normalize(mapping: PageMapping, page_count: usize) -> PageMapping {
    mapping
        .into_iter()
        .map(|mut pages| {
            pages.retain(|&p| p < page_count);
            pages.sort_unstable();
            pages.dedup();
            pages
        })
        .collect()
}

/// Which mode produced a roster mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    Blocks,
    Headers,
    EvenSplit,
}

impl MappingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::Blocks => "blocks",
            MappingSource::Headers => "headers",
            MappingSource::EvenSplit => "even-split",
        }
    }
}

impl std::fmt::Display for MappingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMapping {
    pub source: MappingSource,
    pub blocks: PageMapping,
}

/// Page mapping for the full-roster document.
///
/// Explicit blocks when the document is exactly `pages_per_student` pages per
/// student; otherwise header inference when page texts are given and contain
/// at least one header; otherwise an even split.
pub fn roster_mapping<S: AsRef<str>>(
    page_count: usize,
    student_count: usize,
    pages_per_student: usize,
    page_texts: Option<&[S]>,
) -> RosterMapping {
    let pps = pages_per_student.max(1);
    if student_count > 0 && pps * student_count == page_count {
        return RosterMapping {
            source: MappingSource::Blocks,
            blocks: block_pages(page_count, student_count, pps),
        };
    }

    if let Some(blocks) =
        page_texts.and_then(|texts| infer_blocks_from_headers(texts, page_count, student_count))
    {
        return RosterMapping {
            source: MappingSource::Headers,
            blocks,
        };
    }

    RosterMapping {
        source: MappingSource::EvenSplit,
        blocks: even_split(page_count, student_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(mapping: &PageMapping, page_count: usize) {
        for pages in mapping {
            assert!(pages.windows(2).all(|w| w[0] < w[1]), "{:?}", pages);
            assert!(pages.iter().all(|&p| p < page_count), "{:?}", pages);
        }
    }

    #[test]
    fn test_representative_pages() {
        assert_eq!(representative_pages(10, 5, 2), vec![0, 2, 4, 6, 8]);
        // Truncated by page count.
        assert_eq!(representative_pages(5, 5, 2), vec![0, 2]);
        // Truncated by roster size.
        assert_eq!(representative_pages(10, 2, 2), vec![0, 2]);
        assert_eq!(representative_pages(0, 3, 1), Vec::<usize>::new());
        // Zero block size treated as one.
        assert_eq!(representative_pages(3, 3, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_representative_pages_deterministic() {
        for _ in 0..3 {
            assert_eq!(representative_pages(9, 4, 3), vec![0, 3, 6]);
        }
    }

    #[test]
    fn test_block_pages() {
        assert_eq!(block_pages(8, 4, 2), vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]]);
        assert_eq!(block_pages(5, 3, 2), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_even_split_example() {
        let split = even_split(7, 3);
        assert_eq!(split, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn test_even_split_fairness() {
        for page_count in 0..25 {
            for n in 1..8 {
                let split = even_split(page_count, n);
                assert_eq!(split.len(), n);
                let sizes: Vec<usize> = split.iter().map(Vec::len).collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
                let flat: Vec<usize> = split.concat();
                assert_eq!(flat, (0..page_count).collect::<Vec<_>>());
            }
        }
        assert!(even_split(4, 0).is_empty());
    }

    #[test]
    fn test_headers_one_block_spills_to_second_student() {
        let pages = ["Name: Jane\nRoll: 12\n----\nanswer one", "answer two, no header"];
        let mapping = infer_blocks_from_headers(&pages, 2, 2).unwrap();
        assert_eq!(mapping, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_headers_match_roster() {
        let pages = [
            "Name: A\nRoll: 1",
            "more of A",
            "NAME: B\nROLL: 2",
            "more of B",
            "still B",
        ];
        let mapping = infer_blocks_from_headers(&pages, 5, 2).unwrap();
        assert_eq!(mapping, vec![vec![0, 1], vec![2, 3, 4]]);
    }

    #[test]
    fn test_headers_more_blocks_than_students() {
        let pages = ["Name: A Roll: 1", "Name: B Roll: 2", "Name: C Roll: 3"];
        let mapping = infer_blocks_from_headers(&pages, 3, 2).unwrap();
        assert_eq!(mapping, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_headers_caps_trailing_block_by_first_range() {
        // Two headers two pages apart; the trailing block would otherwise
        // swallow the remaining four pages.
        let pages = [
            "Name: A Roll: 1",
            "",
            "Name: B Roll: 2",
            "",
            "",
            "",
            "",
            "",
        ];
        let mapping = infer_blocks_from_headers(&pages, 8, 4).unwrap();
        assert_eq!(mapping, vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]]);
        assert_invariant(&mapping, 8);
    }

    #[test]
    fn test_headers_leading_pages_are_uncovered() {
        let pages = ["illegible key page", "Name: A Roll: 1", "A continued"];
        let mapping = infer_blocks_from_headers(&pages, 3, 2).unwrap();
        // Block for A capped at 3 / 2 = 1 page; pages 0 and 2 go to the second student.
        assert_eq!(mapping, vec![vec![1], vec![0, 2]]);
        assert_invariant(&mapping, 3);
    }

    #[test]
    fn test_no_headers() {
        let pages = ["nothing here", "or here"];
        assert_eq!(infer_blocks_from_headers(&pages, 2, 2), None);
    }

    #[test]
    fn test_header_pages_beyond_document_ignored() {
        let pages = ["Name: A Roll: 1", "x", "Name: B Roll: 2"];
        let mapping = infer_blocks_from_headers(&pages, 2, 1).unwrap();
        assert_eq!(mapping, vec![vec![0, 1]]);
    }

    #[test]
    fn test_normalize() {
        let mapping = normalize(vec![vec![3, 1, 1, 9], vec![]], 4);
        assert_eq!(mapping, vec![vec![1, 3], vec![]]);
    }

    #[test]
    fn test_roster_mapping_resolution_order() {
        let texts = vec!["Name: A Roll: 1".to_string(), "x".into(), "y".into()];

        let exact = roster_mapping(4, 2, 2, Some(texts.as_slice()));
        assert_eq!(exact.source, MappingSource::Blocks);
        assert_eq!(exact.blocks, vec![vec![0, 1], vec![2, 3]]);

        let headers = roster_mapping(3, 2, 2, Some(texts.as_slice()));
        assert_eq!(headers.source, MappingSource::Headers);
        assert_invariant(&headers.blocks, 3);

        let split = roster_mapping::<String>(5, 2, 2, None);
        assert_eq!(split.source, MappingSource::EvenSplit);
        assert_eq!(split.blocks, vec![vec![0, 1, 2], vec![3, 4]]);

        let empty = roster_mapping::<String>(0, 2, 1, None);
        assert_eq!(empty.blocks, vec![Vec::<usize>::new(), Vec::new()]);
    }
}
