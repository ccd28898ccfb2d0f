//! Which pages make up the composite result pack.
//!
//! Graded records are mapped onto fixed-size page blocks in arrival order.
//! The solution key (when flagged) is set aside, the rest are ranked by
//! score, and the Best, Avg and Low papers are picked from that ranking.
//! Avg is the middle paper of the ranking, never a computed mean, so every
//! pick is a real page.

use crate::models::{PaperRole, StudentRecord};
use crate::segmentation::representative_pages;

use super::PackError;

/// Role of one page in the pack. Output order follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackRole {
    Solution,
    Best,
    Avg,
    Low,
}

impl PackRole {
    /// Corner tag drawn on the page.
    pub fn as_str(&self) -> &'static str {
        match self {
            PackRole::Solution => "Solution",
            PackRole::Best => "Best",
            PackRole::Avg => "Avg",
            PackRole::Low => "Low",
        }
    }
}

impl std::fmt::Display for PackRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A graded record placed on its representative page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedStudent {
    /// Position in the graded results.
    pub student_index: usize,
    /// 0-based page index in the source PDF.
    pub page_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackEntry {
    pub role: PackRole,
    pub student: MappedStudent,
}

/// Chosen pages, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSelection {
    pub entries: Vec<PackEntry>,
}

impl PackSelection {
    pub fn get(&self, role: PackRole) -> Option<&PackEntry> {
        self.entries.iter().find(|e| e.role == role)
    }

    pub fn page_of(&self, role: PackRole) -> Option<usize> {
        self.get(role).map(|e| e.student.page_index)
    }
}

/// Map records to the first page of their block.
pub fn map_students(
    records: &[StudentRecord],
    page_count: usize,
    pages_per_student: usize,
) -> Vec<MappedStudent> {
    representative_pages(page_count, records.len(), pages_per_student)
        .into_iter()
        .enumerate()
        .map(|(student_index, page_index)| MappedStudent {
            student_index,
            page_index,
        })
        .collect()
}

/// Position in `mapped` of the solution key paper.
///
/// An explicit solution role wins, then a sentinel-named paper, then the
/// first mapped paper.
fn find_solution(records: &[StudentRecord], mapped: &[MappedStudent]) -> usize {
    let role_of = |m: &MappedStudent| records[m.student_index].role;
    if let Some(pos) = mapped
        .iter()
        .position(|m| role_of(m) == Some(PaperRole::Solution))
    {
        return pos;
    }
    mapped
        .iter()
        .position(|m| {
            matches!(
                records[m.student_index].effective_role(),
                PaperRole::Solution | PaperRole::Unknown
            )
        })
        .unwrap_or(0)
}

/// Choose the Solution, Best, Avg and Low pages.
pub fn select_pack(
    records: &[StudentRecord],
    page_count: usize,
    pages_per_student: usize,
    first_paper_is_solution: bool,
) -> Result<PackSelection, PackError> {
    if records.is_empty() {
        return Err(PackError::NoGradedResults);
    }
    let mapped = map_students(records, page_count, pages_per_student);
    if mapped.is_empty() {
        return Err(PackError::NoMappedStudents {
            page_count,
            pages_per_student,
        });
    }

    let mut pool = mapped.clone();
    let mut entries = Vec::with_capacity(4);
    let solution = if first_paper_is_solution {
        let chosen = pool.remove(find_solution(records, &mapped));
        entries.push(PackEntry {
            role: PackRole::Solution,
            student: chosen,
        });
        Some(chosen)
    } else {
        None
    };

    // Stable: equal scores keep arrival order.
    pool.sort_by(|a, b| {
        records[b.student_index]
            .total_score
            .total_cmp(&records[a.student_index].total_score)
    });

    let fallback = solution.unwrap_or(mapped[0]);
    let best = pool.first().copied().unwrap_or(fallback);
    let avg = pool.get(pool.len() / 2).copied().unwrap_or(fallback);
    let low = pool.last().copied().unwrap_or(fallback);

    entries.extend([
        PackEntry {
            role: PackRole::Best,
            student: best,
        },
        PackEntry {
            role: PackRole::Avg,
            student: avg,
        },
        PackEntry {
            role: PackRole::Low,
            student: low,
        },
    ]);
    Ok(PackSelection { entries })
}
