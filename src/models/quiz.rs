//! Quiz record: one scanned answer-script PDF and everything derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::student::StudentRecord;

pub const DEFAULT_PAGES_PER_STUDENT: usize = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    /// Database row ID.
    pub id: i64,
    pub title: String,
    pub section: String,
    /// Local path or http(s) URL of the original multi-page PDF.
    pub pdf_ref: Option<String>,
    /// Block size: consecutive pages belonging to one student.
    pub pages_per_student: usize,
    /// Whether the first block is the answer key.
    pub first_paper_is_solution: bool,
    /// Text from the last OCR run, pages separated by page markers.
    pub extracted_text: String,
    /// Engine that produced `extracted_text`, if any run happened.
    pub ocr_engine: Option<String>,
    /// Grader output in detection order.
    pub graded_results: Vec<StudentRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    /// Create a new, unsaved quiz.
    pub fn new(title: impl Into<String>, section: impl Into<String>, pdf_ref: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Set by database
            title: title.into(),
            section: section.into(),
            pdf_ref,
            pages_per_student: DEFAULT_PAGES_PER_STUDENT,
            first_paper_is_solution: true,
            extracted_text: String::new(),
            ocr_engine: None,
            graded_results: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the block size, clamped to at least one page.
    pub fn with_pages_per_student(mut self, pages: usize) -> Self {
        self.pages_per_student = pages.max(1);
        self
    }

    pub fn with_solution_key(mut self, first_paper_is_solution: bool) -> Self {
        self.first_paper_is_solution = first_paper_is_solution;
        self
    }

    /// Block size as used by segmentation; never zero.
    pub fn block_size(&self) -> usize {
        self.pages_per_student.max(1)
    }

    /// Replace the extracted text from an OCR run.
    pub fn set_extracted_text(&mut self, text: String, engine: Option<&str>) {
        self.extracted_text = text;
        self.ocr_engine = engine.map(str::to_string);
        self.updated_at = Utc::now();
    }

    /// Replace the graded results from a grading run.
    pub fn set_graded_results(&mut self, results: Vec<StudentRecord>) {
        self.graded_results = results;
        self.updated_at = Utc::now();
    }
}
