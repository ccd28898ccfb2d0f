//! Data models for quizmark.

mod lenient;
mod quiz;
mod student;

pub use quiz::{Quiz, DEFAULT_PAGES_PER_STUDENT};
pub use student::{parse_graded_results, PaperRole, Question, StudentRecord, Subpart};
