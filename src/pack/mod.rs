//! Composite result PDFs.
//!
//! Two artifacts are built from a quiz's scanned PDF and its graded results:
//!
//! - the pack: Solution (optional), Best, Avg and Low pages, each annotated
//!   with a verification stamp, a score badge, a per-question panel and a
//!   role tag
//! - the roster: every source page in order, with the first page of each
//!   student's block annotated

mod assembly;
mod render;
mod selection;

use std::time::Duration;

use thiserror::Error;
use tracing::info;

pub use assembly::{assemble, build_pack, build_roster, PageJob};
pub use render::{format_marks, overlay_operations, panel_lines, Overlay, PANEL_WRAP_WIDTH};
pub use selection::{map_students, select_pack, MappedStudent, PackEntry, PackRole, PackSelection};

use crate::models::Quiz;
use crate::segmentation::RosterMapping;
use crate::storage::{load_source, LocalBlobStore, StorageError, StoredBlob};
use crate::text::{slug, split_pages};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("quiz has no source PDF")]
    MissingSource,

    #[error("quiz has no graded results")]
    NoGradedResults,

    #[error("no student fits in {page_count} pages at {pages_per_student} pages per student")]
    NoMappedStudents {
        page_count: usize,
        pages_per_student: usize,
    },

    #[error("source page {0} does not exist")]
    MissingPage(usize),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to write PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("PDF task failed: {0}")]
    Task(String),
}

/// A stored pack and the pages it was built from.
#[derive(Debug, Clone)]
pub struct PackArtifact {
    pub blob: StoredBlob,
    pub selection: PackSelection,
}

/// A stored roster document and the mapping used to annotate it.
#[derive(Debug, Clone)]
pub struct RosterArtifact {
    pub blob: StoredBlob,
    pub mapping: RosterMapping,
}

/// Readable base name for a quiz's result files.
fn artifact_basename(quiz: &Quiz, suffix: &str) -> String {
    let stem = [slug(&quiz.title), slug(&quiz.section)]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if stem.is_empty() {
        format!("quiz-{}-{}", quiz.id, suffix)
    } else {
        format!("{}-{}", stem, suffix)
    }
}

/// Check the quiz is ready for PDF generation and fetch its source.
async fn prepare(quiz: &Quiz, timeout: Duration) -> Result<Vec<u8>, PackError> {
    let pdf_ref = quiz
        .pdf_ref
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .ok_or(PackError::MissingSource)?;
    if quiz.graded_results.is_empty() {
        return Err(PackError::NoGradedResults);
    }
    Ok(load_source(pdf_ref, timeout).await?)
}

/// Build the composite pack for a quiz and store it.
pub async fn publish_pack(
    quiz: &Quiz,
    store: &LocalBlobStore,
    timeout: Duration,
) -> Result<PackArtifact, PackError> {
    let source = prepare(quiz, timeout).await?;
    let records = quiz.graded_results.clone();
    let pages_per_student = quiz.block_size();
    let with_solution = quiz.first_paper_is_solution;

    let (selection, bytes) = tokio::task::spawn_blocking(move || {
        build_pack(&source, &records, pages_per_student, with_solution)
    })
    .await
    .map_err(|e| PackError::Task(e.to_string()))??;

    let blob = store
        .put_pdf(&artifact_basename(quiz, "pack"), &bytes)
        .await?;
    info!(
        "Pack for quiz {}: {} pages -> {}",
        quiz.id,
        selection.entries.len(),
        blob.url
    );
    Ok(PackArtifact { blob, selection })
}

/// Build the full-roster document for a quiz and store it.
///
/// The quiz's extracted text, when present, feeds header inference for
/// documents that do not split into fixed-size blocks.
pub async fn publish_roster(
    quiz: &Quiz,
    store: &LocalBlobStore,
    timeout: Duration,
) -> Result<RosterArtifact, PackError> {
    let source = prepare(quiz, timeout).await?;
    let records = quiz.graded_results.clone();
    let pages_per_student = quiz.block_size();
    let page_texts = split_pages(&quiz.extracted_text);

    let (mapping, bytes) = tokio::task::spawn_blocking(move || {
        let texts = (!page_texts.is_empty()).then_some(page_texts.as_slice());
        build_roster(&source, &records, pages_per_student, texts)
    })
    .await
    .map_err(|e| PackError::Task(e.to_string()))??;

    let blob = store
        .put_pdf(&artifact_basename(quiz, "roster"), &bytes)
        .await?;
    info!(
        "Roster for quiz {} ({} mapping) -> {}",
        quiz.id, mapping.source, blob.url
    );
    Ok(RosterArtifact { blob, mapping })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRecord;
    use std::path::PathBuf;

    #[test]
    fn test_artifact_basename() {
        let quiz = Quiz::new("Quiz 1", "B", None);
        assert_eq!(artifact_basename(&quiz, "pack"), "quiz_1_b-pack");

        let untitled = Quiz::new("", "", None);
        assert_eq!(artifact_basename(&untitled, "roster"), "quiz-0-roster");
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let store = LocalBlobStore::new(PathBuf::from("/nonexistent"), None);
        let mut quiz = Quiz::new("Quiz 1", "", None);
        quiz.set_graded_results(vec![StudentRecord::default()]);

        let err = publish_pack(&quiz, &store, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::MissingSource));
    }

    #[tokio::test]
    async fn test_no_graded_results_is_fatal() {
        let store = LocalBlobStore::new(PathBuf::from("/nonexistent"), None);
        let quiz = Quiz::new("Quiz 1", "", Some("/tmp/none.pdf".to_string()));

        let err = publish_roster(&quiz, &store, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::NoGradedResults));
    }

    #[tokio::test]
    async fn test_unreadable_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf(), None);
        let mut quiz = Quiz::new(
            "Quiz 1",
            "",
            Some(dir.path().join("missing.pdf").display().to_string()),
        );
        quiz.set_graded_results(vec![StudentRecord::default()]);

        let err = publish_pack(&quiz, &store, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::Storage(StorageError::NotFound(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
