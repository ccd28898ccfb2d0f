//! Quiz persistence.
//!
//! A single SQLite file holds one row per quiz. Graded results are stored as
//! a JSON array. Every call opens its own connection on a blocking worker so
//! async callers never block the runtime.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::debug;

use crate::models::{Quiz, StudentRecord};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode graded results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("quiz {0} not found")]
    NotFound(i64),

    #[error("database task failed: {0}")]
    Task(String),
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS quizzes (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      title TEXT NOT NULL,
      section TEXT NOT NULL DEFAULT '',
      pdf_ref TEXT,
      pages_per_student INTEGER NOT NULL DEFAULT 1,
      first_paper_is_solution INTEGER NOT NULL DEFAULT 1,
      extracted_text TEXT NOT NULL DEFAULT '',
      ocr_engine TEXT,
      graded_results TEXT NOT NULL DEFAULT '[]',
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
";

const SELECT_COLUMNS: &str = "id, title, section, pdf_ref, pages_per_student, \
     first_paper_is_solution, extracted_text, ocr_engine, graded_results, \
     created_at, updated_at";

fn configure_connection(connection: &Connection) -> rusqlite::Result<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn quiz_from_row(row: &Row<'_>) -> rusqlite::Result<(Quiz, String)> {
    let pages: i64 = row.get(4)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    let quiz = Quiz {
        id: row.get(0)?,
        title: row.get(1)?,
        section: row.get(2)?,
        pdf_ref: row.get(3)?,
        pages_per_student: usize::try_from(pages).unwrap_or(1).max(1),
        first_paper_is_solution: row.get(5)?,
        extracted_text: row.get(6)?,
        ocr_engine: row.get(7)?,
        graded_results: Vec::new(),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    };
    let results_json: String = row.get(8)?;
    Ok((quiz, results_json))
}

/// Attach stored graded results; a corrupt column reads as no results.
fn with_results((mut quiz, json): (Quiz, String)) -> Quiz {
    match serde_json::from_str::<Vec<StudentRecord>>(&json) {
        Ok(results) => quiz.graded_results = results,
        Err(e) => tracing::warn!("Quiz {} has unreadable graded results: {}", quiz.id, e),
    }
    quiz
}

/// SQLite-backed quiz store.
#[derive(Debug, Clone)]
pub struct QuizRepository {
    db_path: PathBuf,
}

impl QuizRepository {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = Connection::open(&path)?;
            configure_connection(&connection)?;
            f(&mut connection)
        })
        .await
        .map_err(|e| RepositoryError::Task(e.to_string()))?
    }

    /// Create the schema if missing.
    pub async fn init_schema(&self) -> Result<(), RepositoryError> {
        debug!("Initializing schema at {}", self.db_path.display());
        self.with_connection(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    /// Insert a new quiz and return its ID.
    pub async fn create(&self, quiz: &Quiz) -> Result<i64, RepositoryError> {
        let quiz = quiz.clone();
        let results = serde_json::to_string(&quiz.graded_results)?;
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO quizzes (title, section, pdf_ref, pages_per_student, \
                 first_paper_is_solution, extracted_text, ocr_engine, graded_results, \
                 created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    quiz.title,
                    quiz.section,
                    quiz.pdf_ref,
                    quiz.block_size() as i64,
                    quiz.first_paper_is_solution,
                    quiz.extracted_text,
                    quiz.ocr_engine,
                    results,
                    quiz.created_at.to_rfc3339(),
                    quiz.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Quiz>, RepositoryError> {
        let row = self
            .with_connection(move |conn| {
                let sql = format!("SELECT {} FROM quizzes WHERE id = ?1", SELECT_COLUMNS);
                Ok(conn.query_row(&sql, params![id], quiz_from_row).optional()?)
            })
            .await?;
        Ok(row.map(with_results))
    }

    /// Like [`get`](Self::get), but a missing quiz is an error.
    pub async fn require(&self, id: i64) -> Result<Quiz, RepositoryError> {
        self.get(id).await?.ok_or(RepositoryError::NotFound(id))
    }

    /// All quizzes, newest first.
    pub async fn list(&self) -> Result<Vec<Quiz>, RepositoryError> {
        let rows = self
            .with_connection(|conn| {
                let sql = format!("SELECT {} FROM quizzes ORDER BY id DESC", SELECT_COLUMNS);
                let mut statement = conn.prepare(&sql)?;
                let rows = statement
                    .query_map([], quiz_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows.into_iter().map(with_results).collect())
    }

    /// Overwrite the OCR text of a quiz.
    pub async fn save_extracted_text(
        &self,
        id: i64,
        text: &str,
        engine: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let text = text.to_string();
        let engine = engine.map(str::to_string);
        let now = Utc::now().to_rfc3339();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE quizzes SET extracted_text = ?1, ocr_engine = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![text, engine, now, id],
            )?;
            if changed == 0 {
                return Err(RepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    /// Overwrite the graded results of a quiz.
    pub async fn save_graded_results(
        &self,
        id: i64,
        results: &[StudentRecord],
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(results)?;
        let now = Utc::now().to_rfc3339();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE quizzes SET graded_results = ?1, updated_at = ?2 WHERE id = ?3",
                params![json, now, id],
            )?;
            if changed == 0 {
                return Err(RepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        self.with_connection(move |conn| {
            Ok(conn.execute("DELETE FROM quizzes WHERE id = ?1", params![id])? > 0)
        })
        .await
    }
}
