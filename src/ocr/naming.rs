//! Naming context for one OCR run.
//!
//! Engines that transcribe page images through a language model prepend a
//! `Name:` / `Roll:` header to the first page of every student block. The
//! header values for the solution key and for illegible papers are fixed
//! sentinels derived from the quiz title and section, so pack selection can
//! recognise them later.
//!
//! The context is passed to strategies explicitly. A single process-wide
//! slot also holds the active context; [`NamingLock::acquire`] serializes
//! OCR runs on it and resets it to neutral when the run ends, however it
//! ends.

use std::ops::Deref;
use std::sync::LazyLock;

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::models::Quiz;
use crate::text::{solution_sentinel, unknown_sentinel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingContext {
    pub is_first_page_solution: bool,
    pub quiz_title: String,
    pub section: String,
    pub pages_per_student: usize,
}

impl Default for NamingContext {
    /// Neutral context: no solution key, no title, one page per student.
    fn default() -> Self {
        Self {
            is_first_page_solution: false,
            quiz_title: String::new(),
            section: String::new(),
            pages_per_student: 1,
        }
    }
}

/// Position of a page inside its student block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    /// First page of the answer key block.
    SolutionStart,
    /// First page of a student block.
    StudentStart,
    /// Any later page of a block.
    Continuation,
}

const TRANSCRIBE_RULES: &str = "Transcribe all text on this page exactly as written, \
including handwriting. Preserve line breaks. Return plain text only, with no \
explanations, summaries or markdown.";

impl NamingContext {
    pub fn for_quiz(quiz: &Quiz) -> Self {
        Self {
            is_first_page_solution: quiz.first_paper_is_solution,
            quiz_title: quiz.title.clone(),
            section: quiz.section.clone(),
            pages_per_student: quiz.block_size(),
        }
    }

    fn block_size(&self) -> usize {
        self.pages_per_student.max(1)
    }

    pub fn solution_name(&self) -> String {
        solution_sentinel(&self.quiz_title, &self.section)
    }

    pub fn unknown_name(&self) -> String {
        unknown_sentinel(&self.quiz_title, &self.section)
    }

    /// Role of a 0-based page index.
    pub fn page_role(&self, page_index: usize) -> PageRole {
        let block = self.block_size();
        if page_index % block != 0 {
            PageRole::Continuation
        } else if page_index == 0 && self.is_first_page_solution {
            PageRole::SolutionStart
        } else {
            PageRole::StudentStart
        }
    }

    /// System instruction for transcribing the page at `page_index`.
    pub fn page_instruction(&self, page_index: usize) -> String {
        match self.page_role(page_index) {
            PageRole::SolutionStart => {
                let name = self.solution_name();
                format!(
                    "This page is the first page of the answer key. Begin your output \
                     with exactly these two lines:\nName: {name}\nRoll: {name}\n\
                     Then continue on the next line. {TRANSCRIBE_RULES}"
                )
            }
            PageRole::StudentStart => {
                let unknown = self.unknown_name();
                format!(
                    "This page is the first page of a student's answer script. Begin \
                     your output with exactly two lines:\nName: <student name as \
                     written>\nRoll: <roll number as written>\nIf the name or roll \
                     number is not legible, use {unknown} as that value. Then continue \
                     on the next line. {TRANSCRIBE_RULES}"
                )
            }
            PageRole::Continuation => format!(
                "This page continues a student's answer script. Do not add any Name or \
                 Roll header. {TRANSCRIBE_RULES}"
            ),
        }
    }
}

static ACTIVE: LazyLock<Mutex<NamingContext>> =
    LazyLock::new(|| Mutex::new(NamingContext::default()));

/// Exclusive hold on the process-wide naming slot for one OCR run.
///
/// Dropping the lock restores the neutral context before releasing.
pub struct NamingLock {
    guard: MutexGuard<'static, NamingContext>,
}

impl NamingLock {
    /// Wait for any running OCR job to finish, then install `context`.
    pub async fn acquire(context: NamingContext) -> Self {
        let mut guard = ACTIVE.lock().await;
        debug!(
            "Naming context set: title={:?} section={:?} pages_per_student={} solution={}",
            context.quiz_title,
            context.section,
            context.pages_per_student,
            context.is_first_page_solution
        );
        *guard = context;
        Self { guard }
    }

    /// True while some OCR run holds the slot.
    #[cfg(test)]
    pub fn is_held() -> bool {
        ACTIVE.try_lock().is_err()
    }

    /// Copy of the slot once it is free.
    #[cfg(test)]
    pub async fn idle_context() -> NamingContext {
        ACTIVE.lock().await.clone()
    }
}

impl Deref for NamingLock {
    type Target = NamingContext;

    fn deref(&self) -> &NamingContext {
        &self.guard
    }
}

impl Drop for NamingLock {
    fn drop(&mut self) {
        *self.guard = NamingContext::default();
        debug!("Naming context reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(pages: usize, solution: bool) -> NamingContext {
        NamingContext {
            is_first_page_solution: solution,
            quiz_title: "Unit Test".to_string(),
            section: "B".to_string(),
            pages_per_student: pages,
        }
    }

    #[test]
    fn test_page_roles() {
        let ctx = context(2, true);
        assert_eq!(ctx.page_role(0), PageRole::SolutionStart);
        assert_eq!(ctx.page_role(1), PageRole::Continuation);
        assert_eq!(ctx.page_role(2), PageRole::StudentStart);
        assert_eq!(ctx.page_role(3), PageRole::Continuation);

        let ctx = context(2, false);
        assert_eq!(ctx.page_role(0), PageRole::StudentStart);
    }

    #[test]
    fn test_zero_block_size_treated_as_one() {
        let ctx = context(0, false);
        assert_eq!(ctx.page_role(5), PageRole::StudentStart);
    }

    #[test]
    fn test_instructions_carry_sentinels() {
        let ctx = context(2, true);
        assert!(ctx
            .page_instruction(0)
            .contains("Name: solution_paper_unit_test_b"));
        assert!(ctx.page_instruction(2).contains("unknown_unit_test_b"));
        let cont = ctx.page_instruction(3);
        assert!(!cont.contains("unknown_"));
        assert!(cont.contains("Do not add any Name or Roll header"));
    }

    #[tokio::test]
    async fn test_lock_resets_and_serializes() {
        let first = NamingLock::acquire(context(3, true)).await;
        assert_eq!(first.pages_per_student, 3);
        assert!(NamingLock::is_held());

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order2 = Arc::clone(&order);
        let waiter = tokio::spawn(async move {
            let lock = NamingLock::acquire(context(1, false)).await;
            order2.lock().unwrap().push("second");
            assert!(!lock.is_first_page_solution);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().unwrap().push("first");
        drop(first);

        waiter.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(NamingLock::idle_context().await, NamingContext::default());
    }
}
