//! Graded result import.

use std::path::Path;

use anyhow::Context;
use console::style;

use quizmark::config::Settings;
use quizmark::models::{parse_graded_results, PaperRole};

use crate::cli::helpers::{load_quiz, open_repository, quiz_heading};

/// Replace a quiz's graded results with the records in `file`.
pub async fn cmd_grades_import(settings: &Settings, id: i64, file: &Path) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let quiz = load_quiz(&repo, id).await?;

    let json = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = parse_graded_results(&json)
        .with_context(|| format!("{} is not a graded results document", file.display()))?;

    if records.is_empty() {
        anyhow::bail!("{} contains no student records", file.display());
    }

    repo.save_graded_results(quiz.id, &records).await?;

    let solutions = records
        .iter()
        .filter(|r| r.effective_role() == PaperRole::Solution)
        .count();
    println!(
        "{} Imported {} record(s) into {}",
        style("✓").green(),
        records.len(),
        quiz_heading(&quiz)
    );
    if solutions > 0 {
        println!("  {} marked as solution key", solutions);
    }
    if quiz.first_paper_is_solution && solutions == 0 {
        println!(
            "  {} No record is marked as the solution key; the first mapped paper will be used",
            style("!").yellow()
        );
    }
    Ok(())
}
