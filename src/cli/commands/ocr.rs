//! OCR command: run the engine cascade for one quiz.

use console::style;

use quizmark::config::{OcrSettings, Settings};
use quizmark::ocr::{AttemptOutcome, EngineMode, OcrCascade};
use quizmark::storage::load_source;

use crate::cli::helpers::{download_timeout, format_bytes, load_quiz, open_repository, quiz_heading};

/// Extract text for a quiz and overwrite its stored text.
pub async fn cmd_ocr(
    settings: &Settings,
    ocr_settings: &OcrSettings,
    id: i64,
    engine: &str,
) -> anyhow::Result<()> {
    let mode = EngineMode::from_str(engine).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown engine '{}'. Use auto, embedded, document, llm, gemini, vision or tesseract.",
            engine
        )
    })?;

    let repo = open_repository(settings)?;
    let mut quiz = load_quiz(&repo, id).await?;
    let pdf_ref = quiz
        .pdf_ref
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Quiz {} has no PDF", id))?;

    let bytes = load_source(&pdf_ref, download_timeout(settings)).await?;
    println!(
        "{} OCR {} ({}, engine {})",
        style("→").cyan(),
        quiz_heading(&quiz),
        format_bytes(bytes.len() as u64),
        mode
    );

    let cascade = OcrCascade::from_settings(ocr_settings);
    let report = cascade.run_for_quiz(&mut quiz, bytes, mode).await?;

    for attempt in &report.attempts {
        let marker = match attempt.outcome {
            AttemptOutcome::Meaningful => style("✓").green(),
            AttemptOutcome::LowQuality(_) => style("~").yellow(),
            AttemptOutcome::Failed(_) => style("✗").red(),
            AttemptOutcome::Unavailable(_) => style("-").dim(),
        };
        println!(
            "  {} {:<10} {:>7} ms  {}",
            marker,
            attempt.engine,
            attempt.elapsed_ms(),
            attempt.outcome
        );
    }

    repo.save_extracted_text(quiz.id, &quiz.extracted_text, quiz.ocr_engine.as_deref())
        .await?;

    match report.engine {
        Some(engine) if !report.exhausted => println!(
            "{} Extracted {} chars from {} page(s) via {}{}",
            style("✓").green(),
            report.text_len(),
            report.pages.len(),
            engine,
            report
                .model
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        ),
        Some(engine) => println!(
            "{} No engine produced meaningful text; kept {} chars from {}",
            style("!").yellow(),
            report.text_len(),
            engine
        ),
        None => println!(
            "{} No engine produced any text; extracted text cleared",
            style("!").yellow()
        ),
    }

    Ok(())
}
