//! Segmentation preview and result PDF commands.

use console::style;

use quizmark::config::Settings;
use quizmark::ocr::count_pages;
use quizmark::pack::{publish_pack, publish_roster};
use quizmark::segmentation::{representative_pages, roster_mapping};
use quizmark::storage::{load_source, LocalBlobStore};
use quizmark::text::split_pages;

use crate::cli::helpers::{download_timeout, format_pages, load_quiz, open_repository, quiz_heading, truncate};

/// Print which pages map to which graded record.
pub async fn cmd_segment(settings: &Settings, id: i64) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let quiz = load_quiz(&repo, id).await?;
    let pdf_ref = quiz
        .pdf_ref
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Quiz {} has no PDF", id))?;

    let bytes = load_source(&pdf_ref, download_timeout(settings)).await?;
    let page_count =
        count_pages(&bytes).ok_or_else(|| anyhow::anyhow!("Cannot read page count of {}", pdf_ref))?;

    let student_count = quiz.graded_results.len();
    let page_texts = split_pages(&quiz.extracted_text);
    let texts = (!page_texts.is_empty()).then_some(page_texts.as_slice());
    let mapping = roster_mapping(page_count, student_count, quiz.block_size(), texts);
    let pack_pages = representative_pages(page_count, student_count, quiz.block_size());

    println!("\n{}", quiz_heading(&quiz));
    println!(
        "{} pages, {} graded record(s), {} page(s) per student, mapping: {}",
        page_count,
        student_count,
        quiz.block_size(),
        style(mapping.source).bold()
    );
    println!("{}", "-".repeat(60));
    println!("{:<4} {:<28} {:<18} {}", "#", "Name", "Roster pages", "Pack page");

    for (i, record) in quiz.graded_results.iter().enumerate() {
        let roster = mapping
            .blocks
            .get(i)
            .map(|pages| format_pages(pages))
            .unwrap_or_else(|| "-".to_string());
        let pack = pack_pages
            .get(i)
            .map(|p| (p + 1).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<28} {:<18} {}",
            i + 1,
            truncate(record.display_name(), 27),
            roster,
            pack
        );
    }

    if student_count > pack_pages.len() {
        println!(
            "  {} {} record(s) have no full page block and are left out of the pack",
            style("!").yellow(),
            student_count - pack_pages.len()
        );
    }
    Ok(())
}

/// Build and store the result pack.
pub async fn cmd_pack(settings: &Settings, id: i64) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let quiz = load_quiz(&repo, id).await?;
    let store = LocalBlobStore::from_settings(settings);

    let artifact = publish_pack(&quiz, &store, download_timeout(settings)).await?;

    println!("{} Pack for {}", style("✓").green(), quiz_heading(&quiz));
    for entry in &artifact.selection.entries {
        let record = &quiz.graded_results[entry.student.student_index];
        println!(
            "  {:<9} page {:>3}  {} ({}/{})",
            entry.role.as_str(),
            entry.student.page_index + 1,
            record.display_name(),
            record.total_score,
            record.max_score
        );
    }
    println!("  {}", artifact.blob.url);
    Ok(())
}

/// Build and store the full-roster document.
pub async fn cmd_roster(settings: &Settings, id: i64) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let quiz = load_quiz(&repo, id).await?;
    let store = LocalBlobStore::from_settings(settings);

    let artifact = publish_roster(&quiz, &store, download_timeout(settings)).await?;

    let annotated = artifact
        .mapping
        .blocks
        .iter()
        .filter(|pages| !pages.is_empty())
        .count();
    println!(
        "{} Roster for {} ({} mapping, {} student(s) annotated)",
        style("✓").green(),
        quiz_heading(&quiz),
        artifact.mapping.source,
        annotated
    );
    println!("  {}", artifact.blob.url);
    Ok(())
}
