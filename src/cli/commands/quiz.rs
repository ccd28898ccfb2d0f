//! Quiz management commands.

use std::path::Path;

use console::style;

use quizmark::config::Settings;
use quizmark::models::Quiz;
use quizmark::text::split_pages;

use crate::cli::helpers::{load_quiz, open_repository, quiz_heading, truncate};

/// Register a new quiz.
pub async fn cmd_quiz_create(
    settings: &Settings,
    pdf: &str,
    title: &str,
    section: &str,
    pages_per_student: usize,
    first_paper_is_solution: bool,
) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;

    let pdf_ref = if pdf.starts_with("http://") || pdf.starts_with("https://") {
        pdf.to_string()
    } else {
        let expanded = shellexpand::tilde(pdf);
        let path = Path::new(expanded.as_ref());
        if !path.is_file() {
            anyhow::bail!("PDF not found: {}", path.display());
        }
        std::fs::canonicalize(path)?.display().to_string()
    };

    if pages_per_student == 0 {
        println!(
            "{} --pages-per-student 0 treated as 1",
            style("!").yellow()
        );
    }

    let mut quiz = Quiz::new(title, section, Some(pdf_ref))
        .with_pages_per_student(pages_per_student)
        .with_solution_key(first_paper_is_solution);
    quiz.id = repo.create(&quiz).await?;

    println!("{} Created {}", style("✓").green(), quiz_heading(&quiz));
    println!("  PDF: {}", quiz.pdf_ref.as_deref().unwrap_or("-"));
    println!(
        "  {} page(s) per student, solution key {}",
        quiz.pages_per_student,
        if quiz.first_paper_is_solution {
            "first"
        } else {
            "absent"
        }
    );
    Ok(())
}

/// List all quizzes.
pub async fn cmd_quiz_list(settings: &Settings) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let quizzes = repo.list().await?;

    if quizzes.is_empty() {
        println!(
            "{} No quizzes yet. Add one with 'quizmark quiz create'.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Quizzes").bold());
    println!("{}", "-".repeat(72));
    println!(
        "{:<6} {:<28} {:<10} {:>5} {:>8} {:<10}",
        "ID", "Title", "Section", "PPS", "Graded", "OCR"
    );
    println!("{}", "-".repeat(72));

    for quiz in quizzes {
        println!(
            "{:<6} {:<28} {:<10} {:>5} {:>8} {:<10}",
            quiz.id,
            truncate(&quiz.title, 27),
            truncate(&quiz.section, 9),
            quiz.pages_per_student,
            quiz.graded_results.len(),
            quiz.ocr_engine.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

/// Show one quiz with its graded results.
pub async fn cmd_quiz_show(settings: &Settings, id: i64, full_text: bool) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let quiz = load_quiz(&repo, id).await?;

    println!("\n{}", quiz_heading(&quiz));
    println!("{}", "-".repeat(60));
    println!("{:<22} {}", "PDF:", quiz.pdf_ref.as_deref().unwrap_or("-"));
    println!("{:<22} {}", "Pages per student:", quiz.pages_per_student);
    println!("{:<22} {}", "Solution key first:", quiz.first_paper_is_solution);
    println!(
        "{:<22} {}",
        "Updated:",
        quiz.updated_at.format("%Y-%m-%d %H:%M")
    );

    let pages = split_pages(&quiz.extracted_text);
    println!(
        "{:<22} {} page(s), {} chars via {}",
        "Extracted text:",
        pages.len(),
        quiz.extracted_text.len(),
        quiz.ocr_engine.as_deref().unwrap_or("-")
    );

    if !quiz.graded_results.is_empty() {
        println!("\n{}", style("Graded results").bold());
        println!("{:<4} {:<32} {:<12} {:>12}", "#", "Name", "Roll", "Score");
        for (i, record) in quiz.graded_results.iter().enumerate() {
            println!(
                "{:<4} {:<32} {:<12} {:>12}",
                i + 1,
                truncate(record.display_name(), 31),
                truncate(record.display_roll(), 11),
                format!("{}/{}", record.total_score, record.max_score),
            );
        }
    }

    if full_text && !quiz.extracted_text.is_empty() {
        println!("\n{}", style("Extracted text").bold());
        println!("{}", quiz.extracted_text);
    }

    Ok(())
}

/// Delete a quiz record.
pub async fn cmd_quiz_delete(settings: &Settings, id: i64) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    if repo.delete(id).await? {
        println!("{} Deleted quiz {}", style("✓").green(), id);
    } else {
        println!("{} Quiz {} not found", style("!").yellow(), id);
    }
    Ok(())
}
