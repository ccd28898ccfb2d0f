//! Helper utilities for CLI commands.

use std::time::Duration;

use anyhow::Context;
use console::style;

use quizmark::config::Settings;
use quizmark::models::Quiz;
use quizmark::repository::QuizRepository;

/// Truncate a string to a maximum length, adding "..." if truncated.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format bytes as human-readable size.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Open the quiz repository, failing with a hint when `init` was never run.
pub fn open_repository(settings: &Settings) -> anyhow::Result<QuizRepository> {
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run 'quizmark init' first.",
            settings.database_path().display()
        );
    }
    Ok(QuizRepository::new(settings.database_path()))
}

/// Load a quiz by ID.
pub async fn load_quiz(repo: &QuizRepository, id: i64) -> anyhow::Result<Quiz> {
    repo.require(id)
        .await
        .with_context(|| format!("Failed to load quiz {}", id))
}

pub fn download_timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.request_timeout)
}

/// One-line quiz heading used by several commands.
pub fn quiz_heading(quiz: &Quiz) -> String {
    if quiz.section.is_empty() {
        format!("{} {}", style(format!("#{}", quiz.id)).dim(), style(&quiz.title).bold())
    } else {
        format!(
            "{} {} ({})",
            style(format!("#{}", quiz.id)).dim(),
            style(&quiz.title).bold(),
            quiz.section
        )
    }
}

/// Compact page list: `0-3, 7, 9-10`, 1-based for display.
pub fn format_pages(pages: &[usize]) -> String {
    if pages.is_empty() {
        return "-".to_string();
    }
    let mut parts = Vec::new();
    let mut start = pages[0];
    let mut prev = pages[0];
    for &page in &pages[1..] {
        if page == prev + 1 {
            prev = page;
            continue;
        }
        parts.push(page_range(start, prev));
        start = page;
        prev = page;
    }
    parts.push(page_range(start, prev));
    parts.join(", ")
}

fn page_range(start: usize, end: usize) -> String {
    if start == end {
        format!("{}", start + 1)
    } else {
        format!("{}-{}", start + 1, end + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long quiz title", 10), "a long ...");
    }

    #[test]
    fn test_format_pages() {
        assert_eq!(format_pages(&[]), "-");
        assert_eq!(format_pages(&[0, 1, 2, 3, 6, 8, 9]), "1-4, 7, 9-10");
        assert_eq!(format_pages(&[4]), "5");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2_500_000), "2.50 MB");
    }
}
