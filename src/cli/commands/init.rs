//! Initialize command.

use console::style;

use quizmark::config::Settings;
use quizmark::repository::QuizRepository;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let repo = QuizRepository::new(settings.database_path());
    repo.init_schema().await?;

    println!(
        "{} Initialized quizmark in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database: {}", settings.database_path().display());
    println!("  Results:  {}", settings.results_dir.display());

    Ok(())
}
