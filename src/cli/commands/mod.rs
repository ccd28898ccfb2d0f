//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod engines;
mod grades;
mod init;
mod ocr;
mod pack;
mod quiz;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use quizmark::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "quizmark")]
#[command(about = "Quiz answer-script OCR and graded result packs")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage quizzes
    Quiz {
        #[command(subcommand)]
        command: QuizCommands,
    },

    /// Extract text from a quiz PDF through the OCR engine cascade
    Ocr {
        /// Quiz ID
        id: i64,
        /// Engine: auto, embedded, document, llm, gemini, vision, tesseract
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// Manage graded results
    Grades {
        #[command(subcommand)]
        command: GradesCommands,
    },

    /// Show which pages belong to which student
    Segment {
        /// Quiz ID
        id: i64,
    },

    /// Build the Solution/Best/Avg/Low result pack PDF
    Pack {
        /// Quiz ID
        id: i64,
    },

    /// Build the annotated full-roster PDF
    Roster {
        /// Quiz ID
        id: i64,
    },

    /// List OCR engines and whether they can run
    Engines,
}

#[derive(Subcommand)]
enum QuizCommands {
    /// Register a scanned answer-script PDF
    Create {
        /// Local path or http(s) URL of the PDF
        #[arg(long)]
        pdf: String,
        /// Quiz title
        #[arg(long)]
        title: String,
        /// Class section
        #[arg(long, default_value = "")]
        section: String,
        /// Consecutive pages per student
        #[arg(short, long, default_value = "1")]
        pages_per_student: usize,
        /// The first paper is a regular student, not the answer key
        #[arg(long)]
        no_solution_key: bool,
    },

    /// List quizzes
    List,

    /// Show one quiz
    Show {
        /// Quiz ID
        id: i64,
        /// Print the full extracted text
        #[arg(long)]
        text: bool,
    },

    /// Delete a quiz record (generated PDFs are kept)
    Delete {
        /// Quiz ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum GradesCommands {
    /// Import grader output: a JSON array or {"students": [...]}
    Import {
        /// Quiz ID
        id: i64,
        /// JSON file
        file: PathBuf,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.target,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Quiz { command } => match command {
            QuizCommands::Create {
                pdf,
                title,
                section,
                pages_per_student,
                no_solution_key,
            } => {
                quiz::cmd_quiz_create(
                    &settings,
                    &pdf,
                    &title,
                    &section,
                    pages_per_student,
                    !no_solution_key,
                )
                .await
            }
            QuizCommands::List => quiz::cmd_quiz_list(&settings).await,
            QuizCommands::Show { id, text } => quiz::cmd_quiz_show(&settings, id, text).await,
            QuizCommands::Delete { id } => quiz::cmd_quiz_delete(&settings, id).await,
        },
        Commands::Ocr { id, engine } => {
            let engine = engine.unwrap_or_else(|| config.ocr.default_engine.clone());
            ocr::cmd_ocr(&settings, &config.ocr, id, &engine).await
        }
        Commands::Grades { command } => match command {
            GradesCommands::Import { id, file } => {
                grades::cmd_grades_import(&settings, id, &file).await
            }
        },
        Commands::Segment { id } => pack::cmd_segment(&settings, id).await,
        Commands::Pack { id } => pack::cmd_pack(&settings, id).await,
        Commands::Roster { id } => pack::cmd_roster(&settings, id).await,
        Commands::Engines => engines::cmd_engines(&config.ocr).await,
    }
}
