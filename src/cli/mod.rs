//! Command-line interface for quizmark.

mod commands;
pub mod helpers;

pub use commands::{is_verbose, run};
