//! OCR engine availability.

use console::style;

use quizmark::config::OcrSettings;
use quizmark::ocr::{EngineMode, OcrCascade};

/// Print each engine in cascade order with its availability.
pub async fn cmd_engines(ocr_settings: &OcrSettings) -> anyhow::Result<()> {
    let cascade = OcrCascade::from_settings(ocr_settings);

    println!("\n{}", style("OCR engines (auto order)").bold());
    println!("{}", "-".repeat(60));

    let mut available = 0;
    for engine in EngineMode::Auto.plan() {
        let Some(strategy) = cascade.get(engine) else {
            continue;
        };
        if strategy.is_available() {
            available += 1;
            println!("  {} {}", style("✓").green(), engine);
        } else {
            println!(
                "  {} {:<10} {}",
                style("✗").red(),
                engine.as_str(),
                style(strategy.availability_hint()).dim()
            );
        }
    }

    println!(
        "\nDefault engine: {}",
        style(&ocr_settings.default_engine).bold()
    );
    if available == 0 {
        println!(
            "{} No engine can run; OCR will return empty text",
            style("!").yellow()
        );
    }
    Ok(())
}
