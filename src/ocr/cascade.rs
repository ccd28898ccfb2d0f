//! OCR cascade controller.
//!
//! Runs extraction engines one after another in a fixed order and stops at
//! the first one whose text passes the meaningfulness gate. Engine failures
//! are recorded in the [`CascadeReport`] and never abort the run; running out
//! of engines is a warning, not an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
use super::document::DocumentOcrStrategy;
use super::embedded::EmbeddedTextStrategy;
use super::gemini::GeminiStrategy;
use super::llm_vision::LlmVisionStrategy;
use super::naming::{NamingContext, NamingLock};
use super::pdf_utils::PdfSource;
use super::preprocess::VariantPlan;
use super::tesseract::TesseractStrategy;
use super::vision::VisionVariantStrategy;
use crate::config::OcrSettings;
use crate::models::Quiz;
use crate::text::{is_meaningful, join_pages, sanitize};

/// Which engines a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Every engine in [`OcrEngine::AUTO_ORDER`].
    #[default]
    Auto,
    /// One engine, then tesseract as the last resort.
    Only(OcrEngine),
}

impl EngineMode {
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Some(EngineMode::Auto);
        }
        OcrEngine::from_str(s).map(EngineMode::Only)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Auto => "auto",
            EngineMode::Only(engine) => engine.as_str(),
        }
    }

    /// Engines to try, in order.
    pub fn plan(&self) -> Vec<OcrEngine> {
        match self {
            EngineMode::Auto => OcrEngine::AUTO_ORDER.to_vec(),
            EngineMode::Only(OcrEngine::Tesseract) => vec![OcrEngine::Tesseract],
            EngineMode::Only(engine) => vec![*engine, OcrEngine::Tesseract],
        }
    }
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How one engine fared.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Passed the gate; the cascade stopped here.
    Meaningful,
    /// Produced text below the gate, with this many trimmed characters.
    LowQuality(usize),
    Failed(String),
    /// Skipped: prerequisites missing.
    Unavailable(String),
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Meaningful => write!(f, "meaningful"),
            AttemptOutcome::LowQuality(len) => write!(f, "low quality ({} chars)", len),
            AttemptOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            AttemptOutcome::Unavailable(hint) => write!(f, "unavailable: {}", hint),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub engine: OcrEngine,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl Attempt {
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Result of one cascade run.
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    pub attempts: Vec<Attempt>,
    /// Engine whose output was kept, if any engine produced output.
    pub engine: Option<OcrEngine>,
    pub model: Option<String>,
    /// Sanitized per-page text.
    pub pages: Vec<String>,
    /// Pages joined with page markers.
    pub text: String,
    /// No engine passed the gate.
    pub exhausted: bool,
}

impl CascadeReport {
    /// Trimmed length of the kept text, without page markers.
    pub fn text_len(&self) -> usize {
        self.pages.iter().map(|p| p.trim().len()).sum()
    }
}

/// Ordered set of OCR strategies.
pub struct OcrCascade {
    strategies: Vec<Arc<dyn OcrStrategy>>,
}

impl OcrCascade {
    pub fn new(strategies: Vec<Arc<dyn OcrStrategy>>) -> Self {
        Self { strategies }
    }

    /// All six engines configured from settings.
    pub fn from_settings(settings: &OcrSettings) -> Self {
        let timeout = Duration::from_secs(settings.request_timeout);
        let plan = VariantPlan {
            thresholds: settings.thresholds.clone(),
            rotations: settings.rotations.clone(),
        };

        let strategies: Vec<Arc<dyn OcrStrategy>> = vec![
            Arc::new(EmbeddedTextStrategy::new()),
            Arc::new(DocumentOcrStrategy::new(
                settings.vision_api_key.clone(),
                timeout,
            )),
            Arc::new(
                LlmVisionStrategy::new(
                    settings.llm_endpoint.clone(),
                    settings.llm_api_key.clone(),
                    settings.llm_models.clone(),
                    timeout,
                )
                .with_dpi(settings.llm_dpi)
                .with_max_image_bytes(settings.max_image_bytes),
            ),
            Arc::new(
                GeminiStrategy::new(
                    settings.gemini_api_key.clone(),
                    settings.gemini_models.clone(),
                    timeout,
                )
                .with_dpi(settings.llm_dpi)
                .with_max_image_bytes(settings.max_image_bytes),
            ),
            Arc::new(
                VisionVariantStrategy::new(settings.vision_api_key.clone(), timeout)
                    .with_plan(plan)
                    .with_dpi(settings.dpi)
                    .with_top_variants(settings.top_variants)
                    .with_max_image_bytes(settings.max_image_bytes),
            ),
            Arc::new(TesseractStrategy::new(settings.language.clone(), settings.dpi)),
        ];
        Self::new(strategies)
    }

    pub fn strategies(&self) -> impl Iterator<Item = &dyn OcrStrategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    pub fn get(&self, engine: OcrEngine) -> Option<&Arc<dyn OcrStrategy>> {
        self.strategies.iter().find(|s| s.engine() == engine)
    }

    /// Run the cascade over `pdf_bytes`.
    ///
    /// Holds the process-wide naming lock for the whole run, so concurrent
    /// runs queue behind each other. Fails only when the PDF cannot be staged
    /// on disk.
    pub async fn run(
        &self,
        pdf_bytes: Vec<u8>,
        mode: EngineMode,
        naming: NamingContext,
    ) -> Result<CascadeReport, OcrError> {
        let lock = NamingLock::acquire(naming).await;
        let pdf = PdfSource::from_bytes(pdf_bytes).await?;

        let mut report = CascadeReport::default();
        let mut kept: Option<(OcrEngine, OcrOutput)> = None;

        for engine in mode.plan() {
            let Some(strategy) = self.get(engine) else {
                debug!("OCR engine {} not registered, skipping", engine);
                continue;
            };

            if !strategy.is_available() {
                let hint = strategy.availability_hint();
                debug!("OCR engine {} unavailable: {}", engine, hint);
                report.attempts.push(Attempt {
                    engine,
                    outcome: AttemptOutcome::Unavailable(hint),
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            info!("Running OCR engine {}", engine);
            let start = Instant::now();
            let result = strategy.extract(&pdf, &lock).await;
            let elapsed = start.elapsed();

            let outcome = match result {
                Ok(output) => {
                    let combined = output.combined_text();
                    let outcome = if is_meaningful(&combined) {
                        AttemptOutcome::Meaningful
                    } else {
                        AttemptOutcome::LowQuality(combined.trim().len())
                    };
                    kept = Some((engine, output));
                    outcome
                }
                Err(e) => {
                    warn!("OCR engine {} failed: {}", engine, e);
                    AttemptOutcome::Failed(e.to_string())
                }
            };

            debug!("OCR engine {} -> {} in {:?}", engine, outcome, elapsed);
            let done = outcome == AttemptOutcome::Meaningful;
            report.attempts.push(Attempt {
                engine,
                outcome,
                elapsed,
            });
            if done {
                break;
            }
        }

        report.exhausted = !report
            .attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Meaningful);

        if let Some((engine, output)) = kept {
            report.engine = Some(engine);
            report.model = output.model;
            report.pages = output.pages.iter().map(|p| sanitize(p)).collect();
            report.text = join_pages(&report.pages);
        }

        if report.exhausted {
            warn!(
                "OCR cascade exhausted after {} attempts; keeping {} chars from {}",
                report.attempts.len(),
                report.text_len(),
                report.engine.map(|e| e.as_str()).unwrap_or("no engine")
            );
        }

        drop(lock);
        Ok(report)
    }

    /// Run the cascade for a quiz and overwrite its extracted text.
    pub async fn run_for_quiz(
        &self,
        quiz: &mut Quiz,
        pdf_bytes: Vec<u8>,
        mode: EngineMode,
    ) -> Result<CascadeReport, OcrError> {
        let report = self
            .run(pdf_bytes, mode, NamingContext::for_quiz(quiz))
            .await?;
        quiz.set_extracted_text(report.text.clone(), report.engine.map(|e| e.as_str()));
        Ok(report)
    }
}
