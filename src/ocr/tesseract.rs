//! Tesseract OCR strategy.
//!
//! Local last-resort engine. Each rasterized page is read with two page
//! segmentation modes and the longer reading is kept. Pages whose text does
//! not pass the meaningfulness gate are blanked so they cannot drown out
//! readable pages, while page positions stay aligned with the PDF.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
use super::naming::NamingContext;
use super::pdf_utils::{check_binary, rasterize, PdfSource, PDFTOPPM_NOT_FOUND};
use crate::text::is_meaningful;

/// Page segmentation modes tried on every page: uniform block, then single column.
const PSM_PASSES: [&str; 2] = ["6", "4"];

/// Tesseract OCR strategy.
pub struct TesseractStrategy {
    language: String,
    dpi: u32,
}

impl TesseractStrategy {
    pub fn new(language: impl Into<String>, dpi: u32) -> Self {
        Self {
            language: language.into(),
            dpi,
        }
    }

    /// Run Tesseract on an image file with one segmentation mode.
    async fn run_tesseract(&self, image_path: &Path, psm: &str) -> Result<String, OcrError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language, "--psm", psm])
            .output()
            .await;

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr.trim())))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }

    /// Best reading of one page image across the segmentation modes.
    async fn read_page(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut best = String::new();
        let mut last_error = None;
        for psm in PSM_PASSES {
            match self.run_tesseract(image_path, psm).await {
                Ok(text) if text.trim().len() > best.trim().len() => best = text,
                Ok(_) => {}
                Err(e @ OcrError::BackendNotAvailable(_)) => return Err(e),
                Err(e) => {
                    warn!("tesseract --psm {} failed: {}", psm, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if best.trim().is_empty() => Err(e),
            _ => Ok(best),
        }
    }
}

impl Default for TesseractStrategy {
    fn default() -> Self {
        Self::new("eng", 300)
    }
}

/// Keep meaningful pages, blank the rest.
fn gate_pages(pages: Vec<String>) -> Vec<String> {
    pages
        .into_iter()
        .map(|text| if is_meaningful(&text) { text } else { String::new() })
        .collect()
}

#[async_trait]
impl OcrStrategy for TesseractStrategy {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract") && check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else if !check_binary("pdftoppm") {
            PDFTOPPM_NOT_FOUND.to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    async fn extract(
        &self,
        pdf: &PdfSource,
        _naming: &NamingContext,
    ) -> Result<OcrOutput, OcrError> {
        let raster = rasterize(pdf, self.dpi).await?;

        let mut pages = Vec::with_capacity(raster.pages.len());
        for (index, image_path) in raster.pages.iter().enumerate() {
            let text = match self.read_page(image_path).await {
                Ok(text) => text,
                Err(e @ OcrError::BackendNotAvailable(_)) => return Err(e),
                Err(e) => {
                    warn!("tesseract: page {} failed: {}", index + 1, e);
                    String::new()
                }
            };
            debug!("tesseract: page {} -> {} chars", index + 1, text.len());
            pages.push(text);
        }

        Ok(OcrOutput::from_pages(gate_pages(pages)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_pages_blanks_noise() {
        let good = "The quick brown fox jumps over the lazy dog twice".to_string();
        let pages = gate_pages(vec![good.clone(), "|| ~ ..".to_string()]);
        assert_eq!(pages, vec![good, String::new()]);
    }

    #[test]
    fn test_default_language() {
        let strategy = TesseractStrategy::default();
        assert_eq!(strategy.language, "eng");
        assert_eq!(strategy.engine(), OcrEngine::Tesseract);
    }
}
