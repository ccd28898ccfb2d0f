//! Embedded text extraction via pdftotext.
//!
//! Fast path for born-digital PDFs. Scanned PDFs simply yield empty pages.

use async_trait::async_trait;
use tokio::process::Command;

use super::backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
use super::naming::NamingContext;
use super::pdf_utils::{check_binary, PdfSource};

const PDFTOTEXT_NOT_FOUND: &str =
    "pdftotext not installed. Install with: apt install poppler-utils";

/// Reads the PDF's own text layer.
#[derive(Debug, Default)]
pub struct EmbeddedTextStrategy;

impl EmbeddedTextStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Run pdftotext, either on one page or on the whole file.
    async fn run_pdftotext(pdf: &PdfSource, page: Option<usize>) -> Result<String, OcrError> {
        let mut cmd = Command::new("pdftotext");
        cmd.args(["-layout", "-enc", "UTF-8"]);
        if let Some(page) = page {
            let page_str = page.to_string();
            cmd.args(["-f", &page_str, "-l", &page_str]);
        }
        let output = cmd.arg(pdf.path()).arg("-").output().await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => Err(OcrError::OcrFailed(format!(
                "pdftotext failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                OcrError::BackendNotAvailable(PDFTOTEXT_NOT_FOUND.to_string()),
            ),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

/// Split whole-document pdftotext output on form feeds.
fn split_form_feeds(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
    // pdftotext terminates the last page with a form feed too.
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[async_trait]
impl OcrStrategy for EmbeddedTextStrategy {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Embedded
    }

    fn is_available(&self) -> bool {
        check_binary("pdftotext")
    }

    fn availability_hint(&self) -> String {
        if self.is_available() {
            "pdftotext is available".to_string()
        } else {
            PDFTOTEXT_NOT_FOUND.to_string()
        }
    }

    async fn extract(
        &self,
        pdf: &PdfSource,
        _naming: &NamingContext,
    ) -> Result<OcrOutput, OcrError> {
        if pdf.page_count() == 0 {
            let text = Self::run_pdftotext(pdf, None).await?;
            return Ok(OcrOutput::from_pages(split_form_feeds(&text)));
        }

        let mut pages = Vec::with_capacity(pdf.page_count());
        for page in 1..=pdf.page_count() {
            pages.push(Self::run_pdftotext(pdf, Some(page)).await?);
        }
        Ok(OcrOutput::from_pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_form_feeds() {
        assert_eq!(split_form_feeds("a\x0cb\x0c"), vec!["a", "b"]);
        assert_eq!(split_form_feeds("only"), vec!["only"]);
        assert_eq!(split_form_feeds(""), vec![""]);
    }
}
