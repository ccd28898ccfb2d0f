//! Cloud image OCR over preprocessed page variants (Google Cloud Vision).
//!
//! The heaviest engine and the one most likely to recover handwriting. Each
//! page is rasterized, expanded into image variants, and every variant is
//! read twice: once with a handwriting language hint and once with a plain
//! English hint. The longer reading wins per variant. Variants are scored by
//! length plus a bonus for meaningful text, and the best few are merged with
//! line-level dedup.
//!
//! Requires GOOGLE_VISION_API_KEY.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::api_backend::{apply_rate_delay, encode_image_capped, error_for_status, retry_on_rate_limit};
use super::backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
use super::naming::NamingContext;
use super::pdf_utils::{check_binary, rasterize, PdfSource, PDFTOPPM_NOT_FOUND};
use super::preprocess::{generate_variants, VariantFile, VariantPlan};
use crate::http_client::HttpClient;
use crate::text::{dedup_lines, is_meaningful};

const IMAGES_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Language hint sets tried on every variant.
const HINT_PASSES: [&[&str]; 2] = [&["en-t-i0-handwrit"], &["en"]];

/// Score bonus for a variant whose text passes the meaningfulness gate.
const MEANINGFUL_BONUS: usize = 500;

/// Variants read concurrently per page.
const VARIANT_CONCURRENCY: usize = 4;

pub struct VisionVariantStrategy {
    api_key: Option<String>,
    plan: VariantPlan,
    dpi: u32,
    top_variants: usize,
    max_image_bytes: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<ImageRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest<'a> {
    image: ImageContent<'a>,
    features: Vec<Feature>,
    image_context: ImageContext<'a>,
}

#[derive(Debug, Serialize)]
struct ImageContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext<'a> {
    language_hints: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

impl VisionVariantStrategy {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            plan: VariantPlan::default(),
            dpi: 300,
            top_variants: 3,
            max_image_bytes: 19 * 1024 * 1024,
            timeout,
        }
    }

    pub fn with_plan(mut self, plan: VariantPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_top_variants(mut self, top: usize) -> Self {
        self.top_variants = top.max(1);
        self
    }

    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    fn create_client(&self) -> Result<HttpClient, OcrError> {
        HttpClient::builder("vision-images", self.timeout, Duration::ZERO)
            .build()
            .map_err(|e| OcrError::OcrFailed(format!("Failed to create HTTP client: {}", e)))
    }

    /// One annotate call with the given language hints.
    async fn annotate(
        &self,
        client: &HttpClient,
        url: &str,
        content: &str,
        hints: &[&str],
    ) -> Result<String, OcrError> {
        let request = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent { content },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                image_context: ImageContext {
                    language_hints: hints,
                },
            }],
        };

        apply_rate_delay("VISION_DELAY_MS", 100, "Vision").await;
        let response = retry_on_rate_limit(OcrEngine::Vision, || async {
            client
                .post_json(url, &request)
                .await
                .map_err(|e| OcrError::OcrFailed(format!("HTTP request failed: {}", e)))
        })
        .await?;
        let response = error_for_status(OcrEngine::Vision, response).await?;

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::OcrFailed(format!("Failed to parse response: {}", e)))?;
        let first = parsed
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::OcrFailed("Vision returned no response".to_string()))?;
        if let Some(error) = first.error {
            return Err(OcrError::OcrFailed(format!("Vision API error: {}", error.message)));
        }
        Ok(first
            .full_text_annotation
            .map(|a| a.text)
            .unwrap_or_default())
    }

    /// Read one variant with every hint set and keep the longest result.
    ///
    /// Errors are logged and count as empty readings.
    async fn read_variant(&self, client: &HttpClient, url: &str, variant: &VariantFile) -> String {
        let content = match encode_image_capped(&variant.path, self.max_image_bytes) {
            Ok(c) => c,
            Err(e) => {
                warn!("Vision: cannot encode variant {}: {}", variant.kind.label(), e);
                return String::new();
            }
        };

        let mut best = String::new();
        for hints in HINT_PASSES {
            match self.annotate(client, url, &content, hints).await {
                Ok(text) if text.trim().len() > best.trim().len() => best = text,
                Ok(_) => {}
                Err(e) => warn!(
                    "Vision: variant {} with hints {:?} failed: {}",
                    variant.kind.label(),
                    hints,
                    e
                ),
            }
        }
        best
    }

    async fn read_page(
        &self,
        client: &HttpClient,
        url: &str,
        page_image: &Path,
        work_dir: &Path,
    ) -> Result<String, OcrError> {
        let variants = generate_variants(page_image, &self.plan, work_dir).await?;

        let reads: Vec<_> = variants
            .iter()
            .map(|variant| self.read_variant(client, url, variant))
            .collect();
        let readings: Vec<String> = stream::iter(reads)
            .buffered(VARIANT_CONCURRENCY)
            .collect()
            .await;

        // Variant files are removed when `variants` drops here.
        drop(variants);
        Ok(fuse_readings(readings, self.top_variants))
    }
}

/// Length plus a bonus when the text is meaningful.
fn score(text: &str) -> usize {
    let len = text.trim().len();
    if is_meaningful(text) {
        len + MEANINGFUL_BONUS
    } else {
        len
    }
}

/// Merge the best `top` non-empty readings of one page.
fn fuse_readings(readings: Vec<String>, top: usize) -> String {
    let mut scored: Vec<(usize, String)> = readings
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| (score(&t), t))
        .collect();
    // Stable: equal scores keep variant order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    dedup_lines(scored.iter().take(top.max(1)).map(|(_, t)| t.as_str()))
}

#[async_trait]
impl OcrStrategy for VisionVariantStrategy {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Vision
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            "GOOGLE_VISION_API_KEY not set".to_string()
        } else if !check_binary("pdftoppm") {
            PDFTOPPM_NOT_FOUND.to_string()
        } else {
            "Cloud Vision variant OCR is available".to_string()
        }
    }

    async fn extract(
        &self,
        pdf: &PdfSource,
        _naming: &NamingContext,
    ) -> Result<OcrOutput, OcrError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| OcrError::BackendNotAvailable(self.availability_hint()))?;

        let client = self.create_client()?;
        let url = format!("{}?key={}", IMAGES_ANNOTATE_URL, api_key);
        let raster = rasterize(pdf, self.dpi).await?;

        let mut pages = Vec::with_capacity(raster.pages.len());
        for (index, page_image) in raster.pages.iter().enumerate() {
            let text = match self
                .read_page(&client, &url, page_image, raster.work_dir())
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!("Vision: page {} failed: {}", index + 1, e);
                    String::new()
                }
            };
            debug!("Vision: page {} -> {} chars", index + 1, text.len());
            pages.push(text);
        }

        Ok(OcrOutput::from_pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    #[test]
    fn test_score_bonus() {
        let short = "abc";
        let long = "x".repeat(40);
        assert_eq!(score(short), 3);
        assert_eq!(score(&long), 40 + MEANINGFUL_BONUS);
    }

    #[test]
    fn test_fuse_takes_top_and_dedups() {
        let meaningful = format!("Name: Jane\nRoll: 12\n{}", "answer ".repeat(6));
        let readings = vec![
            "noise".to_string(),
            meaningful.clone(),
            String::new(),
            format!("Roll: 12\nextra line\n{}", "answer ".repeat(6)),
        ];
        let fused = fuse_readings(readings, 2);
        let lines: Vec<&str> = fused.lines().collect();
        assert_eq!(lines[0], "Name: Jane");
        assert_eq!(lines[1], "Roll: 12");
        assert!(lines.contains(&"extra line"));
        assert!(!lines.contains(&"noise"));
        assert_eq!(lines.iter().filter(|l| **l == "Roll: 12").count(), 1);
    }

    #[test]
    fn test_fuse_all_empty() {
        assert_eq!(fuse_readings(vec![String::new(), "  ".into()], 3), "");
    }

    #[test]
    fn test_request_wire_shape() {
        let request = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent { content: "QUJD" },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                image_context: ImageContext {
                    language_hints: HINT_PASSES[0],
                },
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["requests"][0]["imageContext"]["languageHints"][0],
            "en-t-i0-handwrit"
        );
        assert_eq!(json["requests"][0]["image"]["content"], "QUJD");
    }

    #[tokio::test]
    async fn test_read_page_with_unreachable_api_is_empty_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("page-1.png");
        GrayImage::from_fn(32, 24, |x, _| Luma([if x < 16 { 40u8 } else { 220u8 }]))
            .save(&page)
            .unwrap();

        let strategy = VisionVariantStrategy::new(Some("key".into()), Duration::from_secs(2))
            .with_plan(VariantPlan {
                thresholds: vec![128],
                rotations: Vec::new(),
            });
        let client = strategy.create_client().unwrap();
        let text = strategy
            .read_page(&client, "http://127.0.0.1:9/annotate", &page, dir.path())
            .await
            .unwrap();
        assert_eq!(text, "");

        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(left.len(), 1, "variant files are removed");
    }
}
