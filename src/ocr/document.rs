//! Cloud document OCR: the whole PDF sent to Google Cloud Vision.
//!
//! Uses the synchronous `files:annotate` endpoint, which accepts at most five
//! pages per request, so larger documents are sent in page batches.
//! Requires GOOGLE_VISION_API_KEY.
//!
//! Rate limiting:
//! - Set VISION_DELAY_MS to configure delay between requests (default: 100ms)
//! - Automatically retries on 429 with exponential backoff

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api_backend::{apply_rate_delay, error_for_status, retry_on_rate_limit};
use super::backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
use super::naming::NamingContext;
use super::pdf_utils::PdfSource;
use crate::http_client::HttpClient;

const FILES_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/files:annotate";

/// Pages per synchronous request.
const PAGES_PER_REQUEST: usize = 5;

pub struct DocumentOcrStrategy {
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct FilesAnnotateRequest {
    requests: Vec<FileRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRequest {
    input_config: InputConfig,
    features: Vec<Feature>,
    pages: Vec<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig {
    content: String,
    mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct FilesAnnotateResponse {
    #[serde(default)]
    responses: Vec<FileResponse>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(default)]
    responses: Vec<PageResponse>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
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

impl DocumentOcrStrategy {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self { api_key, timeout }
    }

    fn create_client(&self) -> Result<HttpClient, OcrError> {
        HttpClient::builder("vision-document", self.timeout, Duration::ZERO)
            .build()
            .map_err(|e| OcrError::OcrFailed(format!("Failed to create HTTP client: {}", e)))
    }

    async fn annotate_batch(
        &self,
        client: &HttpClient,
        url: &str,
        content: &str,
        pages: Vec<usize>,
    ) -> Result<Vec<String>, OcrError> {
        let expected = pages.len();
        let request = FilesAnnotateRequest {
            requests: vec![FileRequest {
                input_config: InputConfig {
                    content: content.to_string(),
                    mime_type: "application/pdf",
                },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                pages,
            }],
        };

        apply_rate_delay("VISION_DELAY_MS", 100, "Vision").await;
        let response = retry_on_rate_limit(OcrEngine::Document, || async {
            client
                .post_json(url, &request)
                .await
                .map_err(|e| OcrError::OcrFailed(format!("HTTP request failed: {}", e)))
        })
        .await?;
        let response = error_for_status(OcrEngine::Document, response).await?;

        let parsed: FilesAnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::OcrFailed(format!("Failed to parse response: {}", e)))?;
        parse_batch(parsed, expected)
    }
}

/// Pull per-page text out of one batch response, padding missing pages.
fn parse_batch(parsed: FilesAnnotateResponse, expected: usize) -> Result<Vec<String>, OcrError> {
    if let Some(error) = parsed.error {
        return Err(OcrError::OcrFailed(format!("Vision API error: {}", error.message)));
    }
    let file = parsed
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| OcrError::OcrFailed("Vision returned no file response".to_string()))?;
    if let Some(error) = file.error {
        return Err(OcrError::OcrFailed(format!("Vision API error: {}", error.message)));
    }

    let mut texts: Vec<String> = file
        .responses
        .into_iter()
        .map(|page| {
            if let Some(error) = page.error {
                debug!("Vision page error: {}", error.message);
            }
            page.full_text_annotation
                .map(|a| a.text)
                .unwrap_or_default()
        })
        .collect();
    texts.resize(expected, String::new());
    Ok(texts)
}

#[async_trait]
impl OcrStrategy for DocumentOcrStrategy {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Document
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            "GOOGLE_VISION_API_KEY not set".to_string()
        } else {
            "Cloud Vision document OCR is available".to_string()
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
        if pdf.page_count() == 0 {
            return Err(OcrError::OcrFailed(
                "Could not determine PDF page count".to_string(),
            ));
        }

        let client = self.create_client()?;
        let url = format!("{}?key={}", FILES_ANNOTATE_URL, api_key);
        let content = base64::engine::general_purpose::STANDARD.encode(pdf.bytes());

        let all_pages: Vec<usize> = (1..=pdf.page_count()).collect();
        let mut texts = Vec::with_capacity(all_pages.len());
        for batch in all_pages.chunks(PAGES_PER_REQUEST) {
            debug!("Vision document OCR: pages {:?}", batch);
            let batch_texts = self
                .annotate_batch(&client, &url, &content, batch.to_vec())
                .await?;
            texts.extend(batch_texts);
        }

        Ok(OcrOutput::from_pages(texts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = FilesAnnotateRequest {
            requests: vec![FileRequest {
                input_config: InputConfig {
                    content: "QUJD".to_string(),
                    mime_type: "application/pdf",
                },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                pages: vec![1, 2],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        let req = &json["requests"][0];
        assert_eq!(req["inputConfig"]["mimeType"], "application/pdf");
        assert_eq!(req["features"][0]["type"], "DOCUMENT_TEXT_DETECTION");
        assert_eq!(req["pages"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_parse_batch_pads_missing_pages() {
        let parsed: FilesAnnotateResponse = serde_json::from_str(
            r#"{"responses": [{"responses": [
                {"fullTextAnnotation": {"text": "page one"}},
                {"error": {"message": "bad page"}}
            ]}]}"#,
        )
        .unwrap();
        let texts = parse_batch(parsed, 3).unwrap();
        assert_eq!(texts, vec!["page one", "", ""]);
    }

    #[test]
    fn test_parse_batch_top_level_error() {
        let parsed: FilesAnnotateResponse =
            serde_json::from_str(r#"{"error": {"message": "quota"}}"#).unwrap();
        assert!(parse_batch(parsed, 1).is_err());
    }

    #[test]
    fn test_unavailable_without_key() {
        let strategy = DocumentOcrStrategy::new(None, Duration::from_secs(1));
        assert!(!strategy.is_available());
    }
}
