//! Google Gemini vision OCR.
//!
//! Same per-page contract as the chat-completions engine: rasterize, clean
//! up, send one page image with the page-role instruction as the system
//! instruction, try the configured models in order.
//!
//! Requires GEMINI_API_KEY.
//!
//! Free tier limits are low (15 requests per minute on Flash models):
//! - Set GEMINI_DELAY_MS to configure delay between requests (default: 200ms)
//! - Automatically retries on 429 with exponential backoff
//! - Respects Retry-After header from API

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::api_backend::{
    apply_rate_delay, error_for_status, retry_on_rate_limit, transcribe_pages, TranscribeOptions,
};
use super::backend::{OcrEngine, OcrError, OcrOutput, OcrStrategy};
use super::naming::NamingContext;
use super::pdf_utils::{check_binary, PdfSource, PDFTOPPM_NOT_FOUND};
use crate::http_client::HttpClient;

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiStrategy {
    api_key: Option<String>,
    models: Vec<String>,
    dpi: u32,
    max_image_bytes: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: GeminiInlineData<'a> },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

fn build_request<'a>(instruction: &'a str, image_base64: &'a str) -> GeminiRequest<'a> {
    GeminiRequest {
        system_instruction: GeminiContent {
            parts: vec![GeminiPart::Text { text: instruction }],
        },
        contents: vec![GeminiContent {
            parts: vec![
                GeminiPart::Text {
                    text: "Transcribe this page.",
                },
                GeminiPart::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: "image/png",
                        data: image_base64,
                    },
                },
            ],
        }],
        generation_config: GeminiGenerationConfig {
            temperature: 0.0,
            max_output_tokens: 8192,
        },
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(parsed: GeminiResponse) -> Result<String, OcrError> {
    if let Some(error) = parsed.error {
        return Err(OcrError::OcrFailed(format!(
            "Gemini API error: {}",
            error.message
        )));
    }
    Ok(parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default())
}

impl GeminiStrategy {
    pub fn new(api_key: Option<String>, models: Vec<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            models,
            dpi: 350,
            max_image_bytes: 19 * 1024 * 1024,
            timeout,
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    fn create_client(&self) -> Result<HttpClient, OcrError> {
        HttpClient::builder("gemini-ocr", self.timeout, Duration::ZERO)
            .build()
            .map_err(|e| OcrError::OcrFailed(format!("Failed to create HTTP client: {}", e)))
    }

    async fn generate(
        &self,
        client: &HttpClient,
        api_key: &str,
        model: &str,
        instruction: &str,
        image_base64: &str,
    ) -> Result<String, OcrError> {
        let request = build_request(instruction, image_base64);
        let url = format!("{}/{}:generateContent?key={}", GENERATE_URL, model, api_key);

        apply_rate_delay("GEMINI_DELAY_MS", 200, "Gemini").await;
        let response = retry_on_rate_limit(OcrEngine::Gemini, || async {
            client
                .post_json(&url, &request)
                .await
                .map_err(|e| OcrError::OcrFailed(format!("HTTP request failed: {}", e)))
        })
        .await?;
        let response = error_for_status(OcrEngine::Gemini, response).await?;

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| OcrError::OcrFailed(format!("Failed to parse response: {}", e)))?;
        response_text(parsed)
    }
}

#[async_trait]
impl OcrStrategy for GeminiStrategy {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Gemini
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && !self.models.is_empty() && check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string()
        } else if self.models.is_empty() {
            "No Gemini OCR models configured (set GEMINI_OCR_MODELS)".to_string()
        } else if !check_binary("pdftoppm") {
            PDFTOPPM_NOT_FOUND.to_string()
        } else {
            format!("Gemini OCR is available ({})", self.models.join(", "))
        }
    }

    async fn extract(&self, pdf: &PdfSource, naming: &NamingContext) -> Result<OcrOutput, OcrError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OcrError::BackendNotAvailable(self.availability_hint()))?;

        let client = self.create_client()?;
        let options = TranscribeOptions {
            engine: OcrEngine::Gemini,
            dpi: self.dpi,
            max_image_bytes: self.max_image_bytes,
            models: self.models.clone(),
        };

        let client = &client;
        transcribe_pages(pdf, naming, &options, |model, instruction, image| async move {
            self.generate(client, api_key, &model, &instruction, &image)
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = build_request("Begin with Name:", "QUJD");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "Begin with Name:"
        );
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "QUJD");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_response_joins_parts() {
        let parsed: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Name: A\n"}, {"text": "Roll: 1"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(parsed).unwrap(), "Name: A\nRoll: 1");
    }

    #[test]
    fn test_response_without_content() {
        let parsed: GeminiResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(response_text(parsed).unwrap(), "");

        let parsed: GeminiResponse =
            serde_json::from_str(r#"{"error": {"message": "quota"}}"#).unwrap();
        assert!(response_text(parsed).is_err());
    }

    #[test]
    fn test_unavailable_without_key() {
        let strategy = GeminiStrategy::new(None, vec!["gemini-2.0-flash".into()], Duration::from_secs(1));
        assert!(!strategy.is_available());
        assert!(strategy.availability_hint().contains("GEMINI_API_KEY"));
    }
}
