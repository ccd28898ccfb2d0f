//! Vision-language model OCR over an OpenAI-compatible chat completions API.
//!
//! Each page is rasterized, cleaned up and sent as a base64 PNG data URL
//! together with a page-role system instruction, so the first page of every
//! student block comes back with a `Name:` / `Roll:` header. Models are tried
//! in the configured order per page.
//!
//! Requires LLM_API_KEY (or OPENAI_API_KEY). LLM_ENDPOINT selects the server.
//!
//! Rate limiting:
//! - Set LLM_DELAY_MS to configure delay between requests (default: 200ms)
//! - Automatically retries on 429 with exponential backoff

use std::collections::HashMap;
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

const USER_PROMPT: &str = "Transcribe this page.";

pub struct LlmVisionStrategy {
    endpoint: String,
    api_key: Option<String>,
    models: Vec<String>,
    dpi: u32,
    max_image_bytes: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

/// Chat completions URL for a base endpoint, with or without a `/v1` suffix.
fn completions_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

fn build_request<'a>(model: &'a str, instruction: &'a str, image_base64: &str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(instruction),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: USER_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/png;base64,{}", image_base64),
                        },
                    },
                ]),
            },
        ],
        max_tokens: 4096,
        temperature: 0.0,
    }
}

fn response_text(parsed: ChatResponse) -> Result<String, OcrError> {
    if let Some(error) = parsed.error {
        return Err(OcrError::OcrFailed(format!("LLM API error: {}", error.message)));
    }
    Ok(parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

impl LlmVisionStrategy {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        models: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
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
        HttpClient::builder("llm-ocr", self.timeout, Duration::ZERO)
            .build()
            .map_err(|e| OcrError::OcrFailed(format!("Failed to create HTTP client: {}", e)))
    }

    async fn complete(
        &self,
        client: &HttpClient,
        url: &str,
        headers: &HashMap<String, String>,
        model: &str,
        instruction: &str,
        image_base64: &str,
    ) -> Result<String, OcrError> {
        let request = build_request(model, instruction, image_base64);

        apply_rate_delay("LLM_DELAY_MS", 200, "LLM").await;
        let response = retry_on_rate_limit(OcrEngine::Llm, || async {
            client
                .post_json_with_headers(url, &request, headers.clone())
                .await
                .map_err(|e| OcrError::OcrFailed(format!("HTTP request failed: {}", e)))
        })
        .await?;
        let response = error_for_status(OcrEngine::Llm, response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OcrError::OcrFailed(format!("Failed to parse response: {}", e)))?;
        response_text(parsed)
    }
}

#[async_trait]
impl OcrStrategy for LlmVisionStrategy {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Llm
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && !self.models.is_empty() && check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            "LLM_API_KEY not set".to_string()
        } else if self.models.is_empty() {
            "No LLM OCR models configured (set LLM_OCR_MODELS)".to_string()
        } else if !check_binary("pdftoppm") {
            PDFTOPPM_NOT_FOUND.to_string()
        } else {
            format!("LLM vision OCR is available ({})", self.models.join(", "))
        }
    }

    async fn extract(&self, pdf: &PdfSource, naming: &NamingContext) -> Result<OcrOutput, OcrError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| OcrError::BackendNotAvailable(self.availability_hint()))?;

        let client = self.create_client()?;
        let url = completions_url(&self.endpoint);
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", api_key));

        let options = TranscribeOptions {
            engine: OcrEngine::Llm,
            dpi: self.dpi,
            max_image_bytes: self.max_image_bytes,
            models: self.models.clone(),
        };

        let client = &client;
        let url = url.as_str();
        let headers = &headers;
        transcribe_pages(pdf, naming, &options, |model, instruction, image| async move {
            self.complete(client, url, headers, &model, &instruction, &image)
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:8080/v1/"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_wire_shape() {
        let request = build_request("gpt-4o-mini", "Begin with Name:", "QUJD");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "Begin with Name:");
        let parts = &json["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_response_text() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "Name: Jane\nRoll: 7"}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(parsed).unwrap(), "Name: Jane\nRoll: 7");

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"error": {"message": "bad key"}}"#).unwrap();
        assert!(response_text(parsed).is_err());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert_eq!(response_text(parsed).unwrap(), "");
    }

    #[test]
    fn test_unavailable_without_key_or_models() {
        let timeout = Duration::from_secs(1);
        let no_key = LlmVisionStrategy::new("https://api.openai.com", None, vec!["m".into()], timeout);
        assert!(!no_key.is_available());
        assert!(no_key.availability_hint().contains("LLM_API_KEY"));

        let no_models = LlmVisionStrategy::new("https://api.openai.com", Some("k".into()), vec![], timeout);
        assert!(!no_models.is_available());
        assert!(no_models.availability_hint().contains("models"));
    }
}
