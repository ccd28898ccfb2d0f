//! HTTP client shared by the cloud OCR adapters and the source-PDF fetcher.
//!
//! A thin wrapper over reqwest that adds a per-client minimum delay between
//! requests and returns [`HttpResponse`] with headers already extracted.

mod response;

pub use response::HttpResponse;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;

/// Default user agent for outgoing requests.
pub const USER_AGENT: &str = concat!("quizmark/", env!("CARGO_PKG_VERSION"));

/// HTTP client with request pacing.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    source_id: String,
    request_delay: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

/// Builder for constructing `HttpClient`.
pub struct HttpClientBuilder {
    source_id: String,
    timeout: Duration,
    request_delay: Duration,
}

impl HttpClientBuilder {
    /// Build the `HttpClient`.
    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(HttpClient {
            client,
            source_id: self.source_id,
            request_delay: self.request_delay,
            last_request: Arc::new(Mutex::new(None)),
        })
    }
}

impl HttpClient {
    /// Create a builder for configuring an `HttpClient`.
    ///
    /// - `source_id`: identifier used in log lines
    /// - `timeout`: request timeout
    /// - `request_delay`: minimum spacing between requests from this client
    pub fn builder(source_id: &str, timeout: Duration, request_delay: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            source_id: source_id.to_string(),
            timeout,
            request_delay,
        }
    }

    /// Wait until `request_delay` has passed since the previous request.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!("{}: waiting {:?} before request", self.source_id, wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Make a GET request.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        self.pace().await;
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        debug!(
            "{}: GET {} -> {} in {:?}",
            self.source_id,
            url,
            response.status(),
            start.elapsed()
        );
        Ok(HttpResponse::from_reqwest(response))
    }

    /// Make a POST request with JSON body.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        json: &T,
    ) -> Result<HttpResponse, reqwest::Error> {
        self.post_json_with_headers(url, json, HashMap::new()).await
    }

    /// POST JSON request with custom headers.
    pub async fn post_json_with_headers<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        json: &T,
        headers: HashMap<String, String>,
    ) -> Result<HttpResponse, reqwest::Error> {
        self.pace().await;

        let mut request = self.client.post(url).json(json);
        for (name, value) in &headers {
            request = request.header(name, value);
        }

        let start = Instant::now();
        let response = request.send().await?;
        // API keys travel in query strings for some providers; log the path only.
        debug!(
            "{}: POST {} -> {} in {:?}",
            self.source_id,
            url.split('?').next().unwrap_or(url),
            response.status(),
            start.elapsed()
        );
        Ok(HttpResponse::from_reqwest(response))
    }
}
