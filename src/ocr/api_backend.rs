//! Shared infrastructure for cloud OCR strategies (Vision, Gemini, LLM).
//!
//! Provides common helpers for image encoding, request pacing and
//! retry on rate limiting.

use std::future::Future;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use image::imageops::FilterType;
use image::ImageFormat;
use tracing::{debug, warn};

use super::backend::{OcrEngine, OcrError, OcrOutput};
use super::naming::NamingContext;
use super::pdf_utils::{rasterize, PdfSource};
use super::preprocess::preprocess_page;
use crate::http_client::HttpResponse;
use crate::rate_limit::{backoff_delay, get_delay_from_env, parse_retry_after};

/// Maximum retry attempts on rate limit (429) errors.
const MAX_RETRIES: u32 = 5;

/// Width reduction applied per step when an image is over the size cap.
const DOWNSCALE_FACTOR: f32 = 0.85;

/// Below this width further downscaling stops helping legibility.
const MIN_WIDTH: u32 = 320;

/// Size of `n` bytes once base64 encoded.
fn base64_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}

/// Encode an image as base64 PNG no larger than `max_bytes` once encoded.
///
/// Shrinks the width by 15% per step (keeping aspect ratio) until the
/// encoded size fits. Returns the smallest attempt if the floor width is
/// reached first.
pub fn encode_image_capped(image_path: &Path, max_bytes: usize) -> Result<String, OcrError> {
    let raw = std::fs::read(image_path)?;
    if base64_len(raw.len()) <= max_bytes {
        return Ok(base64::engine::general_purpose::STANDARD.encode(&raw));
    }

    let mut image = image::load_from_memory(&raw)?;
    let mut encoded = raw;
    while base64_len(encoded.len()) > max_bytes && image.width() > MIN_WIDTH {
        let width = ((image.width() as f32) * DOWNSCALE_FACTOR).round().max(1.0) as u32;
        let height = ((image.height() as f64) * (width as f64) / (image.width() as f64))
            .round()
            .max(1.0) as u32;
        image = image.resize_exact(width, height, FilterType::Triangle);

        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png)?;
        encoded = buf.into_inner();
        debug!(
            "Downscaled page image to {}x{} ({} bytes)",
            width,
            height,
            encoded.len()
        );
    }

    if base64_len(encoded.len()) > max_bytes {
        warn!(
            "Page image still {} bytes after downscaling (cap {})",
            base64_len(encoded.len()),
            max_bytes
        );
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(&encoded))
}

/// Apply a configurable rate-limiting delay before an API request.
pub async fn apply_rate_delay(env_var: &str, default_ms: u64, backend_name: &str) {
    let delay = get_delay_from_env(env_var, default_ms);
    if delay > Duration::ZERO {
        debug!("{}: waiting {:?} before request", backend_name, delay);
        tokio::time::sleep(delay).await;
    }
}

/// Retry an API request on 429 (rate limited) responses with exponential backoff.
///
/// Returns the first non-429 response. If all retries are exhausted,
/// returns `OcrError::RateLimited`.
pub async fn retry_on_rate_limit<F, Fut>(
    engine: OcrEngine,
    make_request: F,
) -> Result<HttpResponse, OcrError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<HttpResponse, OcrError>>,
{
    let mut attempt = 0;
    loop {
        let response = make_request().await?;

        if !response.is_rate_limited() {
            return Ok(response);
        }

        let retry_after = response.retry_after();
        let retry_after_secs = retry_after.and_then(|s| s.trim().parse::<u64>().ok());

        if attempt >= MAX_RETRIES {
            return Err(OcrError::RateLimited {
                backend: engine,
                retry_after_secs,
            });
        }

        let wait = parse_retry_after(retry_after).unwrap_or_else(|| backoff_delay(attempt, 1000));

        warn!(
            "{} rate limited (attempt {}), waiting {:?}",
            engine,
            attempt + 1,
            wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

/// Turn a non-success response into an `OcrFailed` error with the body.
pub async fn error_for_status(
    engine: OcrEngine,
    response: HttpResponse,
) -> Result<HttpResponse, OcrError> {
    if response.is_success() {
        return Ok(response);
    }
    let status = response.status;
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    Err(OcrError::OcrFailed(format!(
        "{} API error ({}): {}",
        engine, status, snippet
    )))
}

/// Minimum trimmed output length for a model's transcription to be accepted.
pub const MIN_MODEL_OUTPUT: usize = 20;

/// Settings shared by the language-model transcription engines.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub engine: OcrEngine,
    pub dpi: u32,
    pub max_image_bytes: usize,
    pub models: Vec<String>,
}

/// Rasterize, clean up and transcribe every page through a vision model.
///
/// `call(model, instruction, image_base64)` performs one request; see
/// [`read_page`] for the per-page model fallback. The instruction comes from
/// the naming context so block-start pages get the identity header.
pub async fn transcribe_pages<F, Fut>(
    pdf: &PdfSource,
    naming: &NamingContext,
    options: &TranscribeOptions,
    call: F,
) -> Result<OcrOutput, OcrError>
where
    F: Fn(String, Arc<str>, Arc<str>) -> Fut,
    Fut: Future<Output = Result<String, OcrError>>,
{
    if options.models.is_empty() {
        return Err(OcrError::BackendNotAvailable(format!(
            "no models configured for {}",
            options.engine
        )));
    }

    let raster = rasterize(pdf, options.dpi).await?;
    let mut pages = Vec::with_capacity(raster.pages.len());
    let mut used_model: Option<String> = None;

    for (index, page_image) in raster.pages.iter().enumerate() {
        let image: Arc<str> = match preprocess_page(page_image, raster.work_dir()).await {
            Ok(cleaned) => encode_image_capped(&cleaned.path, options.max_image_bytes),
            Err(e) => {
                debug!("{}: preprocessing page {} failed ({}), using raw image", options.engine, index + 1, e);
                encode_image_capped(page_image, options.max_image_bytes)
            }
        }?
        .into();

        match read_page(index, image, naming, options, &call).await {
            Some((model, text)) => {
                used_model.get_or_insert(model);
                pages.push(text);
            }
            None => pages.push(String::new()),
        }
    }

    Ok(OcrOutput {
        pages,
        model: used_model,
    })
}

/// Transcribe one encoded page image, trying the models in order.
///
/// The first model to return at least [`MIN_MODEL_OUTPUT`] characters wins
/// and `(model, text)` is returned. `None` means no model could read the page.
pub async fn read_page<F, Fut>(
    index: usize,
    image: Arc<str>,
    naming: &NamingContext,
    options: &TranscribeOptions,
    call: &F,
) -> Option<(String, String)>
where
    F: Fn(String, Arc<str>, Arc<str>) -> Fut,
    Fut: Future<Output = Result<String, OcrError>>,
{
    let instruction: Arc<str> = naming.page_instruction(index).into();

    for model in &options.models {
        match call(model.clone(), Arc::clone(&instruction), Arc::clone(&image)).await {
            Ok(text) if text.trim().chars().count() >= MIN_MODEL_OUTPUT => {
                debug!("{}: page {} read by {}", options.engine, index + 1, model);
                return Some((model.clone(), text));
            }
            Ok(text) => debug!(
                "{}: {} returned {} chars for page {}, trying next model",
                options.engine,
                model,
                text.trim().len(),
                index + 1
            ),
            Err(e) => warn!(
                "{}: {} failed on page {}: {}",
                options.engine,
                model,
                index + 1,
                e
            ),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::ocr::naming::PageRole;

    const PAGE_TEXT: &str = "Question 1: the answer is forty two.";

    fn options(models: &[&str]) -> TranscribeOptions {
        TranscribeOptions {
            engine: OcrEngine::Llm,
            dpi: 200,
            max_image_bytes: 1 << 20,
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn naming(pages_per_student: usize, solution: bool) -> NamingContext {
        NamingContext {
            is_first_page_solution: solution,
            quiz_title: "Weekly".to_string(),
            section: "A".to_string(),
            pages_per_student,
        }
    }

    /// Calls made as `(model, instruction)`.
    type CallLog = Arc<Mutex<Vec<(String, String)>>>;

    /// A model call that answers from `replies` by model name and logs each request.
    fn fake_call(
        replies: &'static [(&'static str, Option<&'static str>)],
        log: CallLog,
    ) -> impl Fn(String, Arc<str>, Arc<str>) -> std::future::Ready<Result<String, OcrError>> {
        move |model, instruction, _image| {
            log.lock().unwrap().push((model.clone(), instruction.to_string()));
            let reply = replies
                .iter()
                .find(|(name, _)| *name == model)
                .and_then(|(_, text)| *text);
            std::future::ready(match reply {
                Some(text) => Ok(text.to_string()),
                None => Err(OcrError::OcrFailed(format!("{} unavailable", model))),
            })
        }
    }

    fn noisy_png(dir: &Path, w: u32, h: u32) -> std::path::PathBuf {
        let img = RgbImage::from_fn(w, h, |x, y| {
            let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) as u8;
            Rgb([v, v.wrapping_mul(7), v.wrapping_add(91)])
        });
        let path = dir.join("page.png");
        DynamicImage::ImageRgb8(img).save(&path).unwrap();
        path
    }

    #[test]
    fn test_base64_len() {
        assert_eq!(base64_len(0), 0);
        assert_eq!(base64_len(1), 4);
        assert_eq!(base64_len(3), 4);
        assert_eq!(base64_len(4), 8);
    }

    #[test]
    fn test_encode_under_cap_is_untouched() {
        let dir = TempDir::new().unwrap();
        let path = noisy_png(dir.path(), 16, 16);
        let raw = std::fs::read(&path).unwrap();
        let encoded = encode_image_capped(&path, usize::MAX).unwrap();
        assert_eq!(
            encoded,
            base64::engine::general_purpose::STANDARD.encode(&raw)
        );
    }

    #[test]
    fn test_encode_downscales_to_cap() {
        let dir = TempDir::new().unwrap();
        let path = noisy_png(dir.path(), 1200, 900);
        let raw_len = std::fs::read(&path).unwrap().len();
        let cap = base64_len(raw_len) / 2;

        let encoded = encode_image_capped(&path, cap).unwrap();
        assert!(encoded.len() <= cap);

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert!(img.width() < 1200);
        // Aspect ratio is preserved.
        let ratio = img.width() as f64 / img.height() as f64;
        assert!((ratio - 4.0 / 3.0).abs() < 0.02);
    }

    #[tokio::test]
    async fn test_short_reply_falls_through_to_next_model() {
        let log = CallLog::default();
        let call = fake_call(&[("fast", Some("too short")), ("careful", Some(PAGE_TEXT))], log.clone());
        let opts = options(&["fast", "careful"]);

        let read = read_page(0, "aW1n".into(), &naming(1, false), &opts, &call).await;
        assert_eq!(read, Some(("careful".to_string(), PAGE_TEXT.to_string())));

        let models: Vec<String> = log.lock().unwrap().iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(models, vec!["fast", "careful"]);
    }

    #[tokio::test]
    async fn test_first_sufficient_model_wins() {
        let log = CallLog::default();
        let call = fake_call(&[("fast", Some(PAGE_TEXT)), ("careful", Some(PAGE_TEXT))], log.clone());

        let read = read_page(0, "aW1n".into(), &naming(1, false), &options(&["fast", "careful"]), &call).await;
        assert_eq!(read.map(|(model, _)| model).as_deref(), Some("fast"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_page_empty_when_every_model_fails() {
        let log = CallLog::default();
        let call = fake_call(&[("fast", None), ("careful", Some("   "))], log.clone());

        let read = read_page(3, "aW1n".into(), &naming(1, false), &options(&["fast", "careful"]), &call).await;
        assert_eq!(read, None);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_each_page_gets_its_block_instruction() {
        let log = CallLog::default();
        let call = fake_call(&[("only", Some(PAGE_TEXT))], log.clone());
        let ctx = naming(2, true);
        let opts = options(&["only"]);

        for index in 0..4 {
            assert!(read_page(index, "aW1n".into(), &ctx, &opts, &call).await.is_some());
        }

        let instructions: Vec<String> = log.lock().unwrap().iter().map(|(_, i)| i.clone()).collect();
        let expected_roles = [
            PageRole::SolutionStart,
            PageRole::Continuation,
            PageRole::StudentStart,
            PageRole::Continuation,
        ];
        for (index, role) in expected_roles.into_iter().enumerate() {
            assert_eq!(ctx.page_role(index), role);
            assert_eq!(instructions[index], ctx.page_instruction(index));
        }
        assert!(instructions[0].contains("Name: solution_paper_weekly_a"));
        assert!(instructions[2].contains("unknown_weekly_a"));
        assert!(instructions[1].contains("Do not add any Name or Roll header"));
    }
}
