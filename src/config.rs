//! Configuration management.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! a discovered config file (`quizmark.{toml,yaml,json}` via prefer), and
//! environment variables / CLI flags.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "quizmark.db";

/// Default subdirectory for generated PDFs.
const RESULTS_SUBDIR: &str = "results";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Directory for generated pack and roster PDFs.
    pub results_dir: PathBuf,
    /// Base URL under which `results_dir` is published, if any.
    pub public_base_url: Option<String>,
    /// Request timeout in seconds for source PDF downloads.
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizmark");

        Self {
            results_dir: data_dir.join(RESULTS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            public_base_url: None,
            request_timeout: 60,
        }
    }
}

impl Settings {
    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (dir, label) in [(&self.data_dir, "data"), (&self.results_dir, "results")] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }
}

/// OCR engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Engine used when none is given on the command line.
    pub default_engine: String,
    /// Rasterization resolution for image-based engines.
    pub dpi: u32,
    /// Rasterization resolution for the language-model engines.
    pub llm_dpi: u32,
    /// Tesseract language code.
    pub language: String,
    /// Fixed binarization thresholds for image variants.
    pub thresholds: Vec<u8>,
    /// Rotation angles in degrees for deskew variants.
    pub rotations: Vec<f32>,
    /// How many best-scoring variants are merged per page.
    pub top_variants: usize,
    /// Upper bound for one base64-encoded page image.
    pub max_image_bytes: usize,
    /// Google Cloud Vision API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_api_key: Option<String>,
    /// OpenAI-compatible chat completions endpoint (base URL).
    pub llm_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
    /// Vision models tried in order for each page.
    pub llm_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    pub gemini_models: Vec<String>,
    /// HTTP timeout for OCR API calls in seconds.
    pub request_timeout: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            default_engine: "auto".to_string(),
            dpi: 300,
            llm_dpi: 350,
            language: "eng".to_string(),
            thresholds: vec![140, 180],
            rotations: vec![2.0, -2.0, 4.0, -4.0],
            top_variants: 3,
            max_image_bytes: 19 * 1024 * 1024,
            vision_api_key: None,
            llm_endpoint: "https://api.openai.com".to_string(),
            llm_api_key: None,
            llm_models: vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()],
            gemini_api_key: None,
            gemini_models: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
            request_timeout: 120,
        }
    }
}

/// Split a comma-separated env value into trimmed, non-empty items.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl OcrSettings {
    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `GOOGLE_VISION_API_KEY`: enables the document and vision engines
    /// - `LLM_API_KEY` (or `OPENAI_API_KEY`): enables the llm engine
    /// - `LLM_ENDPOINT`: OpenAI-compatible base URL
    /// - `LLM_OCR_MODELS`: comma-separated model list
    /// - `GEMINI_API_KEY`, `GEMINI_OCR_MODELS`
    /// - `OCR_DPI`: rasterization DPI
    /// - `OCR_ENGINE`: default engine
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("GOOGLE_VISION_API_KEY") {
            self.vision_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.llm_api_key = Some(val);
        } else if self.llm_api_key.is_none() {
            self.llm_api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if let Ok(val) = std::env::var("LLM_ENDPOINT") {
            self.llm_endpoint = val;
        }
        if let Ok(val) = std::env::var("LLM_OCR_MODELS") {
            let models = parse_list(&val);
            if !models.is_empty() {
                self.llm_models = models;
            }
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.gemini_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("GEMINI_OCR_MODELS") {
            let models = parse_list(&val);
            if !models.is_empty() {
                self.gemini_models = models;
            }
        }
        if let Ok(val) = std::env::var("OCR_DPI") {
            if let Ok(dpi) = val.parse() {
                self.dpi = dpi;
            }
        }
        if let Ok(val) = std::env::var("OCR_ENGINE") {
            self.default_engine = val;
        }
        self
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Results directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<String>,
    /// Public base URL for result PDFs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    /// Download timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// OCR engine configuration.
    #[serde(default)]
    pub ocr: OcrSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers quizmark config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("quizmark").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            // No config file found
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.ocr = config.ocr.with_env_overrides();
        config
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        config.ocr = config.ocr.with_env_overrides();
        Ok(config)
    }

    /// Directory of the config file, used for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.results_dir = settings.data_dir.join(RESULTS_SUBDIR);
        }
        if let Some(ref results_dir) = self.results_dir {
            settings.results_dir = self.resolve_path(results_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref url) = self.public_base_url {
            settings.public_base_url = Some(url.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--target flag).
    pub data_dir: Option<PathBuf>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default_with_env()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // --target takes precedence over the config file
    if let Some(data_dir) = options.data_dir {
        let data_dir = config.resolve_path(&data_dir.to_string_lossy(), &base_dir);
        settings.results_dir = data_dir.join(RESULTS_SUBDIR);
        settings.data_dir = data_dir;
    }

    if let Some(url) = std::env::var("QUIZMARK_PUBLIC_URL")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using QUIZMARK_PUBLIC_URL from environment: {}", url);
        settings.public_base_url = Some(url);
    }

    (settings, config)
}
