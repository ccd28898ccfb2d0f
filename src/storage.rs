//! Blob storage for quiz PDFs.
//!
//! Source PDFs are read from a local path or downloaded over HTTP. Generated
//! result PDFs are written under the results directory using a two-level
//! layout keyed by content hash:
//! `{results_dir}/{hash[0..2]}/{sanitized_basename}-{hash[0..8]}.pdf`

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Settings;
use crate::http_client::HttpClient;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("source PDF not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// SHA-256 of the content, hex encoded.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Make a string safe to use as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "quiz".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

/// Storage path for a blob with a readable base name.
pub fn content_storage_path_with_name(
    dir: &Path,
    content_hash: &str,
    basename: &str,
    extension: &str,
) -> PathBuf {
    let filename = format!(
        "{}-{}.{}",
        sanitize_filename(basename),
        &content_hash[..8],
        extension
    );
    dir.join(&content_hash[..2]).join(filename)
}

/// A stored artifact and where it can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: PathBuf,
    pub url: String,
}

/// Result store on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: Option<String>) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.results_dir.clone(),
            settings.public_base_url.clone(),
        )
    }

    /// Public URL for a stored path: the base URL plus the path relative to
    /// the store root, or a `file://` URL when no base URL is configured.
    pub fn public_url(&self, path: &Path) -> String {
        match (&self.public_base_url, path.strip_prefix(&self.root)) {
            (Some(base), Ok(relative)) => {
                let relative: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                format!("{}/{}", base.trim_end_matches('/'), relative.join("/"))
            }
            _ => format!("file://{}", path.display()),
        }
    }

    /// Write a PDF and return its location.
    pub async fn put_pdf(&self, basename: &str, content: &[u8]) -> Result<StoredBlob, StorageError> {
        let hash = compute_hash(content);
        let path = content_storage_path_with_name(&self.root, &hash, basename, "pdf");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        info!("Stored {} ({} bytes)", path.display(), content.len());

        let url = self.public_url(&path);
        Ok(StoredBlob { path, url })
    }
}

fn is_http(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Load a source PDF from a local path, `file://` URL or http(s) URL.
pub async fn load_source(reference: &str, timeout: Duration) -> Result<Vec<u8>, StorageError> {
    if is_http(reference) {
        return download(reference, timeout).await;
    }

    let local = reference.strip_prefix("file://").unwrap_or(reference);
    let path = PathBuf::from(shellexpand::tilde(local).as_ref());
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Loaded source {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(path)),
        Err(e) => Err(StorageError::Io(e)),
    }
}

async fn download(url: &str, timeout: Duration) -> Result<Vec<u8>, StorageError> {
    let failed = |reason: String| StorageError::Download {
        url: url.to_string(),
        reason,
    };

    let client = HttpClient::builder("source-pdf", timeout, Duration::ZERO)
        .build()
        .map_err(|e| failed(e.to_string()))?;
    let response = client.get(url).await.map_err(|e| failed(e.to_string()))?;
    if !response.is_success() {
        return Err(failed(format!("HTTP {}", response.status)));
    }
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    debug!("Downloaded {} ({} bytes)", url, bytes.len());
    Ok(bytes)
}
