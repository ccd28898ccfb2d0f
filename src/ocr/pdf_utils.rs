//! Shared PDF helpers for OCR strategies: a temp-file copy of the input,
//! page counting and page rasterization with pdftoppm.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use super::backend::OcrError;

pub const PDFTOPPM_NOT_FOUND: &str =
    "pdftoppm not installed. Install with: apt install poppler-utils";

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Count pages with lopdf.
pub fn count_pages(bytes: &[u8]) -> Option<usize> {
    lopdf::Document::load_mem(bytes)
        .ok()
        .map(|doc| doc.get_pages().len())
}

/// Page count from `pdfinfo`, for files lopdf cannot parse.
async fn pdfinfo_page_count(path: &Path) -> Option<usize> {
    let output = Command::new("pdfinfo").arg(path).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

/// The PDF under OCR, materialized once as a temp file for the CLI tools.
pub struct PdfSource {
    bytes: Vec<u8>,
    path: PathBuf,
    page_count: usize,
    _dir: TempDir,
}

impl PdfSource {
    pub async fn from_bytes(bytes: Vec<u8>) -> Result<Self, OcrError> {
        let dir = TempDir::new()?;
        let path = dir.path().join("source.pdf");
        tokio::fs::write(&path, &bytes).await?;

        let page_count = match count_pages(&bytes) {
            Some(n) => n,
            None => pdfinfo_page_count(&path).await.unwrap_or(0),
        };
        debug!("PDF source: {} bytes, {} pages", bytes.len(), page_count);

        Ok(Self {
            bytes,
            path,
            page_count,
            _dir: dir,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages, 0 when it could not be determined.
    pub fn page_count(&self) -> usize {
        self.page_count
    }
}

/// Page images rendered into a private temp dir, removed on drop.
pub struct RasterizedPages {
    pub pages: Vec<PathBuf>,
    dir: TempDir,
}

impl RasterizedPages {
    /// Directory for derived files that should share this lifetime.
    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Render every page of the PDF to PNG at `dpi`.
pub async fn rasterize(pdf: &PdfSource, dpi: u32) -> Result<RasterizedPages, OcrError> {
    let dir = TempDir::new()?;
    let output_prefix = dir.path().join("page");
    let dpi_str = dpi.to_string();

    let status = Command::new("pdftoppm")
        .args(["-png", "-r", &dpi_str])
        .arg(pdf.path())
        .arg(&output_prefix)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(s) if s.success() => {}
        Ok(_) => {
            return Err(OcrError::OcrFailed(
                "pdftoppm failed to convert PDF".to_string(),
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OcrError::BackendNotAvailable(
                PDFTOPPM_NOT_FOUND.to_string(),
            ))
        }
        Err(e) => return Err(OcrError::Io(e)),
    }

    let pages = if pdf.page_count() > 0 {
        (1..=pdf.page_count())
            .map(|n| {
                find_page_image(dir.path(), n as u32)
                    .ok_or_else(|| OcrError::OcrFailed(format!("No image generated for page {}", n)))
            })
            .collect::<Result<Vec<_>, _>>()?
    } else {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "png"))
            .collect();
        found.sort();
        found
    };

    debug!("Rasterized {} pages at {} DPI", pages.len(), dpi);
    Ok(RasterizedPages { pages, dir })
}

/// Find the image file for a specific page number.
///
/// pdftoppm names files like page-01.png, page-02.png, etc.
/// The padding width varies based on total page count.
pub fn find_page_image(temp_path: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = temp_path.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_page_image_not_found() {
        let temp = TempDir::new().unwrap();
        assert!(find_page_image(temp.path(), 1).is_none());
    }

    #[test]
    fn test_find_page_image_with_2_digit_padding() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("page-01.png");
        std::fs::write(&path, b"fake png").unwrap();

        assert_eq!(find_page_image(temp.path(), 1), Some(path));
    }

    #[test]
    fn test_find_page_image_with_3_digit_padding() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("page-012.png");
        std::fs::write(&path, b"fake png").unwrap();

        assert_eq!(find_page_image(temp.path(), 12), Some(path));
    }

    #[test]
    fn test_count_pages_rejects_garbage() {
        assert_eq!(count_pages(b"not a pdf"), None);
    }

    #[tokio::test]
    async fn test_pdf_source_temp_file_removed_on_drop() {
        let source = PdfSource::from_bytes(b"%PDF-1.4 broken".to_vec()).await.unwrap();
        let path = source.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(source.bytes().len(), 15);
        drop(source);
        assert!(!path.exists());
    }
}
