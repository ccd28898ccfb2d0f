//! Page image variants for OCR.
//!
//! One rasterized page becomes several candidates: a cleaned-up base, fixed
//! threshold binarizations, a negative, and small rotations of the base for
//! skewed handwriting. Judging which candidate read best is left to the
//! caller.
//!
//! Variant files are deleted when their [`VariantFile`] handle drops, so a
//! failed OCR pass on one variant cannot leak files or stop the others.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use image::{imageops, GrayImage, Luma};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, warn};

use super::backend::OcrError;

/// Which transformation produced a variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariantKind {
    /// Grayscale, contrast-stretched, median-denoised, sharpened.
    Base,
    Threshold(u8),
    Negated,
    /// Base rotated by this many degrees.
    Rotated(f32),
}

impl VariantKind {
    pub fn label(&self) -> String {
        match self {
            VariantKind::Base => "base".to_string(),
            VariantKind::Threshold(t) => format!("bin{}", t),
            VariantKind::Negated => "neg".to_string(),
            VariantKind::Rotated(deg) if *deg < 0.0 => format!("rotm{}", deg.abs()),
            VariantKind::Rotated(deg) => format!("rotp{}", deg),
        }
    }
}

/// Variant recipe.
#[derive(Debug, Clone)]
pub struct VariantPlan {
    pub thresholds: Vec<u8>,
    pub rotations: Vec<f32>,
}

impl Default for VariantPlan {
    fn default() -> Self {
        Self {
            thresholds: vec![140, 180],
            rotations: vec![2.0, -2.0, 4.0, -4.0],
        }
    }
}

impl VariantPlan {
    pub fn kinds(&self) -> Vec<VariantKind> {
        let mut kinds = vec![VariantKind::Base];
        kinds.extend(self.thresholds.iter().map(|t| VariantKind::Threshold(*t)));
        kinds.push(VariantKind::Negated);
        kinds.extend(self.rotations.iter().map(|d| VariantKind::Rotated(*d)));
        kinds
    }
}

/// A variant image on disk. The file is removed when this is dropped.
#[derive(Debug)]
pub struct VariantFile {
    pub kind: VariantKind,
    pub path: PathBuf,
}

impl Drop for VariantFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove variant {}: {}", self.path.display(), e),
        }
    }
}

/// Grayscale, stretch contrast to the full range, median denoise, sharpen.
pub fn sharpened_base(image: &image::DynamicImage) -> GrayImage {
    let mut gray = image.to_luma8();

    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max > min {
        let range = f32::from(max - min);
        for p in gray.pixels_mut() {
            p[0] = ((f32::from(p[0] - min) / range) * 255.0).round() as u8;
        }
    }

    let denoised = median_filter(&gray, 1, 1);
    imageops::unsharpen(&denoised, 1.0, 8)
}

/// Derive one variant from the sharpened base.
pub fn build_variant(base: &GrayImage, kind: VariantKind) -> GrayImage {
    match kind {
        VariantKind::Base => base.clone(),
        VariantKind::Threshold(t) => {
            let mut out = base.clone();
            for p in out.pixels_mut() {
                p[0] = if p[0] >= t { 255 } else { 0 };
            }
            out
        }
        VariantKind::Negated => {
            let mut out = base.clone();
            imageops::invert(&mut out);
            out
        }
        VariantKind::Rotated(degrees) => rotate_about_center(
            base,
            degrees.to_radians(),
            Interpolation::Bilinear,
            Luma([255u8]),
        ),
    }
}

/// Build all variants of `page_image` into `out_dir`.
///
/// Builds run concurrently on blocking threads. A variant that fails to build
/// or save is logged and left out. Fails only when the page image itself
/// cannot be read.
pub async fn generate_variants(
    page_image: &Path,
    plan: &VariantPlan,
    out_dir: &Path,
) -> Result<Vec<VariantFile>, OcrError> {
    let source = page_image.to_path_buf();
    let base = tokio::task::spawn_blocking(move || -> Result<GrayImage, OcrError> {
        let img = image::open(&source)?;
        Ok(sharpened_base(&img))
    })
    .await
    .map_err(|e| OcrError::ImageError(format!("variant task failed: {}", e)))??;

    let base = std::sync::Arc::new(base);
    let stem = page_image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());

    let builds = plan.kinds().into_iter().map(|kind| {
        let base = std::sync::Arc::clone(&base);
        let path = out_dir.join(format!("{}-{}.png", stem, kind.label()));
        async move {
            let target = path.clone();
            let result = tokio::task::spawn_blocking(move || {
                build_variant(&base, kind).save(&target)
            })
            .await;
            match result {
                Ok(Ok(())) => Some(VariantFile { kind, path }),
                Ok(Err(e)) => {
                    warn!("Variant {} failed: {}", kind.label(), e);
                    // Partial writes still get removed.
                    drop(VariantFile { kind, path });
                    None
                }
                Err(e) => {
                    warn!("Variant {} task failed: {}", kind.label(), e);
                    None
                }
            }
        }
    });

    let variants: Vec<VariantFile> = join_all(builds).await.into_iter().flatten().collect();
    debug!(
        "Built {} variants for {}",
        variants.len(),
        page_image.display()
    );
    Ok(variants)
}

/// Write only the sharpened base of `page_image`, for engines that read
/// a single cleaned image per page.
pub async fn preprocess_page(page_image: &Path, out_dir: &Path) -> Result<VariantFile, OcrError> {
    let source = page_image.to_path_buf();
    let stem = page_image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let path = out_dir.join(format!("{}-{}.png", stem, VariantKind::Base.label()));
    let target = path.clone();

    tokio::task::spawn_blocking(move || -> Result<(), OcrError> {
        let img = image::open(&source)?;
        sharpened_base(&img).save(&target)?;
        Ok(())
    })
    .await
    .map_err(|e| OcrError::ImageError(format!("preprocess task failed: {}", e)))??;

    Ok(VariantFile {
        kind: VariantKind::Base,
        path,
    })
}
