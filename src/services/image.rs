//! Featured image handling
//!
//! - uploads are stored under `media_root/uploads/` with a random name
//! - after a post's image changes, [`ImageService::process`] records the
//!   original dimensions and writes WebP variants to
//!   `media_root/resized/{base}-{width}.webp`
//! - [`ImageService::optimize_all`] backs the `optimize-images` command,
//!   recompressing large originals as RGB JPEG in place
//!
//! Decoding and encoding run on the blocking pool.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::config::MediaConfig;

/// Subdirectory of the media root that receives uploads
pub const UPLOAD_DIR: &str = "uploads";

#[derive(Debug, thiserror::Error)]
pub enum ImageServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Dimensions and generated variants of a processed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub base_name: String,
    pub width: u32,
    pub height: u32,
    /// Widths actually written
    pub variants: Vec<u32>,
}

/// A stored upload
#[derive(Debug, Clone, Serialize)]
pub struct StoredUpload {
    /// Path relative to the media root, as saved on the post
    pub path: String,
    /// Public URL under `/media`
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

/// Settings for the `optimize-images` command
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions {
    pub quality: u8,
    pub max_width: u32,
    /// Files smaller than this many bytes are left alone
    pub min_size: u64,
    pub dry_run: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            quality: 85,
            max_width: 1200,
            min_size: 100 * 1024,
            dry_run: false,
        }
    }
}

/// Totals from an `optimize-images` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    pub examined: usize,
    pub optimized: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_saved: u64,
}

enum OptimizeOutcome {
    Skipped,
    Optimized { before: u64, after: u64 },
}

#[derive(Clone)]
pub struct ImageService {
    config: MediaConfig,
}

impl ImageService {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn media_root(&self) -> &Path {
        &self.config.root
    }

    /// Absolute location of a media-relative path; rejects escapes from the root
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(anyhow!("Invalid media path: {}", relative.display()));
        }
        Ok(self.config.root.join(relative))
    }

    /// Validate and store an uploaded image
    pub async fn save_upload(
        &self,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredUpload, ImageServiceError> {
        if !self.config.is_type_allowed(content_type) {
            return Err(ImageServiceError::ValidationError(format!(
                "Invalid file type: {}. Allowed types: {}",
                content_type,
                self.config.allowed_types.join(", ")
            )));
        }
        if data.is_empty() {
            return Err(ImageServiceError::ValidationError("Empty file".to_string()));
        }
        if data.len() as u64 > self.config.max_file_size {
            return Err(ImageServiceError::ValidationError(format!(
                "File too large. Maximum size: {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }

        let dir = self.config.root.join(UPLOAD_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

        let filename = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            self.config.extension_for(content_type)
        );
        tokio::fs::write(dir.join(&filename), data)
            .await
            .context("Failed to save upload")?;

        let path = format!("{}/{}", UPLOAD_DIR, filename);
        Ok(StoredUpload {
            url: format!("/media/{}", path),
            path,
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    /// Measure `relative` and generate its responsive WebP variants
    pub async fn process(&self, relative: &str) -> Result<ImageMeta> {
        let source = self.resolve(relative)?;
        let resized_dir = self.config.resized_dir();
        let widths = self.config.responsive_widths.clone();

        tokio::task::spawn_blocking(move || generate_variants(&source, &resized_dir, &widths))
            .await
            .context("Image task panicked")?
    }

    /// Recompress every image in `relatives`, logging and counting failures
    pub async fn optimize_all(&self, relatives: &[String], options: OptimizeOptions) -> OptimizeReport {
        let mut report = OptimizeReport::default();

        for relative in relatives {
            report.examined += 1;
            let path = match self.resolve(relative) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let shown = path.clone();
            let outcome =
                tokio::task::spawn_blocking(move || optimize_file(&path, &options)).await;

            match outcome {
                Ok(Ok(OptimizeOutcome::Optimized { before, after })) => {
                    report.optimized += 1;
                    report.bytes_saved += before.saturating_sub(after);
                    tracing::info!("Optimized {} ({} -> {} bytes)", shown.display(), before, after);
                }
                Ok(Ok(OptimizeOutcome::Skipped)) => report.skipped += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!("Failed to optimize {}: {:#}", shown.display(), e);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Image task for {} panicked: {}", shown.display(), e);
                }
            }
        }

        report
    }
}

/// Decode by content rather than extension; recompressed originals keep their old name
fn open_guessed(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image {}", path.display()))
}

fn generate_variants(source: &Path, resized_dir: &Path, widths: &[u32]) -> Result<ImageMeta> {
    let img = open_guessed(source)?;
    let (width, height) = img.dimensions();

    let base_name = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Image path has no file name: {}", source.display()))?
        .to_string();

    std::fs::create_dir_all(resized_dir)
        .with_context(|| format!("Failed to create {}", resized_dir.display()))?;

    let mut variants = Vec::new();
    for &target in widths {
        if target == 0 || target > width {
            continue;
        }
        let target_height = ((height as u64 * target as u64) / width as u64).max(1) as u32;
        let resized = img.resize_exact(target, target_height, FilterType::Lanczos3);
        let out = resized_dir.join(format!("{}-{}.webp", base_name, target));
        DynamicImage::ImageRgba8(resized.to_rgba8())
            .save_with_format(&out, ImageFormat::WebP)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        variants.push(target);
    }

    Ok(ImageMeta {
        base_name,
        width,
        height,
        variants,
    })
}

fn optimize_file(path: &Path, options: &OptimizeOptions) -> Result<OptimizeOutcome> {
    let before = std::fs::metadata(path)
        .with_context(|| format!("Missing image {}", path.display()))?
        .len();
    if before < options.min_size {
        return Ok(OptimizeOutcome::Skipped);
    }

    let mut img = open_guessed(path)?;
    if img.width() > options.max_width {
        let height = ((img.height() as u64 * options.max_width as u64) / img.width() as u64).max(1);
        img = img.resize_exact(options.max_width, height as u32, FilterType::Lanczos3);
    }

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, options.quality))
        .context("Failed to encode JPEG")?;

    let after = encoded.len() as u64;
    if after >= before {
        return Ok(OptimizeOutcome::Skipped);
    }
    if !options.dry_run {
        std::fs::write(path, &encoded)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(OptimizeOutcome::Optimized { before, after })
}
