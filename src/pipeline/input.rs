//! Input resolution and document loading.
//!
//! Resolves a user-supplied input — a page-image file, a directory of scans,
//! or a URL — into [`Document`]s ready for the pipeline.
//!
//! ## Why re-encode every image to PNG?
//!
//! Archive scans arrive as TIFF, BMP, GIF, WebP, and every JPEG vintage.
//! Decoding once and re-encoding to RGB PNG gives the rest of the pipeline a
//! single lossless representation: tesseract reads it, the vision API accepts
//! it as a `data:image/png` URL, and CMYK/16-bit/paletted oddities are gone
//! before they can confuse either consumer.

use crate::error::{CatalogError, DocumentError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// File extensions accepted when walking a directory of scans.
pub const SUPPORTED_EXTENSIONS: [&str; 8] =
    ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp"];

/// One page image, decoded and normalised, ready for transcription and
/// extraction. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Document {
    /// Filename stem; keys the persisted envelope (`<stem>.catalog.json`).
    pub stem: String,
    /// Full file name, recorded in the envelope context for provenance.
    pub filename: String,
    /// Decoded image, normalised to RGB8 (RGBA passes through).
    pub image: DynamicImage,
    /// Pre-supplied transcription, if the caller already has one; stands in
    /// for the local OCR pass.
    pub ocr_hint: Option<String>,
    png: Vec<u8>,
}

impl Document {
    /// Decode `bytes` into a document. Non-raster bytes and decode failures
    /// are per-document errors; the batch continues without this file.
    pub fn from_bytes(
        filename: impl Into<String>,
        bytes: &[u8],
        ocr_hint: Option<String>,
    ) -> Result<Self, DocumentError> {
        let filename = filename.into();

        if image::guess_format(bytes).is_err() {
            return Err(DocumentError::UnsupportedFormat {
                filename,
                detail: format!("no known raster signature in first bytes ({} total)", bytes.len()),
            });
        }

        let decoded = image::load_from_memory(bytes).map_err(|e| DocumentError::DecodeFailed {
            filename: filename.clone(),
            detail: e.to_string(),
        })?;

        // Grayscale, paletted, and 16-bit variants all lower to RGB8 here so
        // the PNG we hand around is the one shape every consumer handles.
        let image = match decoded {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => decoded,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| DocumentError::DecodeFailed {
                filename: filename.clone(),
                detail: format!("PNG re-encode: {e}"),
            })?;

        let stem = Path::new(&filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());

        Ok(Self {
            stem,
            filename,
            image,
            ocr_hint,
            png,
        })
    }

    /// Read and decode a document from disk.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path).map_err(|e| DocumentError::ReadFailed {
            filename: filename.clone(),
            detail: e.to_string(),
        })?;
        Self::from_bytes(filename, &bytes, None)
    }

    /// The normalised PNG encoding of the page.
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// The page as a `data:image/png;base64,…` URL for vision content parts.
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(&self.png))
    }
}

/// The resolved input: page-image paths, plus the temp dir keeping a
/// downloaded file alive until processing completes.
#[derive(Debug)]
pub struct ResolvedBatch {
    pub paths: Vec<PathBuf>,
    _temp_dir: Option<TempDir>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// True when the path carries a supported raster extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Resolve the input string to a list of page-image paths.
///
/// A URL downloads to a temporary directory; a file stands alone; a
/// directory is walked recursively for supported extensions, sorted so runs
/// are deterministic.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedBatch, CatalogError> {
    if is_url(input) {
        return download_url(input, timeout_secs).await;
    }

    let path = PathBuf::from(input);
    if !path.exists() {
        return Err(CatalogError::InputNotFound { path });
    }

    if path.is_dir() {
        let mut paths = Vec::new();
        collect_images(&path, &mut paths)?;
        paths.sort();
        if paths.is_empty() {
            return Err(CatalogError::NoDocuments {
                input: input.to_string(),
                extensions: SUPPORTED_EXTENSIONS.join(", "),
            });
        }
        debug!("Resolved {} page images under {}", paths.len(), path.display());
        return Ok(ResolvedBatch {
            paths,
            _temp_dir: None,
        });
    }

    if !is_supported(&path) {
        return Err(CatalogError::InvalidInput {
            input: input.to_string(),
        });
    }

    debug!("Resolved local page image: {}", path.display());
    Ok(ResolvedBatch {
        paths: vec![path],
        _temp_dir: None,
    })
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => CatalogError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => CatalogError::Internal(format!("reading {}: {e}", dir.display())),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| CatalogError::Internal(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_supported(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedBatch, CatalogError> {
    info!("Downloading page image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            CatalogError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CatalogError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);

    let temp_dir = TempDir::new().map_err(|e| CatalogError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // Reject non-raster payloads here, with the URL in hand, rather than as
    // a confusing per-document decode error later.
    if image::guess_format(&bytes).is_err() {
        return Err(CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: "response is not a recognised raster image".into(),
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| CatalogError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedBatch {
        paths: vec![file_path],
        _temp_dir: Some(temp_dir),
    })
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.png".to_string()
}
