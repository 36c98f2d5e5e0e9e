//! Error types for the scan2loc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CatalogError`] — **Fatal**: the batch cannot proceed at all (input
//!   unresolvable, API key missing, output directory unwritable). Returned as
//!   `Err(CatalogError)` from the top-level `process*` functions.
//!
//! * [`DocumentError`] — **Non-fatal**: a single document failed (unreadable
//!   file, undecodable image) but every other document is fine. Stored inside
//!   [`crate::process::DocumentOutcome`] so callers can inspect partial
//!   success rather than losing a whole archive box to one bad scan.
//!
//! Model-call failures deliberately appear in *neither* enum: transcription
//! and extraction degrade in place (empty text, empty record) and the
//! envelope's validation report carries the evidence. A run that produced a
//! degraded envelope still produced an envelope.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scan2loc library.
///
/// Document-level failures use [`DocumentError`] and are stored in
/// [`crate::process::DocumentOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CatalogError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path was not found.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the input.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path, directory, or URL.
    #[error("Invalid input '{input}': not a file, directory, or HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input resolved but matched no processable page images.
    #[error("No page images found under '{input}' (looked for {extensions})")]
    NoDocuments { input: String, extensions: String },

    // ── Model API errors ──────────────────────────────────────────────────
    /// No API key available for the vision model endpoint.
    #[error("Vision model API is not configured.\n{hint}")]
    ApiNotConfigured { hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// Stored in [`crate::process::DocumentOutcome`] when a document fails.
/// The overall batch continues; the outcome list records who fell over.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The file could not be read from disk.
    #[error("'{filename}': read failed: {detail}")]
    ReadFailed { filename: String, detail: String },

    /// The bytes are not a raster format this pipeline decodes.
    #[error("'{filename}': unsupported image format: {detail}")]
    UnsupportedFormat { filename: String, detail: String },

    /// The image claimed a known format but failed to decode.
    #[error("'{filename}': image decode failed: {detail}")]
    DecodeFailed { filename: String, detail: String },

    /// The envelope could not be persisted.
    #[error("'{filename}': envelope write failed: {detail}")]
    PersistFailed { filename: String, detail: String },
}
