//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline works through a batch.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database record,
//! or a terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so it works
//! correctly when documents are processed concurrently.
//!
//! # Example
//!
//! ```rust
//! use scan2loc::{BatchProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, filename: &str, confidence: f64) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{}/{} {} (confidence {:.0})", done, total, filename, confidence);
//!         let _ = index;
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch pipeline as it processes each document.
///
/// Implementations must be `Send + Sync` (documents are processed
/// concurrently). All methods have default no-op implementations so callers
/// only override what they care about.
///
/// # Thread safety
///
/// `on_document_start`, `on_document_complete`, `on_document_skipped`, and
/// `on_document_error` may be called concurrently from different tasks, in
/// completion order rather than input order. Implementations must protect
/// shared mutable state with appropriate synchronisation primitives
/// (e.g. `Mutex`, `AtomicUsize`).
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is processed.
    ///
    /// # Arguments
    /// * `total` — number of documents in the batch
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before a document enters the pipeline.
    ///
    /// # Arguments
    /// * `index`    — 1-indexed position in the batch
    /// * `total`    — total documents in the batch
    /// * `filename` — document file name
    fn on_document_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a document's envelope has been assembled (and persisted,
    /// when the run writes output).
    ///
    /// # Arguments
    /// * `index`      — 1-indexed position in the batch
    /// * `total`      — total documents
    /// * `filename`   — document file name
    /// * `confidence` — processing confidence recorded in the envelope, 0–100
    fn on_document_complete(&self, index: usize, total: usize, filename: &str, confidence: f64) {
        let _ = (index, total, filename, confidence);
    }

    /// Called when a document is skipped because its envelope already exists.
    ///
    /// # Arguments
    /// * `index`    — 1-indexed position in the batch
    /// * `total`    — total documents
    /// * `filename` — document file name
    fn on_document_skipped(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a document fails (unreadable file, undecodable image,
    /// unwritable envelope).
    ///
    /// # Arguments
    /// * `index`    — 1-indexed position in the batch
    /// * `total`    — total documents
    /// * `filename` — document file name
    /// * `error`    — human-readable error description
    fn on_document_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let _ = (index, total, filename, error);
    }

    /// Called once after every document has been attempted.
    ///
    /// # Arguments
    /// * `total`     — total documents in the batch
    /// * `succeeded` — documents that produced an envelope this run
    ///   (pre-existing skips are not counted; track them via
    ///   [`Self::on_document_skipped`])
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op callback, used when the caller does not provide one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias for the injectable callback handle.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
