//! # scan2loc
//!
//! Catalog scanned archival documents into Library of Congress-style
//! metadata using OCR and Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Digitisation projects produce directories full of page images and no
//! metadata. Hand-cataloguing is the bottleneck: a trained archivist manages
//! a few dozen pages a day and the backlog is measured in boxes. This crate
//! reads each page the way a cataloguer would — tesseract for clean
//! typescript, a VLM for handwriting and degraded scans — and drafts a
//! schema-constrained catalog record for a human to review rather than
//! retype. Records that miss the schema are kept, flagged, and exported
//! anyway; a wrong draft with the evidence attached beats a silent gap.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page image (png / jpg / tiff / …)
//!  │
//!  ├─ 1. Input       resolve file, directory, or URL; decode + normalise
//!  ├─ 2. Transcribe  local tesseract; vision fallback when the text is thin
//!  ├─ 3. Extract     one schema-constrained VLM call per page
//!  ├─ 4. Validate    walk the record against the closed catalog schema
//!  ├─ 5. Envelope    metadata + provenance, one `.catalog.json` per page
//!  └─ 6. Export      27-column spreadsheet rows for catalog review
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2loc::{process, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY from the environment
//!     let config = PipelineConfig::builder()
//!         .collection_hint("Marian Anderson Papers")
//!         .build()?;
//!     let output = process("scans/box3", "out", &config).await?;
//!     eprintln!(
//!         "{} catalogued, {} skipped, {} failed",
//!         output.stats.processed, output.stats.skipped, output.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! Turning an output directory into a review spreadsheet:
//!
//! ```rust,no_run
//! use scan2loc::{load_envelopes, render_csv, to_row};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let envelopes = load_envelopes("out").await?;
//! let rows: Vec<_> = envelopes.iter().map(to_row).collect();
//! std::fs::write("catalog.csv", render_csv(&rows))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2loc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! scan2loc = { version = "0.3", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! | Model | $/1M tokens | Quality | Best for |
//! |-------|------------|---------|----------|
//! | `gpt-4o`      | $2.50/$10.00 | ★★★★★ | Default — strongest on handwriting |
//! | `gpt-4o-mini` | $0.15/$0.60  | ★★★   | Cheap drafts of clean typescript |
//!
//! Any OpenAI-compatible endpoint that supports strict JSON-schema response
//! formats works: set `api_base` (or `--api-base`) and the corresponding
//! model name.
//!
//! ## Requirements
//!
//! Local OCR shells out to the `tesseract` binary. When it is not installed
//! the pipeline logs the fact and leans on the vision fallback instead —
//! slower and costlier, but nothing fails.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod envelope;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod schema;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Hints, PipelineConfig, PipelineConfigBuilder};
pub use envelope::{envelope_filename, DocumentContext, Envelope, ENVELOPE_SUFFIX};
pub use error::{CatalogError, DocumentError};
pub use export::{render_csv, to_row, ExportRow, EXPORT_COLUMNS};
pub use pipeline::input::{Document, SUPPORTED_EXTENSIONS};
pub use pipeline::llm::VisionClient;
pub use pipeline::ocr::TranscriptionResult;
pub use pipeline::validate::{validate, ValidationIssue, ValidationReport};
pub use process::{
    load_envelopes, process, process_document, process_sync, BatchOutput, BatchStats,
    DocumentOutcome,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{CandidateRecord, MetadataRecord};
pub use stream::{process_stream, OutcomeStream};
