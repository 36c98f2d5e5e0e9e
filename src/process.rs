//! Eager (full-batch) processing entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: process every resolved page image,
//! then return. It collects every [`DocumentOutcome`] into memory before
//! returning. Use [`crate::stream::process_stream`] instead when you want
//! outcomes progressively — driving a UI over a few hundred scans — or need
//! to react to failures while the batch is still running.
//!
//! ## Failure model
//!
//! [`process`] returns `Err` only for batch-fatal conditions: unresolvable
//! input, missing API key, unwritable output directory. A document that
//! fails to read or decode becomes an outcome carrying a
//! [`DocumentError`]; a model call that fails becomes a degraded envelope
//! whose validation report says so. Either way the rest of the box is
//! still catalogued.

use crate::config::PipelineConfig;
use crate::envelope::{envelope_filename, Envelope};
use crate::error::{CatalogError, DocumentError};
use crate::pipeline::llm::VisionClient;
use crate::pipeline::{extract, input, ocr, validate};
use crate::pipeline::input::Document;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What happened to one page image in a batch run.
#[derive(Debug)]
pub struct DocumentOutcome {
    /// 1-based position in the batch, matching progress-callback indices.
    pub index: usize,
    /// Source image filename.
    pub filename: String,
    /// The assembled envelope. `None` when the document was skipped or
    /// failed before the pipeline ran. Present even when persisting failed,
    /// so callers can still inspect or re-save the result.
    pub envelope: Option<Envelope>,
    /// Where the envelope was (or already is) persisted.
    pub output_path: Option<PathBuf>,
    /// True when an existing envelope short-circuited processing.
    pub skipped: bool,
    /// Wall-clock time spent on this document.
    pub duration_ms: u64,
    /// The document-level failure, if any.
    pub error: Option<DocumentError>,
}

impl DocumentOutcome {
    /// True when the document was processed and persisted this run.
    pub fn succeeded(&self) -> bool {
        !self.skipped && self.error.is_none()
    }
}

/// Aggregate statistics for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// Page images the input resolved to.
    pub total_documents: usize,
    /// Documents processed and persisted this run.
    pub processed: usize,
    /// Documents that failed to read, decode, or persist.
    pub failed: usize,
    /// Documents skipped because their envelope already existed.
    pub skipped: usize,
    /// Wall-clock time for the whole run.
    pub duration_ms: u64,
}

/// Everything a batch run produced, in input order.
#[derive(Debug)]
pub struct BatchOutput {
    pub outcomes: Vec<DocumentOutcome>,
    pub stats: BatchStats,
}

/// Catalog a page image, directory of scans, or URL into `out_dir`.
///
/// This is the primary entry point for the library. One envelope
/// (`<stem>.catalog.json`) is written per page image; documents whose
/// envelope already exists are skipped unless `config.force` is set.
///
/// # Errors
/// Returns `Err(CatalogError)` only for fatal conditions:
/// - Input not found / no page images / download failed
/// - No API key configured
/// - Output directory could not be created
///
/// Per-document failures are reported in `output.outcomes` (check
/// `output.stats.failed`), never as `Err`.
pub async fn process(
    input_str: impl AsRef<str>,
    out_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, CatalogError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    let out_dir = out_dir.as_ref();
    info!("Starting catalog run: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let total = resolved.paths.len();
    info!("Input resolved to {} page image(s)", total);

    // ── Step 2: Create the vision client ─────────────────────────────────
    // Fails here, before any document is touched, when no key is set.
    let client = VisionClient::from_config(config)?;

    // ── Step 3: Prepare the output directory ─────────────────────────────
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| CatalogError::OutputDirFailed {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    // ── Step 4: Process documents concurrently ───────────────────────────
    let mut outcomes: Vec<DocumentOutcome> =
        stream::iter(resolved.paths.iter().enumerate().map(|(idx, path)| {
            let client = &client;
            async move { handle_path(client, path, idx + 1, total, out_dir, config).await }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    // Completion order is nondeterministic; restore input order.
    outcomes.sort_by_key(|o| o.index);

    // ── Step 5: Compute stats ────────────────────────────────────────────
    let processed = outcomes.iter().filter(|o| o.succeeded()).count();
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    let skipped = outcomes.iter().filter(|o| o.skipped).count();

    let stats = BatchStats {
        total_documents: total,
        processed,
        failed,
        skipped,
        duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Catalog run complete: {}/{} documents, {} skipped, {} failed, {}ms total",
        processed, total, skipped, failed, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, processed);
    }

    Ok(BatchOutput { outcomes, stats })
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    input_str: impl AsRef<str>,
    out_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, CatalogError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CatalogError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(input_str, out_dir, config))
}

/// Run the per-page pipeline on an already-loaded document.
///
/// Infallible on purpose: transcription and extraction degrade in place and
/// the validation report records what went missing, so every call yields an
/// envelope. Callers that need persistence and skip logic use [`process`];
/// this is the building block for scans that come from a database or an
/// upload stream rather than a directory:
///
/// ```rust,no_run
/// use scan2loc::{process_document, Document, PipelineConfig, VisionClient};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("box3_folder9_item02.tif")?;
/// let config = PipelineConfig::default();
/// let client = VisionClient::from_config(&config)?;
/// let doc = Document::from_bytes("box3_folder9_item02.tif", &bytes, None)?;
/// let envelope = process_document(&client, &doc, &config).await;
/// println!("{}", serde_json::to_string_pretty(&envelope)?);
/// # Ok(())
/// # }
/// ```
pub async fn process_document(
    client: &VisionClient,
    doc: &Document,
    config: &PipelineConfig,
) -> Envelope {
    // ── Step 1: Transcribe the page ──────────────────────────────────────
    let transcription = ocr::transcribe(doc, Some(client), config).await;
    debug!(
        "{}: transcription has {} chars at confidence {:.0}",
        doc.filename,
        transcription.text.chars().count(),
        transcription.confidence
    );

    // ── Step 2: Extract metadata ─────────────────────────────────────────
    let candidate = extract::extract(client, doc, &transcription.text, config).await;

    // ── Step 3: Validate against the schema ──────────────────────────────
    let report = validate::validate(&candidate);
    if !report.is_empty() {
        warn!(
            "{}: record failed validation with {} issue(s)",
            doc.filename,
            report.len()
        );
    }

    // ── Step 4: Assemble the envelope ────────────────────────────────────
    Envelope::assemble(
        candidate,
        doc.filename.clone(),
        transcription.confidence,
        config.model.clone(),
        &report,
    )
}

/// Load every persisted envelope directly under `dir`, sorted by filename.
///
/// The export-only path: turn an existing output directory into spreadsheet
/// rows without re-processing anything. Files that match the envelope suffix
/// but fail to parse are logged and skipped rather than failing the export.
pub async fn load_envelopes(dir: impl AsRef<Path>) -> Result<Vec<Envelope>, CatalogError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CatalogError::InputNotFound {
            path: dir.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => CatalogError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => CatalogError::Internal(format!("reading {}: {e}", dir.display())),
    })?;

    let mut found: Vec<(String, Envelope)> = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CatalogError::Internal(e.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(crate::envelope::ENVELOPE_SUFFIX) {
            continue;
        }
        let path = entry.path();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("{}: skipping unreadable envelope: {}", path.display(), e);
                continue;
            }
        };
        match serde_json::from_str::<Envelope>(&text) {
            Ok(envelope) => found.push((name, envelope)),
            Err(e) => warn!("{}: skipping unparseable envelope: {}", path.display(), e),
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    debug!("Loaded {} envelope(s) from {}", found.len(), dir.display());
    Ok(found.into_iter().map(|(_, envelope)| envelope).collect())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Process one path end to end: skip check, load, pipeline, persist.
/// Shared between the eager batch and the streaming API.
pub(crate) async fn handle_path(
    client: &VisionClient,
    path: &Path,
    index: usize,
    total: usize,
    out_dir: &Path,
    config: &PipelineConfig,
) -> DocumentOutcome {
    let start = Instant::now();
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());
    let out_path = out_dir.join(envelope_filename(&stem));

    // The skip check runs before the image is even read: re-running a batch
    // over a half-finished directory must not re-spend API calls.
    if !config.force && out_path.exists() {
        debug!("{}: envelope already exists, skipping", filename);
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_skipped(index, total, &filename);
        }
        return DocumentOutcome {
            index,
            filename,
            envelope: None,
            output_path: Some(out_path),
            skipped: true,
            duration_ms: start.elapsed().as_millis() as u64,
            error: None,
        };
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(index, total, &filename);
    }

    let doc = match Document::from_path(path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("{}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(index, total, &filename, &e.to_string());
            }
            return DocumentOutcome {
                index,
                filename,
                envelope: None,
                output_path: None,
                skipped: false,
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(e),
            };
        }
    };

    let envelope = process_document(client, &doc, config).await;

    match write_envelope(&envelope, &out_path).await {
        Ok(()) => {
            info!("{} -> {}", filename, out_path.display());
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_complete(
                    index,
                    total,
                    &filename,
                    envelope.context.processing_confidence,
                );
            }
            DocumentOutcome {
                index,
                filename,
                envelope: Some(envelope),
                output_path: Some(out_path),
                skipped: false,
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
            }
        }
        Err(e) => {
            warn!("{}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(index, total, &filename, &e.to_string());
            }
            DocumentOutcome {
                index,
                filename,
                envelope: Some(envelope),
                output_path: Some(out_path),
                skipped: false,
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(e),
            }
        }
    }
}

/// Atomic write: temp file in the same directory, then rename.
async fn write_envelope(envelope: &Envelope, path: &Path) -> Result<(), DocumentError> {
    let filename = envelope.context.filename.clone();
    let persist_err = |detail: String| DocumentError::PersistFailed {
        filename: filename.clone(),
        detail,
    };

    let json =
        serde_json::to_string_pretty(envelope).map_err(|e| persist_err(e.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| persist_err(format!("{}: {e}", tmp_path.display())))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| persist_err(format!("{}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::validate::ValidationReport;
    use crate::record::CandidateRecord;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn png_fixture() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([220, 220, 220])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Config that fails API calls fast: refused endpoint, no retries.
    fn offline_config() -> PipelineConfig {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        PipelineConfig::builder()
            .api_base("http://127.0.0.1:9")
            .api_timeout_secs(2)
            .max_retries(0)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn sample_envelope(filename: &str) -> Envelope {
        Envelope::assemble(
            CandidateRecord::empty(),
            filename,
            0.0,
            "gpt-4o",
            &ValidationReport::default(),
        )
    }

    #[tokio::test]
    async fn write_envelope_persists_and_cleans_up_temp() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("page_001.catalog.json");

        write_envelope(&sample_envelope("page_001.png"), &out_path)
            .await
            .unwrap();

        assert!(out_path.exists());
        assert!(!dir.path().join("page_001.catalog.json.tmp").exists());
        let text = std::fs::read_to_string(&out_path).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.context.filename, "page_001.png");
    }

    #[tokio::test]
    async fn existing_envelopes_are_skipped_and_bad_files_are_failures() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        std::fs::write(in_dir.path().join("good.png"), png_fixture()).unwrap();
        std::fs::write(in_dir.path().join("bad.png"), b"not an image at all").unwrap();
        // Pre-seed good.png's envelope so it short-circuits before any API use.
        std::fs::write(
            out_dir.path().join("good.catalog.json"),
            serde_json::to_string(&sample_envelope("good.png")).unwrap(),
        )
        .unwrap();

        let config = offline_config();
        let output = process(in_dir.path().to_str().unwrap(), out_dir.path(), &config)
            .await
            .unwrap();

        assert_eq!(output.stats.total_documents, 2);
        assert_eq!(output.stats.skipped, 1);
        assert_eq!(output.stats.failed, 1);
        assert_eq!(output.stats.processed, 0);

        // Input order: bad.png sorts before good.png.
        assert_eq!(output.outcomes[0].filename, "bad.png");
        assert!(matches!(
            output.outcomes[0].error,
            Some(DocumentError::UnsupportedFormat { .. })
        ));
        assert!(output.outcomes[1].skipped);
        assert_eq!(
            output.outcomes[1].output_path.as_deref(),
            Some(out_dir.path().join("good.catalog.json").as_path())
        );
    }

    #[tokio::test]
    async fn force_reprocesses_and_persists_a_degraded_envelope() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        std::fs::write(in_dir.path().join("page.png"), png_fixture()).unwrap();
        std::fs::write(out_dir.path().join("page.catalog.json"), b"stale").unwrap();

        std::env::set_var("OPENAI_API_KEY", "test-key");
        let config = PipelineConfig::builder()
            .api_base("http://127.0.0.1:9")
            .api_timeout_secs(2)
            .max_retries(0)
            .retry_backoff_ms(1)
            .force(true)
            .build()
            .unwrap();

        let output = process(in_dir.path().to_str().unwrap(), out_dir.path(), &config)
            .await
            .unwrap();

        assert_eq!(output.stats.processed, 1);
        assert_eq!(output.stats.skipped, 0);

        // The unreachable endpoint degrades extraction to an empty record;
        // the envelope still lands, with the validator's verdict inside.
        let text = std::fs::read_to_string(out_dir.path().join("page.catalog.json")).unwrap();
        let envelope: Envelope = serde_json::from_str(&text).unwrap();
        assert!(envelope.metadata.is_empty());
        assert!(envelope
            .context
            .validation_error
            .as_deref()
            .unwrap()
            .contains("required key is missing"));
    }

    #[tokio::test]
    async fn load_envelopes_reads_sorted_and_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.catalog.json", "a.catalog.json"] {
            let stem = name.strip_suffix(".catalog.json").unwrap();
            std::fs::write(
                dir.path().join(name),
                serde_json::to_string(&sample_envelope(&format!("{stem}.png"))).unwrap(),
            )
            .unwrap();
        }
        std::fs::write(dir.path().join("broken.catalog.json"), b"{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let envelopes = load_envelopes(dir.path()).await.unwrap();
        let names: Vec<&str> = envelopes
            .iter()
            .map(|e| e.context.filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[tokio::test]
    async fn load_envelopes_from_missing_dir_is_input_not_found() {
        let err = load_envelopes("/definitely/not/here").await.unwrap_err();
        assert!(matches!(err, CatalogError::InputNotFound { .. }));
    }
}
