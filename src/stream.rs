//! Streaming batch API: emit document outcomes as they complete.
//!
//! ## Why stream?
//!
//! A box of scans takes minutes. A streams-based API lets callers update a
//! review UI as each envelope lands, retry failures while the batch is
//! still running, or feed rows to an exporter incrementally instead of
//! waiting for [`crate::process::process`] to return the whole batch.
//!
//! Envelopes are persisted exactly as in the eager API — the stream is a
//! different delivery mechanism, not a different pipeline. Outcomes arrive
//! in completion order (sort by `index` if input order matters), and
//! per-document progress callbacks still fire; the batch-level callbacks
//! do not, because the caller driving the stream already owns that view.

use crate::config::PipelineConfig;
use crate::error::CatalogError;
use crate::pipeline::llm::VisionClient;
use crate::pipeline::input;
use crate::process::{handle_path, DocumentOutcome};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of document outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = DocumentOutcome> + Send>>;

/// Catalog an input into `out_dir`, streaming outcomes as they are ready.
///
/// # Returns
/// - `Ok(OutcomeStream)` — a stream of [`DocumentOutcome`]s, completion order
/// - `Err(CatalogError)` — fatal error (input not found, no API key, etc.)
///
/// # Example
/// ```rust,no_run
/// use scan2loc::{process_stream, PipelineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let mut outcomes = process_stream("scans/box3", "out", &config).await?;
/// while let Some(outcome) = outcomes.next().await {
///     match (&outcome.envelope, &outcome.error) {
///         (Some(env), _) => println!("{}: confidence {:.0}", outcome.filename,
///             env.context.processing_confidence),
///         (None, Some(e)) => eprintln!("{e}"),
///         (None, None) => println!("{}: already catalogued", outcome.filename),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_stream(
    input_str: impl AsRef<str>,
    out_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<OutcomeStream, CatalogError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming catalog run: {}", input_str);

    // ── Resolve input ────────────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let total = resolved.paths.len();

    // ── Create the vision client ─────────────────────────────────────────
    let client = VisionClient::from_config(config)?;

    // ── Prepare the output directory ─────────────────────────────────────
    let out_dir = out_dir.as_ref().to_path_buf();
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(|e| CatalogError::OutputDirFailed {
            path: out_dir.clone(),
            source: e,
        })?;

    // ── Build the stream ─────────────────────────────────────────────────
    // The resolved batch owns the temp dir behind URL downloads; the Arc
    // keeps it alive until the last outcome has been yielded.
    let concurrency = config.concurrency;
    let config = config.clone();
    let resolved = Arc::new(resolved);

    let s = stream::iter((0..total).map(move |idx| {
        let client = client.clone();
        let config = config.clone();
        let out_dir = out_dir.clone();
        let resolved = Arc::clone(&resolved);
        async move {
            let path = resolved.paths[idx].clone();
            handle_path(&client, &path, idx + 1, total, &out_dir, &config).await
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn png_fixture() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([240, 240, 240])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

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

    #[tokio::test]
    async fn stream_yields_one_outcome_per_page_image() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        std::fs::write(in_dir.path().join("p1.png"), png_fixture()).unwrap();
        std::fs::write(in_dir.path().join("p2.png"), png_fixture()).unwrap();

        let config = offline_config();
        let mut outcomes = process_stream(in_dir.path().to_str().unwrap(), out_dir.path(), &config)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            seen.push(outcome);
        }
        seen.sort_by_key(|o| o.index);

        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|o| o.succeeded()));
        assert!(out_dir.path().join("p1.catalog.json").exists());
        assert!(out_dir.path().join("p2.catalog.json").exists());
    }

    #[tokio::test]
    async fn fatal_errors_surface_before_the_stream_exists() {
        let config = offline_config();
        let err = process_stream("/definitely/not/here", "/tmp/out", &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CatalogError::InputNotFound { .. }));
    }
}
