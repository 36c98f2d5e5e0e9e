//! CLI binary for scan2loc.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scan2loc::{
    load_envelopes, process, render_csv, to_row, BatchProgressCallback, PipelineConfig,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-document
/// log lines using [indicatif]. Designed to work correctly when documents
/// complete out-of-order (concurrent mode).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-document wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of documents that errored out.
    errors: AtomicUsize,
    /// Count of documents skipped because they were already catalogued.
    skips: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_batch_start` (called once the input has been resolved).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
            skips: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Cataloguing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        // Switch from spinner-only style to full progress bar now that we
        // know the actual document count.
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Cataloguing {total} page images…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, filename: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, filename: &str, confidence: f64) {
        let elapsed = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index,
            total,
            filename,
            dim(&format!("conf {confidence:>3.0}")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_skipped(&self, index: usize, total: usize, filename: &str) {
        self.skips.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            dim("⊘"),
            index,
            total,
            filename,
            dim("already catalogued"),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let elapsed = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            filename,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let skipped = self.skips.load(Ordering::SeqCst);

        let tail = if skipped > 0 {
            format!("  ({skipped} already catalogued)")
        } else {
            String::new()
        };

        if failed == 0 {
            eprintln!(
                "{} {} pages catalogued{}",
                green("✔"),
                bold(&succeeded.to_string()),
                tail
            );
        } else {
            eprintln!(
                "{} {}/{} pages catalogued  ({} failed){}",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
                tail,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Catalog a directory of scans (one .catalog.json per page image)
  scan2loc scans/box3 --out out

  # Single page, with collection context for better records
  scan2loc letter_001.png --collection "Marian Anderson Papers" \
      --repository "Library of Congress, Music Division"

  # Catalog and export a review spreadsheet in one run
  scan2loc scans/box3 --out out --csv review.csv

  # Re-export an existing output directory without reprocessing
  scan2loc --export-only --out out --csv review.csv

  # Re-process everything, ignoring existing envelopes
  scan2loc scans/box3 --out out --force

  # Fetch a single page image from a URL
  scan2loc https://example.org/scans/ma_0042_001.tif --out out

  # Cheaper model for clean typescript
  scan2loc scans/box3 --model gpt-4o-mini

MODELS:
  Model         Input $/1M  Output $/1M  Notes
  ─────────     ──────────  ───────────  ─────
  gpt-4o        $2.50       $10.00       default; strongest on handwriting
  gpt-4o-mini   $0.15       $0.60        fine for clean typescript

  Any OpenAI-compatible endpoint that supports strict JSON-schema response
  formats works: point --api-base at it and pick the matching --model.

COST ESTIMATE (per page):
  ~1,100 input tokens (image + OCR text + field rules), ~700 output tokens.
  A 200-page box runs roughly $2.20 with gpt-4o or $0.12 with gpt-4o-mini;
  pages needing the vision transcription fallback cost about double.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY         API key for the vision endpoint (required)
  SCAN2LOC_MODEL         Override model ID
  SCAN2LOC_API_BASE      OpenAI-compatible endpoint base URL
  SCAN2LOC_CONCURRENCY   Concurrent documents in flight
  SCAN2LOC_OCR_LANG      Tesseract language pack (default: eng)

SETUP:
  1. Install tesseract:  apt install tesseract-ocr    (optional, recommended)
  2. Set API key:        export OPENAI_API_KEY=sk-...
  3. Catalog:            scan2loc scans/box3 --out out --csv review.csv

  Without tesseract every page falls back to vision transcription — the
  output is the same, the bill is not.
"#;

/// Catalog scanned archival documents using OCR and Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "scan2loc",
    version,
    about = "Catalog scanned archival documents into Library of Congress-style metadata",
    long_about = "Catalog page images (local files, directories, or URLs) into Library of \
Congress-style metadata records using local OCR and Vision Language Models. Writes one \
reviewable JSON envelope per page and exports the standard 27-column review spreadsheet.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page image, directory of scans, or HTTP/HTTPS URL.
    #[arg(required_unless_present = "export_only")]
    input: Option<String>,

    /// Output directory for envelopes (one <stem>.catalog.json per page).
    #[arg(short, long, env = "SCAN2LOC_OUT", default_value = "./out")]
    out: PathBuf,

    /// Also write the 27-column review spreadsheet to this CSV file.
    #[arg(long, env = "SCAN2LOC_CSV")]
    csv: Option<PathBuf>,

    /// Export existing envelopes from --out without processing anything.
    /// Writes CSV to --csv, or stdout when --csv is not given.
    #[arg(long)]
    export_only: bool,

    /// Vision model ID.
    #[arg(
        long,
        env = "SCAN2LOC_MODEL",
        default_value = "gpt-4o",
        long_help = "Vision model to use. Default: gpt-4o ($2.50/$10.00 per 1M tokens), the \
strongest choice for handwritten material.\nFor clean typescript, gpt-4o-mini ($0.15/$0.60) \
is an order of magnitude cheaper."
    )]
    model: String,

    /// Base URL of an OpenAI-compatible endpoint.
    #[arg(long, env = "SCAN2LOC_API_BASE")]
    api_base: Option<String>,

    /// Collection the scans belong to (recorded in extracted records).
    #[arg(long, env = "SCAN2LOC_COLLECTION")]
    collection: Option<String>,

    /// Holding repository (recorded in extracted records).
    #[arg(long, env = "SCAN2LOC_REPOSITORY")]
    repository: Option<String>,

    /// Permalink prefix or finding-aid URL (recorded in extracted records).
    #[arg(long, env = "SCAN2LOC_PERMALINK")]
    permalink: Option<String>,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "SCAN2LOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Tesseract language pack for local OCR.
    #[arg(long, env = "SCAN2LOC_OCR_LANG", default_value = "eng")]
    ocr_language: String,

    /// Sampling temperature for the vision transcription fallback (0.0–2.0).
    #[arg(long, env = "SCAN2LOC_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Re-process documents whose envelope already exists.
    #[arg(long, env = "SCAN2LOC_FORCE")]
    force: bool,

    /// Retries per model call on failure.
    #[arg(long, env = "SCAN2LOC_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Per-call API timeout in seconds.
    #[arg(long, env = "SCAN2LOC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCAN2LOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2LOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2LOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2LOC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.export_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Export-only mode ─────────────────────────────────────────────────
    if cli.export_only {
        return export_csv(&cli.out, cli.csv.as_deref(), cli.quiet).await;
    }

    let Some(ref input) = cli.input else {
        anyhow::bail!("INPUT is required unless --export-only is set");
    };

    // ── Build config ─────────────────────────────────────────────────────
    // The progress bar starts as a spinner (no document count yet);
    // `on_batch_start` resizes it once the input has been resolved.
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run the batch ────────────────────────────────────────────────────
    let output = process(input, &cli.out, &config)
        .await
        .context("Catalog run failed")?;

    // Summary (the callback already printed the final green/red tick).
    if !cli.quiet && !show_progress {
        eprintln!(
            "Catalogued {}/{} page images in {}ms",
            output.stats.processed, output.stats.total_documents, output.stats.duration_ms
        );
        if output.stats.skipped > 0 {
            eprintln!("  {} skipped (already catalogued)", output.stats.skipped);
        }
        for outcome in &output.outcomes {
            if let Some(ref e) = outcome.error {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
    }

    // Validation flags matter to the reviewer whichever way progress ran.
    let flagged = output
        .outcomes
        .iter()
        .filter(|o| {
            o.envelope
                .as_ref()
                .is_some_and(|e| e.context.validation_error.is_some())
        })
        .count();
    if flagged > 0 && !cli.quiet {
        eprintln!(
            "   {} record(s) flagged by validation — see the envelopes' validation_error",
            flagged
        );
    }

    // ── Export ───────────────────────────────────────────────────────────
    if cli.csv.is_some() {
        export_csv(&cli.out, cli.csv.as_deref(), cli.quiet).await?;
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .model(cli.model.clone())
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .ocr_language(cli.ocr_language.clone())
        .force(cli.force)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base.clone());
    }
    if let Some(ref collection) = cli.collection {
        builder = builder.collection_hint(collection.clone());
    }
    if let Some(ref repository) = cli.repository {
        builder = builder.repository_hint(repository.clone());
    }
    if let Some(ref permalink) = cli.permalink {
        builder = builder.permalink_hint(permalink.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Render every envelope under `out_dir` as the review spreadsheet.
///
/// Writes to `csv_path` when given, stdout otherwise.
async fn export_csv(out_dir: &Path, csv_path: Option<&Path>, quiet: bool) -> Result<()> {
    let envelopes = load_envelopes(out_dir)
        .await
        .with_context(|| format!("Failed to load envelopes from {}", out_dir.display()))?;
    let rows: Vec<_> = envelopes.iter().map(to_row).collect();
    let csv = render_csv(&rows);

    match csv_path {
        Some(path) => {
            tokio::fs::write(path, &csv)
                .await
                .with_context(|| format!("Failed to write CSV to {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "{} {} row(s)  →  {}",
                    green("✔"),
                    bold(&rows.len().to_string()),
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(csv.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
