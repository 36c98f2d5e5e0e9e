//! Configuration types for the cataloging pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across workers, log them, and diff two runs to
//! understand why their envelopes differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::CatalogError;
use crate::progress::ProgressCallback;
use crate::schema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a cataloging run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use scan2loc::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .model("gpt-4o-mini")
///     .concurrency(8)
///     .collection_hint("Marian Anderson Papers")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Vision model identifier, e.g. "gpt-4o", "gpt-4o-mini". Default: "gpt-4o".
    ///
    /// Recorded verbatim in every envelope's context block, so a re-run with a
    /// different model is distinguishable in the persisted artifacts.
    pub model: String,

    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    /// If `None`, uses the official OpenAI API.
    ///
    /// Any endpoint that understands vision content parts and the
    /// `json_schema` response format works here (Azure front-ends, LiteLLM
    /// proxies, vLLM with a capable model).
    pub api_base: Option<String>,

    /// Number of documents processed concurrently. Default: 4.
    ///
    /// The pipeline is network-bound: each document costs one or two model
    /// calls plus a local OCR pass. Four in flight keeps a batch moving
    /// without tripping per-minute token limits on standard API tiers. Raise
    /// it if your quota is generous; lower it when you see 429s.
    pub concurrency: usize,

    /// Sampling temperature for the fallback transcription call. Default: 0.0.
    ///
    /// Transcription wants determinism — the model should read the page, not
    /// improvise. The extraction call does not send a temperature at all; the
    /// schema constraint does the disciplining there.
    pub temperature: f32,

    /// Completion budget for the fallback transcription call. Default: 900.
    ///
    /// A page whose local OCR came back near-empty is usually sparse
    /// (handwriting, a photograph caption, a stamp), so 900 tokens covers it.
    pub transcription_max_tokens: u32,

    /// Completion budget for the structured extraction call. Default: 4096.
    ///
    /// The record includes two full transcription fields; dense typed pages
    /// need the headroom. Setting this too low truncates the JSON mid-object
    /// and costs a brace-recovery round.
    pub extraction_max_tokens: u32,

    /// Maximum retry attempts on a failed model call. Default: 1.
    ///
    /// One retry catches the transient blips (overloaded backend, dropped
    /// connection) without stalling a batch behind a permanently broken call.
    /// Permanent failures degrade per contract: empty transcription text,
    /// empty candidate record.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Minimum trimmed character count for a local OCR result to stand on its
    /// own. Default: 25.
    ///
    /// Below this the page is treated as OCR-hostile (handwriting, faded
    /// typescript, photographs) and the vision fallback is consulted.
    pub min_local_chars: usize,

    /// Hard cap, in characters, on transcription text forwarded to the model.
    /// Default: 12 000. Applied end-wise on a char boundary.
    pub max_transcription_chars: usize,

    /// Tesseract language code for the local OCR pass. Default: "eng".
    pub ocr_language: String,

    /// Collection-level defaults that bias extraction. Default: empty.
    pub hints: Hints,

    /// Reprocess documents whose envelope already exists. Default: false.
    ///
    /// The skip check runs before any model call, so re-running a batch over
    /// a partially processed directory only pays for the gaps.
    pub force: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Observer for batch progress. Default: `None` (silent).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: schema::DEFAULT_MODEL.to_string(),
            api_base: None,
            concurrency: 4,
            temperature: 0.0,
            transcription_max_tokens: 900,
            extraction_max_tokens: schema::MAX_OUTPUT_TOKENS,
            max_retries: 1,
            retry_backoff_ms: 500,
            min_local_chars: 25,
            max_transcription_chars: schema::MAX_TRANSCRIPTION_CHARS,
            ocr_language: "eng".to_string(),
            hints: Hints::default(),
            force: false,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("concurrency", &self.concurrency)
            .field("temperature", &self.temperature)
            .field("transcription_max_tokens", &self.transcription_max_tokens)
            .field("extraction_max_tokens", &self.extraction_max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("min_local_chars", &self.min_local_chars)
            .field("max_transcription_chars", &self.max_transcription_chars)
            .field("ocr_language", &self.ocr_language)
            .field("hints", &self.hints)
            .field("force", &self.force)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = Some(url.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn transcription_max_tokens(mut self, n: u32) -> Self {
        self.config.transcription_max_tokens = n;
        self
    }

    pub fn extraction_max_tokens(mut self, n: u32) -> Self {
        self.config.extraction_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn min_local_chars(mut self, n: usize) -> Self {
        self.config.min_local_chars = n;
        self
    }

    pub fn max_transcription_chars(mut self, n: usize) -> Self {
        self.config.max_transcription_chars = n.max(100);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn hints(mut self, hints: Hints) -> Self {
        self.config.hints = hints;
        self
    }

    pub fn collection_hint(mut self, value: impl Into<String>) -> Self {
        self.config.hints.collection = Some(value.into());
        self
    }

    pub fn repository_hint(mut self, value: impl Into<String>) -> Self {
        self.config.hints.repository = Some(value.into());
        self
    }

    pub fn permalink_hint(mut self, value: impl Into<String>) -> Self {
        self.config.hints.permalink = Some(value.into());
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, CatalogError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(CatalogError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(CatalogError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Hints ────────────────────────────────────────────────────────────────

/// Collection-level defaults forwarded to the extractor.
///
/// A batch usually comes from one known collection at one known repository;
/// telling the model so fills provenance fields the page itself rarely
/// states. Hints bias — they never override on-item evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hints {
    pub collection: Option<String>,
    pub repository: Option<String>,
    pub permalink: Option<String>,
}

impl Hints {
    pub fn is_empty(&self) -> bool {
        self.collection.is_none() && self.repository.is_none() && self.permalink.is_none()
    }

    /// Render the `HINTS:` block of the extraction user message, or `None`
    /// when there is nothing to say.
    pub fn as_prompt_block(&self) -> Option<String> {
        let mut lines = Vec::new();
        if let Some(v) = &self.collection {
            lines.push(format!("default.collection={v}"));
        }
        if let Some(v) = &self.repository {
            lines.push(format!("default.repository={v}"));
        }
        if let Some(v) = &self.permalink {
            lines.push(format!("default.permalink={v}"));
        }
        if lines.is_empty() {
            None
        } else {
            Some(format!("HINTS:\n{}", lines.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hints_render_nothing() {
        assert_eq!(Hints::default().as_prompt_block(), None);
    }

    #[test]
    fn hints_render_one_line_per_default() {
        let hints = Hints {
            collection: Some("Marian Anderson Papers".into()),
            repository: None,
            permalink: Some("https://findingaids.library.upenn.edu/records/UPENN_RBML_PUSp-Ms-Coll-200".into()),
        };
        let block = hints.as_prompt_block().unwrap();
        assert!(block.starts_with("HINTS:\n"));
        assert!(block.contains("default.collection=Marian Anderson Papers"));
        assert!(!block.contains("default.repository"));
        assert!(block.contains("default.permalink=https://"));
    }

    #[test]
    fn builder_clamps_degenerate_values() {
        let config = PipelineConfig::builder()
            .concurrency(0)
            .temperature(9.0)
            .max_transcription_chars(3)
            .build()
            .unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.max_transcription_chars, 100);
    }

    #[test]
    fn builder_rejects_blank_model() {
        let err = PipelineConfig::builder().model("  ").build().unwrap_err();
        assert!(err.to_string().contains("Model"));
    }
}
