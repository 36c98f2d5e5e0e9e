//! Pipeline stages for page-image cataloguing.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch OCR engine) without touching other
//! stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ extract ──▶ validate
//! (URL/path) (tesseract+VLM) (strict JSON) (schema walk)
//! ```
//!
//! 1. [`input`]    — resolve the user-supplied path, directory, or URL into
//!    decoded, PNG-normalised page images
//! 2. [`ocr`]      — transcribe the page; local tesseract runs in
//!    `spawn_blocking`, the vision fallback covers handwriting
//! 3. [`extract`]  — one schema-constrained VLM call per page
//! 4. [`llm`]      — the OpenAI-compatible transport under [`ocr`] and
//!    [`extract`], with retry/backoff; the only network I/O in the pipeline
//! 5. [`validate`] — deterministic schema walk over whatever the model
//!    returned; nonconformance becomes report entries, never errors
//!
//! Envelope assembly and spreadsheet export live at the crate root
//! ([`crate::envelope`], [`crate::export`]): they consume the pipeline's
//! product rather than transform the page.

pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod validate;
