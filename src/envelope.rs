//! Envelope: the persisted unit of work, one JSON document per page.
//!
//! The envelope deliberately stores the **raw** candidate record rather than
//! a cleaned-up projection. Whatever the model produced — conformant or not —
//! is what lands on disk, and the `context` block says how much to trust it:
//! which model ran, the transcription confidence, and the validator's summary
//! when the record missed the schema. Repair happens downstream, with the
//! evidence intact.

use crate::pipeline::validate::ValidationReport;
use crate::record::CandidateRecord;
use serde::{Deserialize, Serialize};

/// Filename suffix for persisted envelopes: `<stem>.catalog.json`.
///
/// The double extension keeps catalog output distinguishable from any other
/// JSON a collection directory might hold, and is what the batch runner's
/// skip-if-exists check and the exporter's directory scan both key on.
pub const ENVELOPE_SUFFIX: &str = ".catalog.json";

/// One processed page: the extracted record plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub metadata: CandidateRecord,
    pub context: DocumentContext,
}

/// Provenance and trust signals for the record in the same envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentContext {
    /// Source image filename, extension included.
    pub filename: String,
    /// Transcription confidence for the page text, 0-100.
    pub processing_confidence: f64,
    /// Model identifier that produced the record.
    pub model: String,
    /// Validator summary, present only when the record is nonconformant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
}

impl Envelope {
    /// Wrap an extracted record with its provenance. Pure: no clock, no IO.
    pub fn assemble(
        metadata: CandidateRecord,
        filename: impl Into<String>,
        processing_confidence: f64,
        model: impl Into<String>,
        report: &ValidationReport,
    ) -> Self {
        Self {
            metadata,
            context: DocumentContext {
                filename: filename.into(),
                processing_confidence,
                model: model.into(),
                validation_error: report.summary(),
            },
        }
    }
}

/// Envelope filename for a document stem: `letter_001` -> `letter_001.catalog.json`.
pub fn envelope_filename(stem: &str) -> String {
    format!("{stem}{ENVELOPE_SUFFIX}")
}
