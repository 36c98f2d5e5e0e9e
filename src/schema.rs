//! The catalog schema: a closed, declarative description of every metadata
//! field a record may carry.
//!
//! One table ([`FIELDS`]) is the single source of truth for three consumers:
//!
//! * [`wire_schema`] renders it as a JSON Schema document sent to the model
//!   inside the `response_format` request block, so generation is constrained
//!   vendor-side;
//! * the validator walks candidate records against it, so local verification
//!   never trusts the vendor;
//! * [`crate::record::MetadataRecord`] mirrors it field-for-field, and a test
//!   pins that parity.
//!
//! Why a closed schema? Archival ingest jobs feed fixed-column spreadsheets
//! and MARC-adjacent tooling downstream. An extractor that invents keys or
//! omits them produces rows that silently misalign, so every field is
//! `required` (with `null` as the explicit absence marker) and
//! `additionalProperties` is refused.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

/// Model used when the caller does not override it.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Hard cap, in characters, on transcription text forwarded to the model.
/// Applied end-wise to already-rendered text, never mid-field.
pub const MAX_TRANSCRIPTION_CHARS: usize = 12_000;

/// Completion budget for the structured extraction call.
pub const MAX_OUTPUT_TOKENS: u32 = 4_096;

/// Name the wire schema is registered under in the `response_format` block.
pub const SCHEMA_NAME: &str = "catalog_metadata";

/// Dates are ISO-reduced (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`) or the literal
/// token `undated`. Anything else — month names, circa ranges, slashes —
/// is a validation finding, not a normalization job for this layer.
pub const DATE_PATTERN: &str = r"^(\d{4}(-\d{2}(-\d{2})?)?|undated)$";

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(DATE_PATTERN).expect("date pattern compiles"));

/// True when `value` satisfies the archival date pattern.
pub fn is_valid_date(value: &str) -> bool {
    DATE_RE.is_match(value)
}

/// The shape of one schema field. Every variant admits `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// String bounded to `max_len` characters.
    Text { max_len: usize },
    /// Unbounded string (transcript-class fields).
    LongText,
    /// Array of strings, at most `max_items` entries, each optionally
    /// bounded to `max_item_len` characters.
    TextArray {
        max_items: usize,
        max_item_len: Option<usize>,
    },
    /// String constrained to [`DATE_PATTERN`].
    Date,
    /// Boolean.
    Flag,
    /// Object mapping field names to integer confidence scores in 0..=100.
    ConfidenceMap,
}

/// One declared field of the catalog schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn text(name: &'static str, max_len: usize) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text { max_len },
    }
}

const fn list(name: &'static str, max_items: usize, max_item_len: Option<usize>) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::TextArray {
            max_items,
            max_item_len,
        },
    }
}

/// Every field a record may carry, in catalog order.
///
/// The numbers are the ingest contract's column widths; do not retune them
/// without coordinating with whatever consumes the export rows.
pub const FIELDS: [FieldSpec; 33] = [
    text("title", 240),
    text("creator", 200),
    list("contributors", 8, None),
    list("correspondents", 12, None),
    text("publisher", 160),
    FieldSpec {
        name: "date",
        kind: FieldKind::Date,
    },
    text("place", 160),
    text("language", 80),
    list("subjects", 8, Some(80)),
    list("theme", 6, Some(80)),
    list("genre", 6, Some(80)),
    text("description", 1000),
    text("collection", 200),
    text("series", 200),
    text("folder", 120),
    text("box", 120),
    text("format", 80),
    text("medium", 120),
    text("type", 120),
    text("rights", 240),
    text("repository", 200),
    text("identifier", 160),
    text("call_number", 120),
    text("digital_identifier", 160),
    text("reproduction_number", 160),
    text("permalink", 240),
    text("digital_collection", 200),
    text("digital_publisher", 200),
    FieldSpec {
        name: "digitized",
        kind: FieldKind::Flag,
    },
    FieldSpec {
        name: "transcript",
        kind: FieldKind::LongText,
    },
    FieldSpec {
        name: "text_reading",
        kind: FieldKind::LongText,
    },
    text("generated_title", 240),
    FieldSpec {
        name: "field_confidence",
        kind: FieldKind::ConfidenceMap,
    },
];

/// Looks up a field by name. `None` means the key is foreign to the schema.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// All declared field names, in catalog order.
pub fn field_names() -> impl Iterator<Item = &'static str> {
    FIELDS.iter().map(|f| f.name)
}

static WIRE_SCHEMA: Lazy<Value> = Lazy::new(render_wire_schema);

/// The JSON Schema document submitted with every extraction request.
///
/// Rendered once from [`FIELDS`]; strict mode upstream means the vendor
/// rejects or repairs non-conforming generations before we ever see them —
/// but the local validator runs regardless.
pub fn wire_schema() -> &'static Value {
    &WIRE_SCHEMA
}

fn render_wire_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for spec in &FIELDS {
        properties.insert(spec.name.to_string(), property_schema(&spec.kind));
    }
    let required: Vec<Value> = field_names().map(Value::from).collect();
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

fn property_schema(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Text { max_len } => json!({
            "type": ["string", "null"],
            "maxLength": max_len,
        }),
        FieldKind::LongText => json!({
            "type": ["string", "null"],
        }),
        FieldKind::TextArray {
            max_items,
            max_item_len,
        } => {
            let items = match max_item_len {
                Some(len) => json!({ "type": "string", "maxLength": len }),
                None => json!({ "type": "string" }),
            };
            json!({
                "type": ["array", "null"],
                "items": items,
                "maxItems": max_items,
            })
        }
        FieldKind::Date => json!({
            "type": ["string", "null"],
            "pattern": DATE_PATTERN,
        }),
        FieldKind::Flag => json!({
            "type": ["boolean", "null"],
        }),
        FieldKind::ConfidenceMap => json!({
            "type": ["object", "null"],
            "additionalProperties": { "type": "integer", "minimum": 0, "maximum": 100 },
        }),
    }
}
