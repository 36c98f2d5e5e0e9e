//! Validation: walk a candidate record against the catalog schema.
//!
//! The extractor's `strict` response format asks the vendor to enforce the
//! schema; this module is where the pipeline enforces it itself. The walk is
//! pure and deterministic — same record in, same report out — and it never
//! fails: nonconformance is data, recorded in the envelope, not an error.
//!
//! Rule inventory:
//!
//! 1. **Closed schema** — keys the schema does not declare are reported.
//! 2. **Required keys** — every declared key must be present; `null` is the
//!    explicit absence marker, a missing key is a defect.
//! 3. **Types** — each field must match its declared shape (or be null).
//! 4. **String length** — `maxLength` is measured in characters, including
//!    inside arrays when the field declares a per-item bound.
//! 5. **Cardinality** — arrays respect `maxItems`.
//! 6. **Date pattern** — non-null dates match `YYYY`, `YYYY-MM`,
//!    `YYYY-MM-DD`, or `undated`.
//! 7. **Confidence range** — `field_confidence` values are integers 0-100.
//! 8. **Confidence coverage** (soft) — when the confidence map is present,
//!    populated fields should carry a non-zero entry and null fields should
//!    not carry a positive one.
//!
//! Issues are sorted by `(path, message)` so reports diff cleanly across
//! runs and the envelope's `validation_error` string is reproducible.

use crate::record::CandidateRecord;
use crate::schema::{self, FieldKind, FieldSpec};
use serde_json::Value;

/// One finding of the schema walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path: `date`, `subjects.2`, `field_confidence.title`.
    pub path: String,
    pub message: String,
}

/// The ordered findings for one record. Empty means conformant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn new(mut issues: Vec<ValidationIssue>) -> Self {
        issues.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));
        Self { issues }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter()
    }

    /// The envelope form: `path: message` segments joined by `"; "`, or
    /// `None` when the record is conformant.
    pub fn summary(&self) -> Option<String> {
        if self.issues.is_empty() {
            return None;
        }
        Some(
            self.issues
                .iter()
                .map(|i| format!("{}: {}", i.path, i.message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Walk `record` against the schema and report every nonconformance.
pub fn validate(record: &CandidateRecord) -> ValidationReport {
    let mut issues = Vec::new();

    for (key, _) in record.iter() {
        if schema::field(key).is_none() {
            issues.push(issue(key, "unexpected key: the schema is closed"));
        }
    }

    for name in schema::field_names() {
        if record.get(name).is_none() {
            issues.push(issue(name, "required key is missing"));
        }
    }

    for spec in &schema::FIELDS {
        if let Some(value) = record.get(spec.name) {
            check_field(spec, value, &mut issues);
        }
    }

    check_confidence_coverage(record, &mut issues);

    ValidationReport::new(issues)
}

fn issue(path: impl Into<String>, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        path: path.into(),
        message: message.into(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_field(spec: &FieldSpec, value: &Value, issues: &mut Vec<ValidationIssue>) {
    match &spec.kind {
        FieldKind::Text { max_len } => check_text(spec.name, value, Some(*max_len), issues),
        FieldKind::LongText => check_text(spec.name, value, None, issues),
        FieldKind::Date => match value {
            Value::Null => {}
            Value::String(s) => {
                if !schema::is_valid_date(s) {
                    issues.push(issue(
                        spec.name,
                        format!(
                            "'{s}' does not match the date pattern (YYYY, YYYY-MM, YYYY-MM-DD, or undated)"
                        ),
                    ));
                }
            }
            other => issues.push(issue(
                spec.name,
                format!("expected string or null, found {}", type_name(other)),
            )),
        },
        FieldKind::Flag => match value {
            Value::Null | Value::Bool(_) => {}
            other => issues.push(issue(
                spec.name,
                format!("expected boolean or null, found {}", type_name(other)),
            )),
        },
        FieldKind::TextArray {
            max_items,
            max_item_len,
        } => check_array(spec.name, value, *max_items, *max_item_len, issues),
        FieldKind::ConfidenceMap => check_confidence_map(spec.name, value, issues),
    }
}

fn check_text(
    name: &str,
    value: &Value,
    max_len: Option<usize>,
    issues: &mut Vec<ValidationIssue>,
) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            if let Some(max) = max_len {
                let n = s.chars().count();
                if n > max {
                    issues.push(issue(name, format!("exceeds maximum length ({n} > {max} chars)")));
                }
            }
        }
        other => issues.push(issue(
            name,
            format!("expected string or null, found {}", type_name(other)),
        )),
    }
}

fn check_array(
    name: &str,
    value: &Value,
    max_items: usize,
    max_item_len: Option<usize>,
    issues: &mut Vec<ValidationIssue>,
) {
    let items = match value {
        Value::Null => return,
        Value::Array(items) => items,
        other => {
            issues.push(issue(
                name,
                format!("expected array or null, found {}", type_name(other)),
            ));
            return;
        }
    };

    if items.len() > max_items {
        issues.push(issue(
            name,
            format!("has too many items ({} > {max_items})", items.len()),
        ));
    }

    for (idx, item) in items.iter().enumerate() {
        match item {
            Value::String(s) => {
                if let Some(max) = max_item_len {
                    let n = s.chars().count();
                    if n > max {
                        issues.push(issue(
                            format!("{name}.{idx}"),
                            format!("exceeds maximum length ({n} > {max} chars)"),
                        ));
                    }
                }
            }
            other => issues.push(issue(
                format!("{name}.{idx}"),
                format!("expected string, found {}", type_name(other)),
            )),
        }
    }
}

fn check_confidence_map(name: &str, value: &Value, issues: &mut Vec<ValidationIssue>) {
    let entries = match value {
        Value::Null => return,
        Value::Object(entries) => entries,
        other => {
            issues.push(issue(
                name,
                format!("expected object or null, found {}", type_name(other)),
            ));
            return;
        }
    };

    for (key, v) in entries {
        match v.as_i64() {
            Some(n) if (0..=100).contains(&n) => {}
            Some(n) => issues.push(issue(
                format!("{name}.{key}"),
                format!("confidence {n} is out of range 0-100"),
            )),
            None => issues.push(issue(
                format!("{name}.{key}"),
                format!("expected an integer 0-100, found {}", type_name(v)),
            )),
        }
    }
}

/// Soft coverage checks: populated fields should score, null fields should
/// not. Runs only when the confidence map is present as an object — the
/// map's own type/required findings already cover the other shapes.
fn check_confidence_coverage(record: &CandidateRecord, issues: &mut Vec<ValidationIssue>) {
    let entries = match record.get("field_confidence").and_then(Value::as_object) {
        Some(entries) => entries,
        None => return,
    };

    for spec in &schema::FIELDS {
        if spec.name == "field_confidence" {
            continue;
        }
        let populated = record
            .get(spec.name)
            .map(|v| !v.is_null())
            .unwrap_or(false);
        match entries.get(spec.name) {
            None => {
                if populated {
                    issues.push(issue(
                        format!("field_confidence.{}", spec.name),
                        "populated field has no confidence entry",
                    ));
                }
            }
            Some(v) => {
                // Entries the map's own check already rejected (wrong type,
                // out of range) are skipped here.
                if let Some(n) = v.as_i64().filter(|n| (0..=100).contains(n)) {
                    if populated && n == 0 {
                        issues.push(issue(
                            format!("field_confidence.{}", spec.name),
                            "populated field has confidence 0",
                        ));
                    } else if !populated && n > 0 {
                        issues.push(issue(
                            format!("field_confidence.{}", spec.name),
                            "null field has non-zero confidence",
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> CandidateRecord {
        CandidateRecord::from_value(value).expect("object")
    }

    /// Every declared key present and null — the minimal conformant record.
    fn all_null_record() -> Value {
        let mut map = serde_json::Map::new();
        for name in schema::field_names() {
            map.insert(name.to_string(), Value::Null);
        }
        Value::Object(map)
    }

    #[test]
    fn all_null_record_is_conformant() {
        let report = validate(&rec(all_null_record()));
        assert!(report.is_empty(), "unexpected issues: {:?}", report.issues());
        assert_eq!(report.summary(), None);
    }

    #[test]
    fn populated_record_with_consistent_confidence_is_conformant() {
        let mut v = all_null_record();
        v["title"] = json!("Letter from Sol Hurok to Marian Anderson, June 2, 1942");
        v["date"] = json!("1942-06-02");
        v["digitized"] = json!(true);
        v["subjects"] = json!(["Concert tours", "Contralto singers"]);
        v["field_confidence"] = json!({"title": 92, "date": 88, "digitized": 70, "subjects": 64});
        let report = validate(&rec(v));
        assert!(report.is_empty(), "unexpected issues: {:?}", report.issues());
    }

    #[test]
    fn empty_record_reports_every_required_key_missing() {
        let report = validate(&CandidateRecord::empty());
        assert_eq!(report.len(), schema::FIELDS.len());
        for issue in report.iter() {
            assert_eq!(issue.message, "required key is missing");
        }
        // Sorted by path.
        let paths: Vec<&str> = report.iter().map(|i| i.path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn unexpected_keys_are_reported() {
        let mut v = all_null_record();
        v["barcode"] = json!("0042");
        let report = validate(&rec(v));
        assert_eq!(report.len(), 1);
        assert_eq!(report.issues()[0].path, "barcode");
        assert!(report.issues()[0].message.contains("closed"));
    }

    #[test]
    fn iso_reduced_dates_pass() {
        for ok in ["1942", "1942-06", "1942-06-02", "undated"] {
            let mut v = all_null_record();
            v["date"] = json!(ok);
            let report = validate(&rec(v));
            assert!(report.is_empty(), "'{ok}' should validate, got {:?}", report.issues());
        }
    }

    #[test]
    fn prose_date_fails_the_pattern() {
        let mut v = all_null_record();
        v["date"] = json!("June 1942");
        let report = validate(&rec(v));
        assert_eq!(report.len(), 1);
        assert_eq!(report.issues()[0].path, "date");
        assert!(report.issues()[0].message.contains("does not match the date pattern"));
    }

    #[test]
    fn oversize_string_reports_char_length() {
        let mut v = all_null_record();
        v["title"] = json!("x".repeat(241));
        let report = validate(&rec(v));
        assert_eq!(report.len(), 1);
        assert_eq!(report.issues()[0].path, "title");
        assert!(report.issues()[0].message.contains("241 > 240"));

        // Exactly at the bound is fine.
        let mut v = all_null_record();
        v["title"] = json!("x".repeat(240));
        assert!(validate(&rec(v)).is_empty());
    }

    #[test]
    fn length_is_measured_in_chars_not_bytes() {
        let mut v = all_null_record();
        v["language"] = json!("ü".repeat(80)); // 160 bytes, 80 chars
        assert!(validate(&rec(v)).is_empty());
    }

    #[test]
    fn array_overflow_reports_max_items() {
        let mut v = all_null_record();
        v["subjects"] = json!(["a", "b", "c", "d", "e", "f", "g", "h", "i"]);
        let report = validate(&rec(v));
        assert_eq!(report.len(), 1);
        assert_eq!(report.issues()[0].path, "subjects");
        assert!(report.issues()[0].message.contains("9 > 8"));
    }

    #[test]
    fn array_items_check_type_and_length() {
        let mut v = all_null_record();
        v["subjects"] = json!(["fine", 7, "x".repeat(81)]);
        let report = validate(&rec(v));
        let paths: Vec<&str> = report.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["subjects.1", "subjects.2"]);
        assert!(report.issues()[0].message.contains("expected string"));
        assert!(report.issues()[1].message.contains("81 > 80"));
    }

    #[test]
    fn contributor_items_have_no_length_bound() {
        let mut v = all_null_record();
        v["contributors"] = json!(["x".repeat(500)]);
        assert!(validate(&rec(v)).is_empty());
    }

    #[test]
    fn scalar_type_mismatches_are_reported() {
        let mut v = all_null_record();
        v["digitized"] = json!("yes");
        v["title"] = json!(42);
        v["subjects"] = json!("not a list");
        let report = validate(&rec(v));
        let paths: Vec<&str> = report.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["digitized", "subjects", "title"]);
        assert!(report.issues()[0].message.contains("expected boolean or null"));
        assert!(report.issues()[1].message.contains("expected array or null"));
        assert!(report.issues()[2].message.contains("expected string or null"));
    }

    #[test]
    fn confidence_values_must_be_integers_in_range() {
        let mut v = all_null_record();
        v["field_confidence"] = json!({"title": 150, "creator": -5, "date": "high", "place": 88.5});
        let report = validate(&rec(v));
        let by_path: Vec<(&str, &str)> = report
            .iter()
            .map(|i| (i.path.as_str(), i.message.as_str()))
            .collect();
        assert_eq!(by_path.len(), 4);
        assert!(by_path.contains(&("field_confidence.title", "confidence 150 is out of range 0-100")));
        assert!(by_path.contains(&("field_confidence.creator", "confidence -5 is out of range 0-100")));
        assert!(by_path.iter().any(|(p, m)| *p == "field_confidence.date" && m.contains("found string")));
        assert!(by_path.iter().any(|(p, m)| *p == "field_confidence.place" && m.contains("found number")));
    }

    #[test]
    fn coverage_flags_populated_fields_without_entries() {
        let mut v = all_null_record();
        v["title"] = json!("Program");
        v["field_confidence"] = json!({});
        let report = validate(&rec(v));
        assert_eq!(report.len(), 1);
        assert_eq!(report.issues()[0].path, "field_confidence.title");
        assert_eq!(report.issues()[0].message, "populated field has no confidence entry");
    }

    #[test]
    fn coverage_flags_zero_scores_and_ghost_scores() {
        let mut v = all_null_record();
        v["title"] = json!("Program");
        v["field_confidence"] = json!({"title": 0, "creator": 40});
        let report = validate(&rec(v));
        let by_path: Vec<(&str, &str)> = report
            .iter()
            .map(|i| (i.path.as_str(), i.message.as_str()))
            .collect();
        assert_eq!(by_path.len(), 2);
        assert!(by_path.contains(&("field_confidence.creator", "null field has non-zero confidence")));
        assert!(by_path.contains(&("field_confidence.title", "populated field has confidence 0")));
    }

    #[test]
    fn coverage_is_silent_when_the_map_is_null() {
        let mut v = all_null_record();
        v["title"] = json!("Program");
        // Null map: the soft coverage rules have nothing to walk.
        assert!(validate(&rec(v)).is_empty());
    }

    #[test]
    fn summary_joins_sorted_segments() {
        let mut v = all_null_record();
        v["date"] = json!("June 1942");
        v["barcode"] = json!("0042");
        let summary = validate(&rec(v)).summary().unwrap();
        let idx_barcode = summary.find("barcode:").unwrap();
        let idx_date = summary.find("date:").unwrap();
        assert!(idx_barcode < idx_date);
        assert!(summary.contains("; "));
    }

    #[test]
    fn validation_is_deterministic() {
        let mut v = all_null_record();
        v["subjects"] = json!([3, 1, 4]);
        v["zzz"] = json!(true);
        let a = validate(&rec(v.clone()));
        let b = validate(&rec(v));
        assert_eq!(a, b);
    }
}
