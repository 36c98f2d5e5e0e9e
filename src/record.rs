//! Record types: the extractor's raw candidate and its typed mirror.
//!
//! Two representations, two jobs:
//!
//! * [`CandidateRecord`] is whatever JSON object the model actually returned,
//!   preserved verbatim. The validator walks it, the envelope persists it.
//!   Keeping it raw is what makes validation findings auditable — a missing
//!   key stays missing in the artifact instead of being papered over.
//! * [`MetadataRecord`] is the schema mirrored as a plain struct, one
//!   explicit `Option` per field. Downstream consumers (the exporter above
//!   all) get compile-time exhaustiveness instead of string-keyed lookups;
//!   adding a schema field without handling it everywhere stops compiling.
//!
//! Conversion between the two is total: [`MetadataRecord::from_candidate`]
//! never fails, it lowers mis-typed values to `None` and leaves the
//! complaining to the validator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The raw metadata object produced by one extraction call.
///
/// May be empty (failed call), partial, or non-conformant; conformance is
/// the validator's verdict, not this type's guarantee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateRecord(Map<String, Value>);

impl CandidateRecord {
    /// The empty record — the degraded result of a failed extraction.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a parsed JSON object. Non-objects have no candidate form;
    /// callers fall back to [`CandidateRecord::empty`].
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<Map<String, Value>> for CandidateRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The catalog schema as a typed record.
///
/// Field order and names mirror [`crate::schema::FIELDS`] exactly (a test
/// pins the parity). Serialization always emits every key, `null` marking
/// absence — consumers never see a key-less record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub contributors: Option<Vec<String>>,
    pub correspondents: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub place: Option<String>,
    pub language: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub theme: Option<Vec<String>>,
    pub genre: Option<Vec<String>>,
    pub description: Option<String>,
    pub collection: Option<String>,
    pub series: Option<String>,
    pub folder: Option<String>,
    pub r#box: Option<String>,
    pub format: Option<String>,
    pub medium: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub rights: Option<String>,
    pub repository: Option<String>,
    pub identifier: Option<String>,
    pub call_number: Option<String>,
    pub digital_identifier: Option<String>,
    pub reproduction_number: Option<String>,
    pub permalink: Option<String>,
    pub digital_collection: Option<String>,
    pub digital_publisher: Option<String>,
    pub digitized: Option<bool>,
    pub transcript: Option<String>,
    pub text_reading: Option<String>,
    pub generated_title: Option<String>,
    /// Per-field confidence, 0..=100 when schema-conformant.
    pub field_confidence: Option<BTreeMap<String, u8>>,
}

impl MetadataRecord {
    /// Lowers a raw candidate into the typed mirror. Total: values of the
    /// wrong shape become `None` (scalars) or are dropped (array/map
    /// entries); the validator, not this conversion, reports them.
    pub fn from_candidate(candidate: &CandidateRecord) -> Self {
        Self {
            title: take_text(candidate, "title"),
            creator: take_text(candidate, "creator"),
            contributors: take_list(candidate, "contributors"),
            correspondents: take_list(candidate, "correspondents"),
            publisher: take_text(candidate, "publisher"),
            date: take_text(candidate, "date"),
            place: take_text(candidate, "place"),
            language: take_text(candidate, "language"),
            subjects: take_list(candidate, "subjects"),
            theme: take_list(candidate, "theme"),
            genre: take_list(candidate, "genre"),
            description: take_text(candidate, "description"),
            collection: take_text(candidate, "collection"),
            series: take_text(candidate, "series"),
            folder: take_text(candidate, "folder"),
            r#box: take_text(candidate, "box"),
            format: take_text(candidate, "format"),
            medium: take_text(candidate, "medium"),
            resource_type: take_text(candidate, "type"),
            rights: take_text(candidate, "rights"),
            repository: take_text(candidate, "repository"),
            identifier: take_text(candidate, "identifier"),
            call_number: take_text(candidate, "call_number"),
            digital_identifier: take_text(candidate, "digital_identifier"),
            reproduction_number: take_text(candidate, "reproduction_number"),
            permalink: take_text(candidate, "permalink"),
            digital_collection: take_text(candidate, "digital_collection"),
            digital_publisher: take_text(candidate, "digital_publisher"),
            digitized: take_flag(candidate, "digitized"),
            transcript: take_text(candidate, "transcript"),
            text_reading: take_text(candidate, "text_reading"),
            generated_title: take_text(candidate, "generated_title"),
            field_confidence: take_confidence(candidate, "field_confidence"),
        }
    }
}

fn take_text(candidate: &CandidateRecord, key: &str) -> Option<String> {
    candidate.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn take_flag(candidate: &CandidateRecord, key: &str) -> Option<bool> {
    candidate.get(key).and_then(Value::as_bool)
}

fn take_list(candidate: &CandidateRecord, key: &str) -> Option<Vec<String>> {
    candidate.get(key)?.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect()
    })
}

fn take_confidence(candidate: &CandidateRecord, key: &str) -> Option<BTreeMap<String, u8>> {
    candidate.get(key)?.as_object().map(|entries| {
        entries
            .iter()
            .filter_map(|(name, v)| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .map(|n| (name.clone(), n))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use serde_json::json;

    fn candidate(value: Value) -> CandidateRecord {
        CandidateRecord::from_value(value).expect("object")
    }

    #[test]
    fn typed_record_mirrors_schema_exactly() {
        let serialized = serde_json::to_value(MetadataRecord::default()).unwrap();
        let keys: Vec<&str> = serialized
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        let declared: Vec<&str> = schema::field_names().collect();
        assert_eq!(keys.len(), declared.len());
        for name in &declared {
            assert!(keys.contains(name), "typed record is missing '{name}'");
        }
    }

    #[test]
    fn default_record_serializes_all_keys_as_null() {
        let serialized = serde_json::to_value(MetadataRecord::default()).unwrap();
        for (key, value) in serialized.as_object().unwrap() {
            assert!(value.is_null(), "'{key}' should default to null");
        }
    }

    #[test]
    fn from_candidate_reads_well_typed_fields() {
        let c = candidate(json!({
            "title": "Letter to Marian Anderson",
            "date": "1942-06-02",
            "digitized": true,
            "subjects": ["Sopranos (Singers)", "Concert tours"],
            "field_confidence": {"title": 92, "date": 88},
            "type": "Correspondence",
            "box": "14",
        }));
        let record = MetadataRecord::from_candidate(&c);
        assert_eq!(record.title.as_deref(), Some("Letter to Marian Anderson"));
        assert_eq!(record.date.as_deref(), Some("1942-06-02"));
        assert_eq!(record.digitized, Some(true));
        assert_eq!(record.resource_type.as_deref(), Some("Correspondence"));
        assert_eq!(record.r#box.as_deref(), Some("14"));
        assert_eq!(
            record.subjects.as_deref(),
            Some(&["Sopranos (Singers)".to_string(), "Concert tours".to_string()][..])
        );
        assert_eq!(record.field_confidence.unwrap()["date"], 88);
    }

    #[test]
    fn from_candidate_lowers_mistyped_fields_to_none() {
        let c = candidate(json!({
            "title": 42,
            "digitized": "yes",
            "subjects": "not a list",
            "contributors": ["Hurok, Sol", 7, null],
        }));
        let record = MetadataRecord::from_candidate(&c);
        assert_eq!(record.title, None);
        assert_eq!(record.digitized, None);
        assert_eq!(record.subjects, None);
        // Non-string entries drop; the validator reports them.
        assert_eq!(record.contributors.as_deref(), Some(&["Hurok, Sol".to_string()][..]));
    }

    #[test]
    fn from_candidate_of_empty_is_default() {
        let record = MetadataRecord::from_candidate(&CandidateRecord::empty());
        assert_eq!(record, MetadataRecord::default());
    }

    #[test]
    fn candidate_rejects_non_objects() {
        assert!(CandidateRecord::from_value(json!([1, 2])).is_none());
        assert!(CandidateRecord::from_value(json!("text")).is_none());
        assert!(CandidateRecord::from_value(json!(null)).is_none());
    }

    #[test]
    fn candidate_round_trips_verbatim() {
        let raw = json!({"title": null, "unexpected": {"nested": 1}});
        let c = candidate(raw.clone());
        assert_eq!(serde_json::to_value(&c).unwrap(), raw);
    }
}
