//! Export: flatten envelopes into the staff spreadsheet layout.
//!
//! Processing archives metadata as one JSON envelope per page; cataloguers
//! review it as a spreadsheet. This module is the bridge: a fixed 27-column
//! row whose headers match the review template column for column, including
//! the quirks the template inherited from its spreadsheet origins — an
//! always-empty `Issue` column and a second identifier column literally
//! named `Identifier.1`.
//!
//! Projection rules:
//!
//! * Absence renders as the empty string, and an empty string counts as
//!   absent when a column has a fallback field (`Title` falls back to
//!   `generated_title`, `Type` to `format`, and so on).
//! * List fields join with `"; "`, skipping empty entries.
//! * `Digitized` renders as `Yes` or empty — the template has no `No`.
//!
//! CSV rendering is RFC 4180 by hand: quote when a field contains a comma,
//! quote, or line break, double interior quotes, CRLF line endings.

use crate::envelope::Envelope;
use crate::record::MetadataRecord;

/// Column headers of the review spreadsheet, in template order.
pub const EXPORT_COLUMNS: [&str; 27] = [
    "Identifier",
    "Title",
    "Series",
    "Issue",
    "Creator",
    "Contributors",
    "Correspondents",
    "Date",
    "Publisher",
    "Location",
    "Description",
    "Subject",
    "Theme",
    "Genre",
    "Type",
    "Language",
    "Repository",
    "Collection",
    "Folder",
    "Rights",
    "Digital Collection",
    "Digital Publisher",
    "Digitized",
    "Transcript",
    "Identifier.1",
    "Preservation Filename",
    "Object ID",
];

/// One spreadsheet row, values parallel to [`EXPORT_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    values: Vec<String>,
}

impl ExportRow {
    /// Value under a header, or `None` for a header the template lacks.
    pub fn get(&self, column: &str) -> Option<&str> {
        EXPORT_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        EXPORT_COLUMNS
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }
}

/// Project one envelope onto the template. Total: any envelope yields a
/// full row, a sparse record just yields a mostly-empty one.
pub fn to_row(envelope: &Envelope) -> ExportRow {
    let md = MetadataRecord::from_candidate(&envelope.metadata);
    let values = vec![
        first_of(&md.identifier, &md.digital_identifier),
        first_of(&md.title, &md.generated_title),
        text(&md.series),
        String::new(), // Issue: carried by the template, never populated
        text(&md.creator),
        join_list(&md.contributors),
        join_list(&md.correspondents),
        text(&md.date),
        text(&md.publisher),
        text(&md.place),
        text(&md.description),
        join_list(&md.subjects),
        join_list(&md.theme),
        join_list(&md.genre),
        first_of(&md.resource_type, &md.format),
        text(&md.language),
        text(&md.repository),
        text(&md.collection),
        text(&md.folder),
        text(&md.rights),
        text(&md.digital_collection),
        text(&md.digital_publisher),
        if md.digitized == Some(true) { "Yes" } else { "" }.to_string(),
        first_of(&md.transcript, &md.text_reading),
        text(&md.digital_identifier),
        envelope.context.filename.clone(),
        first_of(&md.call_number, &md.reproduction_number),
    ];
    debug_assert_eq!(values.len(), EXPORT_COLUMNS.len());
    ExportRow { values }
}

/// Render header plus rows as RFC 4180 CSV (CRLF line endings).
pub fn render_csv(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    push_line(&mut out, EXPORT_COLUMNS.iter().copied());
    for row in rows {
        push_line(&mut out, row.values.iter().map(String::as_str));
    }
    out
}

fn push_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

fn csv_field(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// First non-empty of two fields; empty strings count as absent.
fn first_of(primary: &Option<String>, fallback: &Option<String>) -> String {
    primary
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
        .unwrap_or_default()
        .to_string()
}

fn join_list(values: &Option<Vec<String>>) -> String {
    match values {
        Some(items) => items
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("; "),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::validate::ValidationReport;
    use crate::record::CandidateRecord;
    use serde_json::{json, Value};

    fn envelope(metadata: Value, filename: &str) -> Envelope {
        Envelope::assemble(
            CandidateRecord::from_value(metadata).expect("object"),
            filename,
            90.0,
            "gpt-4o",
            &ValidationReport::default(),
        )
    }

    #[test]
    fn template_has_27_columns_in_order() {
        assert_eq!(EXPORT_COLUMNS.len(), 27);
        assert_eq!(EXPORT_COLUMNS[0], "Identifier");
        assert_eq!(EXPORT_COLUMNS[9], "Location");
        assert_eq!(EXPORT_COLUMNS[24], "Identifier.1");
        assert_eq!(EXPORT_COLUMNS[25], "Preservation Filename");
        assert_eq!(EXPORT_COLUMNS[26], "Object ID");
    }

    #[test]
    fn empty_record_yields_a_total_row() {
        let row = to_row(&envelope(json!({}), "page_001.png"));
        assert_eq!(row.values().len(), 27);
        assert_eq!(row.get("Preservation Filename"), Some("page_001.png"));
        for (column, value) in row.iter() {
            if column != "Preservation Filename" {
                assert_eq!(value, "", "'{column}' should be empty");
            }
        }
    }

    #[test]
    fn populated_record_maps_onto_the_template() {
        let row = to_row(&envelope(
            json!({
                "title": "Letter from Sol Hurok to Marian Anderson",
                "creator": "Hurok, Sol",
                "date": "1942-06-02",
                "place": "New York (N.Y.)",
                "subjects": ["Concert tours", "Contralto singers"],
                "type": "Correspondence",
                "digitized": true,
                "digital_identifier": "ma-0042",
                "call_number": "Box 14, Folder 3",
            }),
            "ma_0042_001.tif",
        ));
        assert_eq!(row.get("Title"), Some("Letter from Sol Hurok to Marian Anderson"));
        assert_eq!(row.get("Creator"), Some("Hurok, Sol"));
        assert_eq!(row.get("Date"), Some("1942-06-02"));
        assert_eq!(row.get("Location"), Some("New York (N.Y.)"));
        assert_eq!(row.get("Subject"), Some("Concert tours; Contralto singers"));
        assert_eq!(row.get("Type"), Some("Correspondence"));
        assert_eq!(row.get("Digitized"), Some("Yes"));
        // No identifier: the digital identifier stands in, and still owns
        // its own column.
        assert_eq!(row.get("Identifier"), Some("ma-0042"));
        assert_eq!(row.get("Identifier.1"), Some("ma-0042"));
        assert_eq!(row.get("Object ID"), Some("Box 14, Folder 3"));
    }

    #[test]
    fn empty_strings_fall_through_to_fallback_fields() {
        let row = to_row(&envelope(
            json!({
                "title": "",
                "generated_title": "[Handwritten letter, June 1942]",
                "type": "",
                "format": "1 leaf",
                "transcript": "",
                "text_reading": "Dear Miss Anderson...",
                "call_number": "",
                "reproduction_number": "LC-USZ62-54231",
            }),
            "p.png",
        ));
        assert_eq!(row.get("Title"), Some("[Handwritten letter, June 1942]"));
        assert_eq!(row.get("Type"), Some("1 leaf"));
        assert_eq!(row.get("Transcript"), Some("Dear Miss Anderson..."));
        assert_eq!(row.get("Object ID"), Some("LC-USZ62-54231"));
    }

    #[test]
    fn issue_column_is_always_empty() {
        let row = to_row(&envelope(json!({"title": "Program"}), "p.png"));
        assert_eq!(row.get("Issue"), Some(""));
    }

    #[test]
    fn digitized_false_renders_empty() {
        let row = to_row(&envelope(json!({"digitized": false}), "p.png"));
        assert_eq!(row.get("Digitized"), Some(""));
    }

    #[test]
    fn list_join_skips_empty_entries() {
        let row = to_row(&envelope(
            json!({"contributors": ["Anderson, Marian", "", "Hurok, Sol"]}),
            "p.png",
        ));
        assert_eq!(row.get("Contributors"), Some("Anderson, Marian; Hurok, Sol"));
    }

    #[test]
    fn unknown_column_lookup_is_none() {
        let row = to_row(&envelope(json!({}), "p.png"));
        assert_eq!(row.get("Barcode"), None);
    }

    #[test]
    fn csv_quotes_commas_quotes_and_newlines() {
        let row = to_row(&envelope(
            json!({
                "title": "Letter, signed",
                "description": "He wrote \"bravo\" twice",
                "transcript": "line one\nline two",
            }),
            "p.png",
        ));
        let csv = render_csv(&[row]);
        let mut lines = csv.split("\r\n");
        let header = lines.next().unwrap();
        assert!(header.starts_with("Identifier,Title,Series,Issue,"));
        let body = lines.next().unwrap();
        assert!(body.contains("\"Letter, signed\""));
        assert!(body.contains("\"He wrote \"\"bravo\"\" twice\""));
        assert!(csv.contains("\"line one\nline two\""));
    }

    #[test]
    fn csv_of_no_rows_is_just_the_header() {
        let csv = render_csv(&[]);
        assert_eq!(csv.matches("\r\n").count(), 1);
        assert!(csv.starts_with("Identifier,"));
    }
}
