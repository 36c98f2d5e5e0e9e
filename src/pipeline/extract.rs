//! Structured extraction: one schema-constrained vision call per document.
//!
//! The request stacks every piece of evidence the model can use: the field
//! rules with the filename (filenames in archives encode box/folder/item
//! numbering), the page image itself, the authoritative transcription, and
//! the batch-level hints. The `response_format` block carries the wire
//! schema with `strict: true`, so a compliant endpoint refuses to generate
//! keys the schema does not declare.
//!
//! ## Never propagates
//!
//! Extraction returns a [`CandidateRecord`] unconditionally. A failed call,
//! a refusal, or an unparsable payload all degrade to the empty record — the
//! validator then reports every required key missing, and the envelope
//! records that verdict. An operator reading the output directory sees
//! exactly which pages produced nothing and why the batch still finished.

use crate::config::PipelineConfig;
use crate::pipeline::input::Document;
use crate::pipeline::llm::{ChatMessage, ChatRequest, ContentPart, ResponseFormat, VisionClient};
use crate::pipeline::ocr::truncate_chars;
use crate::prompts;
use crate::record::CandidateRecord;
use crate::schema;
use serde_json::Value;
use tracing::{error, warn};

/// Extract a candidate metadata record for one document.
pub async fn extract(
    client: &VisionClient,
    doc: &Document,
    transcription: &str,
    config: &PipelineConfig,
) -> CandidateRecord {
    let capped = truncate_chars(transcription.trim(), config.max_transcription_chars);

    let mut parts = vec![
        ContentPart::text(prompts::extraction_header(&doc.filename)),
        ContentPart::image(doc.to_data_url()),
        ContentPart::text(prompts::transcription_block(capped)),
    ];
    if let Some(block) = config.hints.as_prompt_block() {
        parts.push(ContentPart::text(block));
    }

    let request = ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage::system(prompts::EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user_parts(parts),
        ],
        // The schema constraint does the disciplining; temperature stays at
        // the provider default.
        temperature: None,
        max_tokens: Some(config.extraction_max_tokens),
        response_format: Some(ResponseFormat::strict_schema(
            schema::SCHEMA_NAME,
            schema::wire_schema().clone(),
        )),
    };

    let label = format!("{}: extraction", doc.filename);
    match client.call_with_retry(&request, &label, config).await {
        Ok(reply) => {
            let record = parse_candidate(&reply.content, &doc.filename);
            if record.is_empty() {
                warn!(
                    "{}: extraction produced an empty record (raw: {:?})",
                    doc.filename,
                    truncate_chars(&reply.content, 200)
                );
            }
            record
        }
        Err(e) => {
            error!("{}: extraction failed — {}", doc.filename, e);
            CandidateRecord::empty()
        }
    }
}

/// Parse a model payload into a candidate record.
///
/// Recovery order is fixed: direct parse first; if that fails (or parses to
/// a non-object), slice from the first `{` to the last `}` by byte offset
/// and reparse; if that also fails, fail closed to the empty record.
fn parse_candidate(raw: &str, filename: &str) -> CandidateRecord {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => match CandidateRecord::from_value(value) {
            Some(record) => return record,
            None => warn!(
                "{}: payload parsed but is not a JSON object; attempting brace recovery",
                filename
            ),
        },
        Err(e) => warn!("{}: JSON parse error ({e}); attempting brace recovery", filename),
    }
    recover_braced_object(raw).unwrap_or_else(CandidateRecord::empty)
}

fn recover_braced_object(raw: &str) -> Option<CandidateRecord> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&raw[start..=end])
        .ok()
        .and_then(CandidateRecord::from_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_payload_parses_directly() {
        let record = parse_candidate(r#"{"title": "Concert program", "date": null}"#, "a.png");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("title").unwrap(), "Concert program");
    }

    #[test]
    fn empty_object_is_an_empty_record() {
        let record = parse_candidate("{}", "a.png");
        assert!(record.is_empty());
    }

    #[test]
    fn prose_wrapped_payload_recovers() {
        let raw = "Here is the metadata you asked for:\n{\"title\": \"Telegram, 1939\"}\nLet me know!";
        let record = parse_candidate(raw, "a.png");
        assert_eq!(record.get("title").unwrap(), "Telegram, 1939");
    }

    #[test]
    fn fenced_payload_recovers() {
        let raw = "```json\n{\"creator\": \"Hurok, Sol\"}\n```";
        let record = parse_candidate(raw, "a.png");
        assert_eq!(record.get("creator").unwrap(), "Hurok, Sol");
    }

    #[test]
    fn top_level_array_recovers_inner_object() {
        let record = parse_candidate(r#"[{"title": "x"}]"#, "a.png");
        assert_eq!(record.get("title").unwrap(), "x");
    }

    #[test]
    fn garbage_fails_closed_to_empty() {
        assert!(parse_candidate("I could not read this page.", "a.png").is_empty());
        assert!(parse_candidate("", "a.png").is_empty());
    }

    #[test]
    fn unbalanced_braces_fail_closed() {
        let record = parse_candidate(r#"{"a": {"b": 1}"#, "a.png");
        assert!(record.is_empty());
    }

    #[test]
    fn reversed_braces_fail_closed() {
        assert!(parse_candidate("} nothing here {", "a.png").is_empty());
    }
}
