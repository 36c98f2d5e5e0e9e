//! Prompt text for the two vision-model calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the marker conventions (`[HANDWRITTEN:
//!    text]`, `[ILLEGIBLE]`, `[UNCLEAR]`) and default strings ("Rights status
//!    not determined") are part of the observable record contract; changing
//!    them requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the composed user blocks
//!    without spinning up a real model, making prompt regressions easy to
//!    catch.

/// System prompt for the structured extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a meticulous academic-library cataloger and metadata specialist. Extract Library of Congress-style metadata aligned with Dublin Core practice.

Follow these rules precisely:

1. GROUNDING
   - Ground every field strictly in the provided image and OCR text
   - Do NOT invent data; if unknown, use null (or 'undated' / the default rights)
   - Prefer labelled on-item evidence (e.g. 'Author:', 'Date:')

2. NORMALISATION
   - Normalize dates to ISO (YYYY or YYYY-MM-DD) or 'undated'
   - Subjects/theme/genre are concise topical strings (1-5 words, singular)
   - Where the schema is an array and multiple values reasonably apply,
     include a short list; otherwise choose the most primary

3. TITLES
   - If the document shows a clear date or year, incorporate it into
     generated_title (e.g. 'Letter from X to Y, June 2, 1942') so items
     sort chronologically

4. HANDWRITTEN CONTENT
   - Identify handwritten text separately
   - Place all handwritten text in 'transcript' with clear [HANDWRITTEN] markers
   - 'text_reading' holds the clean, linear reading text (typed + handwritten
     combined) for analysis purposes

5. OUTPUT FORMAT
   - Return ONLY a JSON object that validates against the schema"#;

/// Field rules sent inside the user message of every extraction call.
pub const FIELD_RULES: &str = r#"CSV-ALIGNED FIELDS TO POPULATE WHEN POSSIBLE (matching schema keys):
- title, generated_title, creator, contributors[], correspondents[], publisher, date, place, language
- subjects[], theme[], genre[], description, collection, series, folder, box
- format, medium, type, rights, repository
- identifier, call_number, digital_identifier, reproduction_number, permalink
- digital_collection, digital_publisher, digitized (true/false)
- transcript, text_reading, field_confidence

CRITICAL FIELD DIFFERENCES:
- 'transcript': cleanest verbatim transcription with special markers:
  use [HANDWRITTEN: text] to mark handwritten portions, [ILLEGIBLE] or
  [UNCLEAR] for unreadable parts, and preserve line breaks and original
  formatting. This field lets librarians see document structure and
  handwritten vs typed content.
- 'text_reading': linear, simplified reading text for computational
  analysis: clean flowing text without special markers, typed and
  handwritten combined, formatting removed, content preserved.
- 'generated_title': include the date/year if visible
  (e.g. 'Letter from X to Y, 1942').

Other rules:
- Keep subjects/theme/genre short and specific; avoid punctuation and
  subfields like '--'.
- Rights: use the printed statement if present; else 'Rights status not determined'.
- field_confidence: 0-100 integers for each populated field; 0 if null."#;

/// User prompt for the fallback vision transcription call (plain text, no
/// schema constraint).
pub const FALLBACK_TRANSCRIBE_PROMPT: &str = "Transcribe ALL visible text. \
Preserve line breaks; prefix clearly handwritten lines with '[handwritten] '. \
Use '[illegible]'/'[unclear]' for unreadable parts. Return PLAIN TEXT only.";

/// Builds the leading text part of the extraction user message.
pub fn extraction_header(filename: &str) -> String {
    format!("FILENAME: {filename}\n\n{FIELD_RULES}")
}

/// Builds the OCR-text part of the extraction user message. Empty
/// transcriptions are announced rather than omitted so the model knows the
/// image is its only evidence.
pub fn transcription_block(text: &str) -> String {
    if text.is_empty() {
        "OCR TEXT:\n(none)".to_string()
    } else {
        format!("OCR TEXT:\n{text}")
    }
}
