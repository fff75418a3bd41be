//! Parses model output into a [`SummaryRecord`] with a fixed section schema.
//!
//! Parsing never fails: unusable input degrades to marker values so partial
//! results are never lost.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::job_processor::SummaryRecord;

/// Section names the model is instructed to emit, in output order
pub const SECTIONS: [&str; 4] = ["Case Subject", "Legal Basis", "Court Decision", "Reasoning"];

pub const NOT_FOUND: &str = "Not found.";
pub const TEXT_TOO_SHORT: &str = "Text too short to summarize.";
pub const FORMAT_ERROR: &str = "Error: summary not in expected format.";
pub const SOURCE_ERROR: &str = "Error: source text unavailable.";

/// How many previously kept lines a repeated line is checked against
const REPEAT_WINDOW: usize = 3;

/// Parse raw model output (text or an already-structured mapping).
pub fn parse_summary(key: &str, raw: &Value) -> SummaryRecord {
    match raw {
        Value::String(text) => parse_text(key, text),
        Value::Object(map) => {
            let sections = SECTIONS
                .iter()
                .map(|section| {
                    let content = match map.get(*section) {
                        Some(Value::String(s)) => collapse_repeats(s).trim().to_string(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    };
                    (section.to_string(), content_or_marker(content))
                })
                .collect();
            build_record(key, sections, raw.to_string(), None)
        }
        other => {
            error!("Unexpected summary type for {}: {}", key, value_kind(other));
            placeholder(
                key,
                FORMAT_ERROR,
                other.to_string(),
                format!("unsupported summary type: {}", value_kind(other)),
            )
        }
    }
}

/// Parse free text by scanning for section header tokens.
///
/// A line containing `<Section>:` starts that section; the rest of the line
/// and following lines accumulate into it until the next header. A header
/// seen again (e.g. in a later chunk's summary) appends to its section.
pub fn parse_text(key: &str, text: &str) -> SummaryRecord {
    debug!("Parsing summary for {} ({} chars)", key, text.len());

    let cleaned = collapse_repeats(text);
    let mut parsed: BTreeMap<&str, String> = SECTIONS.iter().map(|s| (*s, String::new())).collect();
    let mut current: Option<&str> = None;

    for line in cleaned.lines() {
        let line = line.trim();
        let piece = match find_header(line) {
            Some((section, rest)) => {
                current = Some(section);
                rest
            }
            None => line,
        };
        if let Some(section) = current {
            if let Some(buffer) = parsed.get_mut(section) {
                append_piece(buffer, piece);
            }
        }
    }

    let sections = parsed
        .into_iter()
        .map(|(section, content)| (section.to_string(), content_or_marker(content)))
        .collect();
    build_record(key, sections, text.to_string(), None)
}

/// A record whose every section holds `marker`
pub fn placeholder(key: &str, marker: &str, raw_output: String, error: String) -> SummaryRecord {
    let sections = SECTIONS
        .iter()
        .map(|s| (s.to_string(), marker.to_string()))
        .collect();
    build_record(key, sections, raw_output, Some(error))
}

/// Structured marker returned for texts too short to summarize
pub fn too_short_marker() -> Value {
    Value::Object(
        SECTIONS
            .iter()
            .map(|s| (s.to_string(), Value::String(TEXT_TOO_SHORT.to_string())))
            .collect(),
    )
}

/// Drop lines that repeat one of the last few kept lines
pub fn collapse_repeats(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        let window_start = kept.len().saturating_sub(REPEAT_WINDOW);
        if !kept[window_start..].contains(&line) {
            kept.push(line);
        }
    }
    kept.join("\n")
}

fn find_header(line: &str) -> Option<(&'static str, &str)> {
    SECTIONS
        .iter()
        .filter_map(|section| {
            let token = format!("{}:", section);
            line.find(&token).map(|idx| (idx, *section, idx + token.len()))
        })
        .min_by_key(|(idx, _, _)| *idx)
        .map(|(_, section, rest_start)| {
            let rest = line[rest_start..].trim_matches(|c: char| c == '*' || c.is_whitespace());
            (section, rest)
        })
}

fn append_piece(buffer: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(piece);
}

fn content_or_marker(content: String) -> String {
    if content.trim().is_empty() {
        NOT_FOUND.to_string()
    } else {
        content
    }
}

fn build_record(
    key: &str,
    sections: BTreeMap<String, String>,
    raw_output: String,
    error: Option<String>,
) -> SummaryRecord {
    let full_text = SECTIONS
        .iter()
        .map(|s| format!("{}: {}", s, sections.get(*s).map(String::as_str).unwrap_or(NOT_FOUND)))
        .collect::<Vec<_>>()
        .join("\n");

    SummaryRecord {
        key: key.to_string(),
        sections,
        full_text,
        raw_output,
        error,
        output_error: None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_sections_with_inline_content() {
        let text = "Case Subject: Annulment of a cooperative general assembly resolution\n\
                    Legal Basis: Cooperatives Law No. 1163\n\
                    Court Decision: Partially accepted\n\
                    Reasoning: The claim was filed within the one-month limit.\n\
                    The interest resolution violated the law.";
        let record = parse_text("a.txt", text);

        assert_eq!(
            record.sections["Case Subject"],
            "Annulment of a cooperative general assembly resolution"
        );
        assert_eq!(record.sections["Legal Basis"], "Cooperatives Law No. 1163");
        assert_eq!(
            record.sections["Reasoning"],
            "The claim was filed within the one-month limit. The interest resolution violated the law."
        );
        assert_eq!(record.raw_output, text);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_missing_sections_get_not_found_marker() {
        let record = parse_text("a.txt", "Court Decision: Dismissed");
        assert_eq!(record.sections.len(), SECTIONS.len());
        assert_eq!(record.sections["Court Decision"], "Dismissed");
        assert_eq!(record.sections["Case Subject"], NOT_FOUND);
        assert_eq!(record.sections["Reasoning"], NOT_FOUND);
    }

    #[test]
    fn test_text_without_headers_keeps_raw_output() {
        let record = parse_text("a.txt", "The model ignored the format entirely.");
        assert!(record.sections.values().all(|v| v == NOT_FOUND));
        assert_eq!(record.raw_output, "The model ignored the format entirely.");
    }

    #[test]
    fn test_repeated_header_appends_in_order() {
        let text = "Case Subject: first part\nReasoning: r1\n\nCase Subject: second part\nReasoning: r2";
        let record = parse_text("a.txt", text);
        assert_eq!(record.sections["Case Subject"], "first part second part");
        assert_eq!(record.sections["Reasoning"], "r1 r2");
    }

    #[test]
    fn test_markdown_bold_headers() {
        let record = parse_text("a.txt", "**Legal Basis:** Article 341");
        assert_eq!(record.sections["Legal Basis"], "Article 341");
    }

    #[test]
    fn test_full_text_lists_sections_in_schema_order() {
        let record = parse_text("a.txt", "Reasoning: because\nCase Subject: dispute");
        assert_eq!(
            record.full_text,
            "Case Subject: dispute\nLegal Basis: Not found.\nCourt Decision: Not found.\nReasoning: because"
        );
    }

    #[test]
    fn test_mapping_input() {
        let raw = json!({"Case Subject": "rent", "Legal Basis": "", "Reasoning": 42});
        let record = parse_summary("a.txt", &raw);
        assert_eq!(record.sections["Case Subject"], "rent");
        assert_eq!(record.sections["Legal Basis"], NOT_FOUND);
        assert_eq!(record.sections["Court Decision"], NOT_FOUND);
        assert_eq!(record.sections["Reasoning"], "42");
    }

    #[test]
    fn test_too_short_marker_parses_to_marker_sections() {
        let record = parse_summary("short.txt", &too_short_marker());
        assert!(record.sections.values().all(|v| v == TEXT_TOO_SHORT));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_unsupported_type_degrades_to_error_record() {
        let record = parse_summary("a.txt", &json!([1, 2, 3]));
        assert!(record.sections.values().all(|v| v == FORMAT_ERROR));
        assert_eq!(record.raw_output, "[1,2,3]");
        assert!(record.error.as_deref().unwrap().contains("array"));
    }

    #[test]
    fn test_collapse_repeats() {
        assert_eq!(collapse_repeats("a\nb\na\nc"), "a\nb\nc");
        assert_eq!(collapse_repeats("a\nb\nc\nd\na"), "a\nb\nc\nd\na");
    }
}
