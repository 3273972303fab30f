//! Normalization of raw model responses into usable file metadata.
//!
//! The model is asked for a fenced JSON block, but responses drift: the
//! fence goes missing, keys get dropped, dates come back in arbitrary
//! formats. Extraction never fails - every degradation path lands on a
//! defined fallback so the pipeline always has a well-formed record.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Sentinel the model is allowed to use when it cannot determine a date.
const UNKNOWN_DATE: &str = "不明";

/// Title substituted when the response contains no parseable JSON at all.
const FALLBACK_TITLE: &str = "Unreadable Document";

/// Summary substituted when the response contains no parseable JSON at all.
const FALLBACK_SUMMARY: &str =
    "This document appears to be unreadable or contains complex formatting that could not be analyzed.";

/// Characters that must never reach a filename.
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

static BARE_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{.*"date".*"title".*"summary".*\}"#).unwrap());

/// Normalized metadata for one analyzed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Creation date as exactly eight digits (YYYYMMDD).
    pub date: String,
    /// Filename-safe title, at most 100 characters.
    pub title: String,
    /// Free-text summary used as the annotation payload.
    pub summary: String,
}

impl AnalysisResult {
    /// The filename this record maps to: `"{date} {title}.pdf"`.
    pub fn file_name(&self) -> String {
        format!("{} {}.pdf", self.date, self.title)
    }
}

/// Outcome of extraction, tagged by how the record was obtained.
///
/// `Parsed` carries metadata recovered from the model's JSON;
/// `Fallback` carries the fixed unreadable-document record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Parsed(AnalysisResult),
    Fallback(AnalysisResult),
}

impl Extraction {
    pub fn into_result(self) -> AnalysisResult {
        match self {
            Extraction::Parsed(r) | Extraction::Fallback(r) => r,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Extraction::Fallback(_))
    }
}

/// Turn a raw model response into a normalized record.
///
/// `fallback_date` (YYYYMMDD, normally today) replaces any date the
/// response failed to supply in a usable form.
pub fn extract(raw_response: &str, fallback_date: &str) -> Extraction {
    let candidate = locate_json(raw_response);

    let object = match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("Could not parse JSON from model response, using fallback record");
            return Extraction::Fallback(AnalysisResult {
                date: fallback_date.to_string(),
                title: FALLBACK_TITLE.to_string(),
                summary: FALLBACK_SUMMARY.to_string(),
            });
        }
    };

    let date = field_or(&object, "date", UNKNOWN_DATE);
    let title = field_or(&object, "title", "Unknown");
    let summary = field_or(&object, "summary", "Unknown");

    Extraction::Parsed(AnalysisResult {
        date: normalize_date(&date, fallback_date),
        title: normalize_title(&title),
        summary,
    })
}

/// Find the JSON candidate inside the raw response.
///
/// Preference order: explicit fenced ```json block, then the first
/// object-looking span carrying all three expected keys, then the whole
/// response as a last resort.
fn locate_json(raw: &str) -> &str {
    if let Some(caps) = FENCED_JSON.captures(raw) {
        return caps.get(1).unwrap().as_str();
    }
    if let Some(m) = BARE_JSON.find(raw) {
        return m.as_str();
    }
    warn!("No JSON block found in model response, trying full response");
    raw
}

/// Read a key from the parsed object, substituting `missing` when the
/// key is absent or null. Non-string scalars keep their JSON rendering
/// (a bare number date still normalizes below).
fn field_or(object: &serde_json::Map<String, Value>, key: &str, missing: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => missing.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Force the date into exactly eight digits, or fall back.
fn normalize_date(date: &str, fallback_date: &str) -> String {
    if date == UNKNOWN_DATE {
        return fallback_date.to_string();
    }
    let digits: String = date.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 8 {
        digits
    } else {
        fallback_date.to_string()
    }
}

/// Cap the title length and strip filesystem-reserved characters.
///
/// Stripping is literal character removal; whitespace is not collapsed,
/// and a title made of nothing but reserved characters comes out empty.
fn normalize_title(title: &str) -> String {
    let mut title = if title.chars().count() > 100 {
        let truncated: String = title.chars().take(97).collect();
        format!("{}...", truncated)
    } else {
        title.to_string()
    };
    for c in RESERVED_CHARS {
        title = title.replace(c, "");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "20250115";

    #[test]
    fn test_fenced_json_block() {
        let raw = "Some analysis preamble.\n```json\n{\"date\":\"2024-03-01\",\"title\":\"請求書\",\"summary\":\"内容の要約\"}\n```\nDone.";
        let extraction = extract(raw, FALLBACK);
        assert!(!extraction.is_fallback());
        let result = extraction.into_result();
        assert_eq!(result.date, "20240301");
        assert_eq!(result.title, "請求書");
        assert_eq!(result.summary, "内容の要約");
    }

    #[test]
    fn test_bare_json_without_fence() {
        let raw = r#"Here is the result: {"date": "20240501", "title": "Meeting Notes", "summary": "Notes."} hope it helps"#;
        let result = extract(raw, FALLBACK).into_result();
        assert_eq!(result.date, "20240501");
        assert_eq!(result.title, "Meeting Notes");
    }

    #[test]
    fn test_whole_response_is_json() {
        let raw = r#"{"date": "20240501", "title": "T", "summary": "S"}"#;
        // No fence and keys in order, so the permissive pattern matches;
        // either way the whole body parses.
        let result = extract(raw, FALLBACK).into_result();
        assert_eq!(result.date, "20240501");
    }

    #[test]
    fn test_no_json_at_all_yields_fallback_record() {
        let extraction = extract("The document was blank, nothing to report.", FALLBACK);
        assert!(extraction.is_fallback());
        let result = extraction.into_result();
        assert_eq!(result.date, FALLBACK);
        assert_eq!(result.title, "Unreadable Document");
        assert_eq!(
            result.summary,
            "This document appears to be unreadable or contains complex formatting that could not be analyzed."
        );
    }

    #[test]
    fn test_missing_keys_get_placeholders() {
        let raw = r#"```json
{"date": "不明", "title": "レポート", "summary": "要約"}
```"#;
        let result = extract(raw, FALLBACK).into_result();
        // Unknown-date sentinel resolves to the fallback date
        assert_eq!(result.date, FALLBACK);

        let raw = r#"```json
{"date": "20240101"}
```"#;
        // Fence present but without all keys - fenced match still wins
        let result = extract(raw, FALLBACK).into_result();
        assert_eq!(result.date, "20240101");
        assert_eq!(result.title, "Unknown");
        assert_eq!(result.summary, "Unknown");
    }

    #[test]
    fn test_date_digit_projection() {
        let cases = [
            ("2024-03-01", "20240301"),
            ("2024/03/01", "20240301"),
            ("2024年03月01日", "20240301"),
            ("20240301", "20240301"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_date(input, FALLBACK), expected, "input: {input}");
        }
    }

    #[test]
    fn test_malformed_date_falls_back() {
        for input in ["2024-03", "March 1st 2024 at noon 123", "", "202403011"] {
            assert_eq!(normalize_date(input, FALLBACK), FALLBACK, "input: {input}");
        }
    }

    #[test]
    fn test_title_reserved_characters_stripped() {
        assert_eq!(normalize_title("Q1/Q2:Report*"), "Q1Q2Report");
        assert_eq!(normalize_title(r#"a\b:c*d?e"f<g>h|i"#), "abcdefghi");
    }

    #[test]
    fn test_title_truncation() {
        let long: String = "あ".repeat(150);
        let normalized = normalize_title(&long);
        assert_eq!(normalized.chars().count(), 100);
        assert!(normalized.ends_with("..."));

        let exact: String = "x".repeat(100);
        assert_eq!(normalize_title(&exact), exact);
    }

    #[test]
    fn test_all_reserved_title_becomes_empty() {
        // Known quirk, kept on purpose: nothing is substituted when the
        // title consisted solely of reserved characters.
        assert_eq!(normalize_title("///***"), "");
    }

    #[test]
    fn test_numeric_date_value() {
        let raw = r#"```json
{"date": 20240301, "title": "T", "summary": "S"}
```"#;
        let result = extract(raw, FALLBACK).into_result();
        assert_eq!(result.date, "20240301");
    }

    #[test]
    fn test_file_name() {
        let result = AnalysisResult {
            date: "20240301".into(),
            title: "請求書".into(),
            summary: String::new(),
        };
        assert_eq!(result.file_name(), "20240301 請求書.pdf");
    }
}
