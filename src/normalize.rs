//! Response normalization: defensive extraction of a key/value mapping
//! from raw, possibly non-JSON, model output.
//!
//! The normalizer turns a raw model answer (text or loosely-typed mapping)
//! into either a validated mapping or a fully-defaulted fallback mapping.
//! Cleanup attempts run in order, first match wins: a `json`-labelled fence,
//! any recognized language fence, a generic triple fence, then a brace scan.
//! A response that looks like JSON but fails to parse is never partially
//! trusted; the complete default mapping is used instead.

use serde_json::{Map, Value};

use crate::schema::{Schema, PROCESSOR_TYPE_FIELD};

/// Fence markers with a language label the normalizer recognizes.
/// The `json` labels are tried before the rest.
const LABELED_FENCES: [&str; 4] = ["```json", "```JSON", "```javascript", "```js"];

/// A raw model answer: free text presumed to contain JSON, or an
/// already-parsed key/value mapping.
#[derive(Debug, Clone)]
pub enum RawResponse {
    /// Raw response text.
    Text(String),
    /// An already loosely-parsed mapping.
    Mapping(Map<String, Value>),
}

impl RawResponse {
    /// Classify an arbitrary `Value`: objects enter as mappings, strings as
    /// text, anything else as its JSON rendering.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => RawResponse::Mapping(map),
            Value::String(text) => RawResponse::Text(text),
            other => RawResponse::Text(other.to_string()),
        }
    }
}

impl From<&str> for RawResponse {
    fn from(text: &str) -> Self {
        RawResponse::Text(text.to_string())
    }
}

impl From<String> for RawResponse {
    fn from(text: String) -> Self {
        RawResponse::Text(text)
    }
}

/// The normalizer's result: a working mapping, whether it was structurally
/// parseable, and any extracted debug payload.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// The validated mapping, or the fallback mapping when `is_valid` is false.
    pub mapping: Map<String, Value>,
    /// False when the response could not be resolved into a JSON mapping.
    pub is_valid: bool,
    /// A `debug` entry extracted from the mapping, carried separately.
    pub debug: Option<Value>,
}

/// Normalize a raw model answer against a schema.
///
/// On any parse failure the result is the complete fallback mapping:
/// every declared default, the original text under `"response"`, and the
/// task name, with `is_valid` false.
pub fn normalize(raw: RawResponse, schema: &Schema, task_name: &str) -> Normalized {
    match raw {
        RawResponse::Text(text) => normalize_text(&text, schema, task_name),
        RawResponse::Mapping(map) => normalize_mapping(map, schema, task_name),
    }
}

fn normalize_text(text: &str, schema: &Schema, task_name: &str) -> Normalized {
    match extract_json_object(text) {
        Some(map) => finish(map, task_name),
        None => fallback(text, schema, task_name),
    }
}

fn normalize_mapping(map: Map<String, Value>, schema: &Schema, task_name: &str) -> Normalized {
    // A mapping whose only payload-bearing key is "response" (plus possibly
    // "debug") is the provider's plain-text envelope, not a structured
    // answer. Try to recover embedded JSON from the response string.
    // Known to misclassify a legitimately minimal record; behavior kept.
    let is_envelope = map.len() <= 2
        && map.contains_key("response")
        && map.keys().all(|k| k == "response" || k == "debug");

    if is_envelope {
        let debug = map.get("debug").cloned();
        let response_text = match map.get("response") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let mut normalized = if response_text.contains('{') {
            normalize_text(&response_text, schema, task_name)
        } else {
            fallback(&response_text, schema, task_name)
        };
        if normalized.debug.is_none() {
            normalized.debug = debug;
        }
        return normalized;
    }

    finish(map, task_name)
}

/// Stamp the task name and pull out the debug entry.
fn finish(mut map: Map<String, Value>, task_name: &str) -> Normalized {
    let debug = map.remove("debug");
    map.insert(
        PROCESSOR_TYPE_FIELD.to_string(),
        Value::String(task_name.to_string()),
    );
    Normalized {
        mapping: map,
        is_valid: true,
        debug,
    }
}

fn fallback(text: &str, schema: &Schema, task_name: &str) -> Normalized {
    Normalized {
        mapping: schema.fallback_mapping(text, task_name),
        is_valid: false,
        debug: None,
    }
}

/// Extract the contents of a fenced code block, trying labelled fences
/// first, then a generic triple fence.
pub fn extract_fenced_block(text: &str) -> Option<String> {
    for marker in LABELED_FENCES {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim().to_string());
            }
        }
    }

    // Generic fences: split on ``` and take the first fenced segment.
    let mut parts = text.split("```");
    parts.next()?;
    let fenced = parts.next()?;
    Some(fenced.trim().to_string())
}

/// Locate and parse a JSON object in text that may contain fences or
/// surrounding prose. Returns `None` when no parseable object is found;
/// non-object JSON (arrays, scalars) is rejected.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();

    if let Some(block) = extract_fenced_block(trimmed) {
        if let Some(map) = parse_object(&block) {
            return Some(map);
        }
    }

    if let Some(map) = parse_object(trimmed) {
        return Some(map);
    }

    // Scan for the first { and the last } and try that substring.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&trimmed[start..=end])
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn sentiment_schema() -> Schema {
        Schema::new()
            .field(FieldSpec::string("sentiment").with_default(json!("unknown")))
            .field(FieldSpec::float("score"))
            .field(FieldSpec::string_array("keywords"))
            .field(FieldSpec::processor_type())
    }

    #[test]
    fn test_extract_fenced_json_label() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_fenced_block(text), Some("{\"a\": 1}".to_string()));
    }

    #[test]
    fn test_extract_fenced_other_label() {
        let text = "```javascript\n{\"a\": 1}\n```";
        assert_eq!(extract_fenced_block(text), Some("{\"a\": 1}".to_string()));
    }

    #[test]
    fn test_extract_generic_fence() {
        let text = "result:\n```\n{\"a\": 1}\n```";
        assert_eq!(extract_fenced_block(text), Some("{\"a\": 1}".to_string()));
    }

    #[test]
    fn test_extract_fenced_none() {
        assert_eq!(extract_fenced_block("no fences here"), None);
    }

    #[test]
    fn test_fence_strip_is_idempotent_with_direct_parse() {
        let inner = r#"{"sentiment": "positive", "score": 0.8}"#;
        let wrapped = format!("```json\n{}\n```", inner);
        let direct = extract_json_object(inner).unwrap();
        let stripped = extract_json_object(&wrapped).unwrap();
        assert_eq!(direct, stripped);
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "Sure! {\"name\": \"test\"} hope that helps.";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["name"], json!("test"));
    }

    #[test]
    fn test_extract_rejects_non_object() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("42").is_none());
    }

    #[test]
    fn test_normalize_text_valid_json() {
        let raw = RawResponse::from("{\"sentiment\": \"positive\", \"score\": 0.8}");
        let n = normalize(raw, &sentiment_schema(), "sentiment");
        assert!(n.is_valid);
        assert_eq!(n.mapping["sentiment"], json!("positive"));
        assert_eq!(n.mapping[PROCESSOR_TYPE_FIELD], json!("sentiment"));
    }

    #[test]
    fn test_normalize_text_fallback_is_complete() {
        let raw = RawResponse::from("I think it's good overall.");
        let n = normalize(raw, &sentiment_schema(), "sentiment");
        assert!(!n.is_valid);
        assert_eq!(n.mapping["response"], json!("I think it's good overall."));
        assert_eq!(n.mapping["sentiment"], json!("unknown"));
        assert_eq!(n.mapping["score"], json!(0.0));
        assert_eq!(n.mapping["keywords"], json!([]));
        assert_eq!(n.mapping[PROCESSOR_TYPE_FIELD], json!("sentiment"));
    }

    #[test]
    fn test_normalize_text_broken_json_falls_back_completely() {
        // Looks like JSON but does not parse: never partially trusted.
        let raw = RawResponse::from("{\"sentiment\": \"positive\", \"score\":");
        let n = normalize(raw, &sentiment_schema(), "sentiment");
        assert!(!n.is_valid);
        assert_eq!(n.mapping["sentiment"], json!("unknown"));
    }

    #[test]
    fn test_normalize_mapping_extracts_debug() {
        let mut map = Map::new();
        map.insert("sentiment".to_string(), json!("positive"));
        map.insert("score".to_string(), json!(0.9));
        map.insert("debug".to_string(), json!({"prompt": "p"}));
        let n = normalize(RawResponse::Mapping(map), &sentiment_schema(), "sentiment");
        assert!(n.is_valid);
        assert!(!n.mapping.contains_key("debug"));
        assert_eq!(n.debug, Some(json!({"prompt": "p"})));
    }

    #[test]
    fn test_normalize_envelope_recovers_inner_json() {
        let mut map = Map::new();
        map.insert(
            "response".to_string(),
            json!("```json\n{\"sentiment\": \"negative\", \"score\": 0.2}\n```"),
        );
        let n = normalize(RawResponse::Mapping(map), &sentiment_schema(), "sentiment");
        assert!(n.is_valid);
        assert_eq!(n.mapping["sentiment"], json!("negative"));
        assert_eq!(n.mapping[PROCESSOR_TYPE_FIELD], json!("sentiment"));
    }

    #[test]
    fn test_normalize_envelope_plain_text_falls_back() {
        let mut map = Map::new();
        map.insert("response".to_string(), json!("just some prose"));
        map.insert("debug".to_string(), json!({"model": "m"}));
        let n = normalize(RawResponse::Mapping(map), &sentiment_schema(), "sentiment");
        assert!(!n.is_valid);
        assert_eq!(n.mapping["response"], json!("just some prose"));
        assert_eq!(n.mapping["sentiment"], json!("unknown"));
        assert_eq!(n.debug, Some(json!({"model": "m"})));
    }

    #[test]
    fn test_normalize_larger_mapping_is_not_an_envelope() {
        // Three keys: the envelope heuristic must not trigger.
        let mut map = Map::new();
        map.insert("response".to_string(), json!("text"));
        map.insert("sentiment".to_string(), json!("positive"));
        map.insert("score".to_string(), json!(1.0));
        let n = normalize(RawResponse::Mapping(map), &sentiment_schema(), "sentiment");
        assert!(n.is_valid);
        assert_eq!(n.mapping["sentiment"], json!("positive"));
    }

    #[test]
    fn test_raw_response_from_value() {
        assert!(matches!(
            RawResponse::from_value(json!({"a": 1})),
            RawResponse::Mapping(_)
        ));
        assert!(matches!(
            RawResponse::from_value(json!("text")),
            RawResponse::Text(_)
        ));
        assert!(matches!(
            RawResponse::from_value(json!([1, 2])),
            RawResponse::Text(_)
        ));
    }
}
