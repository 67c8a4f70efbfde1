//! Splits the generation service's reply into its two artifacts.
//!
//! The reply is expected to look like
//!
//! ```text
//! <preamble> DELIM <primary> DELIM <secondary>
//! ```
//!
//! Everything before the first delimiter is discarded. Segment 1 is the
//! primary artifact (a chart configuration), segment 2 the secondary (the
//! written analysis); both are trimmed.

use serde::de::IgnoredAny;
use tracing::debug;

use crate::config::GenerationConfig;

/// Delimiter the prompt asks the model to emit between sections.
pub const DEFAULT_DELIMITER: &str = "【】【】【】【】";

/// The reply did not follow the delimited layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed response: expected at least 3 segments split by {delimiter:?}, found {found}")]
pub struct MalformedResponse {
    pub delimiter: String,
    pub found: usize,
}

/// The two artifacts extracted from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub primary: String,
    pub secondary: String,
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    delimiter: String,
    normalize_primary: bool,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl Segmenter {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            normalize_primary: false,
        }
    }

    /// Segmenter configured the way the executor uses it.
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.delimiter.clone()).with_json_normalization(config.normalize_primary)
    }

    /// Drop insignificant whitespace from the primary artifact when it is
    /// JSON. Off unless enabled.
    pub fn with_json_normalization(mut self, enabled: bool) -> Self {
        self.normalize_primary = enabled;
        self
    }

    pub fn segment(&self, raw: &str) -> Result<Segments, MalformedResponse> {
        if self.delimiter.is_empty() {
            return Err(MalformedResponse {
                delimiter: String::new(),
                found: 1,
            });
        }
        let parts: Vec<&str> = raw.split(self.delimiter.as_str()).collect();
        if parts.len() < 3 {
            return Err(MalformedResponse {
                delimiter: self.delimiter.clone(),
                found: parts.len(),
            });
        }
        let primary = parts[1].trim();
        let primary = if self.normalize_primary {
            normalize_json(primary)
        } else {
            primary.to_string()
        };
        Ok(Segments {
            primary,
            secondary: parts[2].trim().to_string(),
        })
    }
}

/// Compact form of `text` when it is JSON: whitespace between tokens is
/// dropped and one level of string encoding (`"{\"a\":1}"`) is unwrapped.
/// Keys, numbers and string contents are copied byte for byte. Text that is
/// not JSON is returned unchanged.
pub fn normalize_json(text: &str) -> String {
    let body = strip_code_fence(text);
    if let Err(err) = serde_json::from_str::<IgnoredAny>(body) {
        debug!(error = %err, "primary artifact is not JSON, keeping it verbatim");
        return text.to_string();
    }
    if let Ok(inner) = serde_json::from_str::<String>(body) {
        let inner = inner.trim();
        if inner.starts_with(['{', '['])
            && serde_json::from_str::<IgnoredAny>(inner).is_ok()
        {
            return compact(inner);
        }
        return text.to_string();
    }
    compact(body)
}

// Drops whitespace outside string literals; input must be valid JSON.
fn compact(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in json.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if !c.is_whitespace() {
            out.push(c);
        }
    }
    out
}

// Models often wrap JSON in ```json fences despite instructions.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    match body.find('\n') {
        Some(newline) if !body[..newline].trim_start().starts_with(['{', '[']) => {
            body[newline + 1..].trim()
        }
        _ => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_preamble_primary_secondary() {
        let raw = "pre【】【】【】【】  A  【】【】【】【】  B";
        let segments = Segmenter::default().segment(raw).unwrap();
        assert_eq!(segments.primary, "A");
        assert_eq!(segments.secondary, "B");
    }

    #[test]
    fn single_delimiter_is_malformed() {
        let err = Segmenter::default()
            .segment("pre【】【】【】【】 only one")
            .unwrap_err();
        assert_eq!(err.found, 2);
        assert_eq!(err.delimiter, DEFAULT_DELIMITER);
    }

    #[test]
    fn no_delimiter_is_malformed() {
        let err = Segmenter::default().segment("I cannot help with that").unwrap_err();
        assert_eq!(err.found, 1);
    }

    #[test]
    fn extra_segments_are_ignored() {
        let segments = Segmenter::new("||").segment("x||one||two||three").unwrap();
        assert_eq!(segments.primary, "one");
        assert_eq!(segments.secondary, "two");
    }

    #[test]
    fn empty_delimiter_never_matches() {
        assert!(Segmenter::new("").segment("a b c").is_err());
    }

    #[test]
    fn normalization_compacts_json_primary() {
        let raw = "\n【】【】【】【】\n{\n  \"title\": { \"text\": \"Sales\" }\n}\n【】【】【】【】\nSales rose.";
        let segments = Segmenter::default()
            .with_json_normalization(true)
            .segment(raw)
            .unwrap();
        assert_eq!(segments.primary, r#"{"title":{"text":"Sales"}}"#);
        assert_eq!(segments.secondary, "Sales rose.");
    }

    #[test]
    fn normalize_unwraps_double_encoded_json() {
        assert_eq!(normalize_json(r#""{\"a\":1}""#), r#"{"a":1}"#);
    }

    #[test]
    fn normalize_keeps_non_json_verbatim() {
        assert_eq!(normalize_json("{ xAxis: [1, 2] }"), "{ xAxis: [1, 2] }");
        assert_eq!(normalize_json(r#""plain words""#), r#""plain words""#);
        let fenced = "```js\noption = { xAxis: [] }\n```";
        assert_eq!(normalize_json(fenced), fenced);
    }

    #[test]
    fn normalize_strips_code_fences() {
        assert_eq!(normalize_json("```json\n{\"a\": [1, 2]}\n```"), r#"{"a":[1,2]}"#);
        assert_eq!(normalize_json("```{\"a\": 1}```"), r#"{"a":1}"#);
    }

    #[test]
    fn normalize_preserves_key_order_and_number_text() {
        let text = r#"{"series": [1, 2], "id": 12345678901234567890123, "b": 0.1000, "s": "a  b \" c"}"#;
        assert_eq!(
            normalize_json(text),
            r#"{"series":[1,2],"id":12345678901234567890123,"b":0.1000,"s":"a  b \" c"}"#
        );
    }

    #[test]
    fn default_config_keeps_primary_as_trimmed_segment() {
        let raw = r#"pre【】【】【】【】 {"series": [1, 2], "id": 12345678901234567890123, "b": 0.1000} 【】【】【】【】 B"#;
        let segments = Segmenter::from_config(&GenerationConfig::default())
            .segment(raw)
            .unwrap();
        assert_eq!(
            segments.primary,
            r#"{"series": [1, 2], "id": 12345678901234567890123, "b": 0.1000}"#
        );
        assert_eq!(segments.secondary, "B");
    }
}
