//! Typed JSON extraction from model replies.
//!
//! [`parse_json`] locates the most plausible JSON candidate in a reply (think
//! blocks, fences and surrounding prose are all common) and deserializes it.
//! [`ParseMode`] decides whether syntactic repair is allowed.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{
    extract_code_block, extract_code_block_for, find_bracketed, preprocess,
};
use crate::output_parser::repair::try_repair_json;

/// How forgiving the parser is with malformed JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Apply deterministic repair when the candidate does not parse.
    #[default]
    Lenient,
    /// Accept only JSON that parses as written.
    Strict,
}

/// Parse a model reply into `T`.
///
/// Candidate strategies (first hit wins):
/// 1. The whole cleaned reply
/// 2. A ```json fenced block
/// 3. Any fenced block that starts with `{` or `[`
/// 4. The last balanced `{...}` region
/// 5. The last balanced `[...]` region
///
/// In [`ParseMode::Lenient`] a candidate that fails to parse is repaired and
/// retried. In [`ParseMode::Strict`] it is rejected.
///
/// # Examples
///
/// ```
/// use serde::Deserialize;
/// use blog_pipeline::output_parser::{parse_json, ParseMode};
///
/// #[derive(Deserialize)]
/// struct Params { topic: String }
///
/// let reply = "<think>hmm</think>Sure: {\"topic\": \"bees\",}";
/// let params: Params = parse_json(reply, ParseMode::Lenient).unwrap();
/// assert_eq!(params.topic, "bees");
/// assert!(parse_json::<Params>(reply, ParseMode::Strict).is_err());
/// ```
pub fn parse_json<T: DeserializeOwned>(response: &str, mode: ParseMode) -> Result<T, ParseError> {
    let value = parse_json_value(response, mode)?;
    let raw = value.to_string();
    serde_json::from_value(value).map_err(|e| ParseError::DeserializationFailed {
        reason: e.to_string(),
        raw_json: truncate(&raw, 200),
    })
}

/// Parse a model reply into an untyped JSON value.
pub fn parse_json_value(response: &str, mode: ParseMode) -> Result<Value, ParseError> {
    let cleaned = preprocess(response);
    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let candidate = json_candidate(&cleaned);
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(value);
    }

    if mode == ParseMode::Lenient {
        let repaired = try_repair_json(candidate)
            .or_else(|| (candidate != cleaned).then(|| try_repair_json(&cleaned)).flatten());
        if let Some(value) = repaired.and_then(|s| serde_json::from_str::<Value>(&s).ok()) {
            return Ok(value);
        }
    }

    Err(ParseError::Unparseable {
        expected_format: "JSON",
        text: truncate(&cleaned, 200),
    })
}

fn json_candidate(cleaned: &str) -> &str {
    if serde_json::from_str::<Value>(cleaned).is_ok() {
        return cleaned;
    }
    if let Some(body) = extract_code_block_for(cleaned, "json") {
        return body;
    }
    if let Some(block) = extract_code_block(cleaned) {
        if block.body.starts_with('{') || block.body.starts_with('[') {
            return block.body;
        }
    }
    find_bracketed(cleaned, '{', '}')
        .or_else(|| find_bracketed(cleaned, '[', ']'))
        .unwrap_or(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Params {
        topic: String,
        length: Option<i64>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Closed {
        title: String,
    }

    #[test]
    fn direct_object() {
        let p: Params = parse_json(r#"{"topic": "tea", "length": 3}"#, ParseMode::Strict).unwrap();
        assert_eq!(p, Params { topic: "tea".into(), length: Some(3) });
    }

    #[test]
    fn think_then_fenced_json() {
        let reply = "<think>reasoning</think>\n```json\n{\"topic\": \"tea\"}\n```";
        let p: Params = parse_json(reply, ParseMode::Strict).unwrap();
        assert_eq!(p.topic, "tea");
    }

    #[test]
    fn bare_fence_and_prose() {
        let fenced: Params = parse_json("```\n{\"topic\": \"a\"}\n```", ParseMode::Strict).unwrap();
        assert_eq!(fenced.topic, "a");
        let prose: Params =
            parse_json("Here you go: {\"topic\": \"b\"} hope it helps", ParseMode::Strict).unwrap();
        assert_eq!(prose.topic, "b");
    }

    #[test]
    fn lenient_repairs_strict_rejects() {
        let reply = r#"{"topic": "tea", "length": 4,}"#;
        assert!(parse_json::<Params>(reply, ParseMode::Lenient).is_ok());
        let err = parse_json::<Params>(reply, ParseMode::Strict).unwrap_err();
        assert!(matches!(err, ParseError::Unparseable { .. }));
    }

    #[test]
    fn lenient_repairs_truncated_reply() {
        let p: Params = parse_json(r#"{"topic": "electric bikes", "length": 5"#, ParseMode::Lenient).unwrap();
        assert_eq!(p.length, Some(5));
    }

    #[test]
    fn wrong_shape_is_deserialization_failure() {
        let err = parse_json::<Closed>(r#"{"title": "t", "extra": 1}"#, ParseMode::Strict).unwrap_err();
        assert!(matches!(err, ParseError::DeserializationFailed { .. }));
    }

    #[test]
    fn empty_reply() {
        assert!(matches!(
            parse_json_value("  <think>only thoughts</think> ", ParseMode::Lenient),
            Err(ParseError::EmptyResponse)
        ));
    }
}
