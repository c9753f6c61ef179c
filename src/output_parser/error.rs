//! Error types for model output parsers.

/// Errors returned by output parsers.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The model reply was empty or whitespace-only after cleanup.
    #[error("empty model response")]
    EmptyResponse,

    /// No candidate in the reply could be read as the expected format.
    #[error("could not parse {expected_format} from model response: {text}")]
    Unparseable {
        expected_format: &'static str,
        /// Truncated copy of the cleaned reply.
        text: String,
    },

    /// JSON was found but does not match the target type.
    #[error("JSON deserialization failed: {reason}")]
    DeserializationFailed {
        reason: String,
        /// Truncated copy of the candidate JSON.
        raw_json: String,
    },
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
