//! # Model Output Parser
//!
//! Extracts structured data and clean markdown from model replies. Handles
//! think blocks, markdown fences, surrounding prose and malformed JSON without
//! another model call.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`parse_json`] | Typed JSON, lenient or strict |
//! | [`parse_json_value`] | Untyped JSON |
//! | [`clean_markdown`] | Article body from a drafting reply |
//! | [`strip_think_tags`] | Remove `<think>` blocks |
//! | [`try_repair_json`] | Fix common JSON mistakes |

pub mod error;
pub mod extract;
pub mod json;
pub mod repair;

pub use error::ParseError;
pub use extract::{preprocess, strip_think_tags};
pub use json::{parse_json, parse_json_value, ParseMode};
pub use repair::try_repair_json;

/// Markdown body of a drafting reply: think blocks removed and an enclosing
/// ```markdown / ```md fence unwrapped.
///
/// ```
/// use blog_pipeline::output_parser::clean_markdown;
///
/// let reply = "<think>outline first</think>\n```markdown\n# Tea\n\nSteep it.\n```";
/// assert_eq!(clean_markdown(reply).unwrap(), "# Tea\n\nSteep it.");
/// ```
pub fn clean_markdown(response: &str) -> Result<String, ParseError> {
    let cleaned = preprocess(response);
    let body = extract::strip_enclosing_fence(&cleaned, &["markdown", "md"])
        .unwrap_or(&cleaned)
        .trim();
    if body.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_markdown_keeps_plain_articles() {
        assert_eq!(clean_markdown("  # Title\n\nBody  ").unwrap(), "# Title\n\nBody");
    }

    #[test]
    fn clean_markdown_rejects_empty() {
        assert!(matches!(clean_markdown("<think>nothing</think>"), Err(ParseError::EmptyResponse)));
        assert!(matches!(clean_markdown("```markdown\n\n```"), Err(ParseError::EmptyResponse)));
    }
}
