//! Shared extraction strategies for model output.
//!
//! Every parser starts here: think-block removal, fenced block lookup and
//! bracket matching.

/// Strip think blocks, then trim.
pub fn preprocess(text: &str) -> String {
    strip_think_tags(text).trim().to_string()
}

/// Remove `<think>...</think>` and `<thinking>...</thinking>` blocks.
///
/// An unclosed block swallows the rest of the text.
///
/// # Examples
///
/// ```
/// use blog_pipeline::output_parser::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>plan</think># Title"), "# Title");
/// assert_eq!(strip_think_tags("<think>cut off"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let once = strip_tag(text, "<think>", "</think>");
    strip_tag(&once, "<thinking>", "</thinking>")
}

fn strip_tag(text: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// One fenced block: its info string and trimmed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fenced<'a> {
    pub lang: Option<&'a str>,
    pub body: &'a str,
}

/// Iterate over complete ```-fenced blocks in order.
fn fenced_blocks(text: &str) -> impl Iterator<Item = Fenced<'_>> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let open = pos + text[pos..].find("```")?;
        let info_start = open + 3;
        let line_end = info_start + text[info_start..].find('\n')?;
        let body_start = line_end + 1;
        let close = body_start + text[body_start..].find("```")?;
        pos = close + 3;
        let info = text[info_start..line_end].trim();
        Some(Fenced {
            lang: (!info.is_empty()).then_some(info),
            body: text[body_start..close].trim(),
        })
    })
}

/// The first complete fenced block, if any.
///
/// ```
/// use blog_pipeline::output_parser::extract::extract_code_block;
///
/// let block = extract_code_block("Here:\n```json\n{\"a\": 1}\n```").unwrap();
/// assert_eq!(block.lang, Some("json"));
/// assert_eq!(block.body, "{\"a\": 1}");
/// ```
pub fn extract_code_block(text: &str) -> Option<Fenced<'_>> {
    fenced_blocks(text).next()
}

/// The body of the first block tagged with `lang` (case-insensitive).
pub fn extract_code_block_for<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    fenced_blocks(text)
        .find(|b| b.lang.is_some_and(|l| l.eq_ignore_ascii_case(lang)))
        .map(|b| b.body)
}

/// If the whole text is a single fenced block tagged with one of `langs`
/// (or untagged), return its body.
pub fn strip_enclosing_fence<'a>(text: &'a str, langs: &[&str]) -> Option<&'a str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("```")?.strip_suffix("```")?;
    let (info, body) = inner.split_once('\n')?;
    let info = info.trim();
    let tagged_ok = info.is_empty() || langs.iter().any(|l| info.eq_ignore_ascii_case(l));
    (tagged_ok && !body.contains("\n```")).then(|| body.trim())
}

/// The last balanced `open ... close` region, ignoring delimiters inside
/// string literals.
///
/// ```
/// use blog_pipeline::output_parser::extract::find_bracketed;
///
/// let input = r#"Result: {"a": [1, 2]}"#;
/// assert_eq!(find_bracketed(input, '{', '}'), Some(r#"{"a": [1, 2]}"#));
/// ```
pub fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let mut best = None;
    let mut from = 0;

    while let Some(offset) = text[from..].find(open) {
        let start = from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, ch) in text[start..].char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            if ch == '"' {
                in_string = true;
            } else if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i);
                    break;
                }
            }
        }

        match end {
            Some(e) => {
                best = Some(&text[start..=e]);
                from = e + close.len_utf8();
            }
            None => break,
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_think_variants() {
        assert_eq!(strip_think_tags("<think>a</think>mid<thinking>b</thinking>end"), "midend");
        assert_eq!(strip_think_tags("<thinking>unterminated"), "");
        assert_eq!(strip_think_tags("plain"), "plain");
    }

    #[test]
    fn preprocess_strips_and_trims() {
        assert_eq!(preprocess("  <think>x</think>  # Title  "), "# Title");
    }

    #[test]
    fn code_block_lookup() {
        let text = "intro\n```yaml\na: 1\n```\nthen\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_code_block(text).unwrap().lang, Some("yaml"));
        assert_eq!(extract_code_block_for(text, "JSON"), Some("{\"a\": 1}"));
        assert!(extract_code_block("no fences").is_none());
    }

    #[test]
    fn bare_fence_has_no_lang() {
        let block = extract_code_block("```\n[1]\n```").unwrap();
        assert_eq!(block.lang, None);
        assert_eq!(block.body, "[1]");
    }

    #[test]
    fn enclosing_fence_only_when_whole_reply() {
        let wrapped = "```markdown\n# Bees\n\nBuzz.\n```";
        assert_eq!(strip_enclosing_fence(wrapped, &["markdown", "md"]), Some("# Bees\n\nBuzz."));

        let inline = "# Bees\n\n```rust\nfn main() {}\n```";
        assert_eq!(strip_enclosing_fence(inline, &["markdown"]), None);

        let other = "```python\nprint(1)\n```";
        assert_eq!(strip_enclosing_fence(other, &["markdown", "md"]), None);
    }

    #[test]
    fn bracketed_prefers_later_region() {
        let input = r#"{"draft": true} and finally {"topic": "x"}"#;
        assert_eq!(find_bracketed(input, '{', '}'), Some(r#"{"topic": "x"}"#));
    }

    #[test]
    fn bracketed_ignores_delimiters_in_strings() {
        let input = r#"{"text": "a } b [c]"}"#;
        assert_eq!(find_bracketed(input, '{', '}'), Some(input));
        assert!(find_bracketed("{unclosed", '{', '}').is_none());
    }
}
