//! Prompt templating helpers.

fn is_brace(c: char) -> bool {
    c == '{' || c == '}'
}

/// Substitute `{key}` placeholders with the given values.
///
/// Use `{{` for a literal `{` and `}}` for a literal `}`. Unknown placeholders
/// are left as written. Only the template is scanned, so a value that
/// contains braces is inserted verbatim.
///
/// # Example
///
/// ```
/// use blog_pipeline::prompt::render;
///
/// let out = render("About {topic}, as JSON: {{ \"length\": {length} }}", &[("topic", "tea"), ("length", "3")]);
/// assert_eq!(out, r#"About tea, as JSON: { "length": 3 }"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(is_brace) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        // `{name}` with no brace inside; anything else is literal text.
        let close = match tail.strip_prefix('{').map(|t| (t.find(is_brace), t)) {
            Some((Some(end), inner)) if inner[end..].starts_with('}') => end,
            _ => {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
                continue;
            }
        };
        let key = &tail[1..1 + close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&tail[..close + 2]),
        }
        rest = &tail[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// Single-line preview of user text for logs: whitespace collapsed, at most
/// `max_chars` characters, `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &collapsed[..idx]),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic() {
        let result = render("Write about {topic} in {length} sections", &[("topic", "bees"), ("length", "4")]);
        assert_eq!(result, "Write about bees in 4 sections");
    }

    #[test]
    fn test_render_unknown_placeholder_kept() {
        assert_eq!(render("Hello {name}", &[]), "Hello {name}");
    }

    #[test]
    fn test_render_escaped_braces_no_substitution() {
        let result = render("Output: {{\"result\": {{\"value\": 42}}}}", &[]);
        assert_eq!(result, r#"Output: {"result": {"value": 42}}"#);
    }

    #[test]
    fn test_render_value_is_not_reinterpreted() {
        let result = render("Topic: {topic}", &[("topic", "{{braces}}")]);
        assert_eq!(result, "Topic: {{braces}}");
    }

    #[test]
    fn test_render_single_pass() {
        let result = render(
            "About {topic} in {length} paragraphs",
            &[("topic", "why {length} matters"), ("length", "3")],
        );
        assert_eq!(result, "About why {length} matters in 3 paragraphs");
    }

    #[test]
    fn test_render_stray_braces_kept() {
        assert_eq!(render("a } b { c", &[("c", "x")]), "a } b { c");
        assert_eq!(render("{{topic}} {topic}}}", &[("topic", "tea")]), "{topic} tea}");
    }

    #[test]
    fn test_section() {
        assert_eq!(section("Article", "# Tea"), "## Article\n# Tea");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("  write\nabout   bikes ", 60), "write about bikes");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
