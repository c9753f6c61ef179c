//! Deterministic JSON repair for common model output mistakes.
//!
//! Each pass is a small character scanner that knows whether it is inside a
//! string literal. No regex.

/// Attempt to repair malformed JSON without calling the model again.
///
/// Returns the repaired string only if repair changed something and the result
/// parses. Already-valid input returns `None`.
///
/// Passes, in order:
/// 1. Typographic double quotes used as delimiters become `"`
/// 2. Python `True`/`False`/`None` become `true`/`false`/`null`
/// 3. Raw newlines and tabs inside strings are escaped
/// 4. Unterminated strings and brackets are closed
/// 5. Trailing commas before `}` or `]` are dropped
///
/// ```
/// use blog_pipeline::output_parser::try_repair_json;
///
/// assert_eq!(try_repair_json(r#"{"length": 3,}"#).as_deref(), Some(r#"{"length": 3}"#));
/// assert_eq!(try_repair_json(r#"{"ok": true}"#), None);
/// ```
pub fn try_repair_json(broken: &str) -> Option<String> {
    if serde_json::from_str::<serde_json::Value>(broken).is_ok() {
        return None;
    }

    let s = normalize_quotes(broken);
    let s = replace_python_literals(&s);
    let s = escape_raw_control_chars(&s);
    let s = close_missing(&s);
    let s = remove_trailing_commas(&s);

    serde_json::from_str::<serde_json::Value>(&s).is_ok().then_some(s)
}

/// Tracks whether a scan is inside a string literal.
#[derive(Debug, Default)]
struct Literal {
    open: bool,
    escaped: bool,
}

impl Literal {
    /// Advance over `ch`. Returns whether `ch` belongs to a string literal,
    /// quotes included.
    fn step(&mut self, ch: char) -> bool {
        if self.open {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.open = false;
            }
            true
        } else {
            if ch == '"' {
                self.open = true;
            }
            ch == '"'
        }
    }
}

fn is_curly_double(ch: char) -> bool {
    matches!(ch, '\u{201C}' | '\u{201D}' | '\u{201E}')
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

fn normalize_quotes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut lit = Literal::default();

    for (i, &ch) in chars.iter().enumerate() {
        let structural = is_curly_double(ch)
            && (!lit.open
                || matches!(next_significant(&chars, i + 1), None | Some(':' | ',' | '}' | ']')));
        let ch = if structural { '"' } else { ch };
        lit.step(ch);
        out.push(ch);
    }
    out
}

fn replace_python_literals(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut lit = Literal::default();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if lit.open || !ch.is_ascii_alphabetic() {
            lit.step(ch);
            out.push(ch);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        out.push_str(match word.as_str() {
            "True" => "true",
            "False" => "false",
            "None" => "null",
            other => other,
        });
    }
    out
}

fn escape_raw_control_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut lit = Literal::default();

    for ch in s.chars() {
        if lit.open && !lit.escaped {
            match ch {
                '\n' => {
                    out.push_str("\\n");
                    continue;
                }
                '\r' => {
                    out.push_str("\\r");
                    continue;
                }
                '\t' => {
                    out.push_str("\\t");
                    continue;
                }
                _ => {}
            }
        }
        lit.step(ch);
        out.push(ch);
    }
    out
}

fn close_missing(s: &str) -> String {
    let mut out = s.trim_end().to_string();
    let mut lit = Literal::default();
    let mut stack = Vec::new();

    for ch in out.chars() {
        if lit.step(ch) {
            continue;
        }
        match ch {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if lit.open {
        if lit.escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut lit = Literal::default();

    for (i, &ch) in chars.iter().enumerate() {
        let in_string = lit.step(ch);
        if !in_string && ch == ',' && matches!(next_significant(&chars, i + 1), Some('}' | ']')) {
            continue;
        }
        out.push(ch);
    }
    out
}
