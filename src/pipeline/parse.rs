//! Response parsing: find the first well-formed JSON value in raw model text.
//!
//! Models wrap their answer in prose, code fences or both, and smaller
//! models often write Python-style dicts. The parser:
//!
//! 1. rejects empty output outright;
//! 2. strips fence lines (```` ```json ````, ```` ```JSON ````, ```` ``` ````
//!    alone on a line); fences inside string values are left alone;
//! 3. tries every `{` or `[` in order as a candidate start, scanning forward
//!    with a bracket stack that ignores brackets inside string literals;
//!    a mismatched closer abandons that start;
//! 4. each time the stack empties, parses the candidate with `serde_json`,
//!    then with trailing commas removed, then with single-quoted strings
//!    and bare keys rewritten to JSON; first success wins.

use crate::error::AttemptFailure;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;

/// No JSON value could be recovered from the model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub detail: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

impl std::error::Error for ParseFailure {}

impl From<ParseFailure> for AttemptFailure {
    fn from(p: ParseFailure) -> Self {
        AttemptFailure::NoJsonFound { detail: p.detail }
    }
}

static RE_FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```(?:json|JSON)?[ \t]*$").unwrap());
static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Locate and parse the first well-formed JSON object or array in `raw`.
pub fn extract_json(raw: &str) -> Result<Value, ParseFailure> {
    if raw.trim().is_empty() {
        return Err(ParseFailure {
            detail: "model returned an empty response".into(),
        });
    }

    let text = RE_FENCE_LINE.replace_all(raw, "");
    let text = text.as_ref();
    let bytes = text.as_bytes();

    let mut saw_candidate = false;
    for (start, &b) in bytes.iter().enumerate() {
        if b != b'{' && b != b'[' {
            continue;
        }
        saw_candidate = true;
        if let Some(value) = scan_from(text, start) {
            return Ok(value);
        }
    }

    let detail = if saw_candidate {
        "no bracketed region parsed as JSON"
    } else {
        "no '{' or '[' in the response"
    };
    Err(ParseFailure {
        detail: detail.into(),
    })
}

/// Scan forward from `start` and try every balanced region it closes.
///
/// Brackets are ASCII, so byte offsets are always char boundaries.
fn scan_from(text: &str, start: usize) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return parse_candidate(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_candidate(candidate: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }
    let repaired = RE_TRAILING_COMMA.replace_all(candidate, "$1");
    if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
        return Some(v);
    }
    let requoted = requote(&repaired);
    serde_json::from_str::<Value>(&requoted).ok()
}

/// Rewrite `'single'` strings as `"double"` ones and quote bare object keys.
///
/// Only touches text outside double-quoted strings. Bare words are quoted
/// only when they follow `{` or `,` and are followed by `:`, so `true`,
/// `false` and `null` values survive.
fn requote(candidate: &str) -> String {
    let chars: Vec<char> = candidate.chars().collect();
    let mut out = String::with_capacity(candidate.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                // Copy a double-quoted string through unchanged.
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        out.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    if chars[i - 1] == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    match chars[i] {
                        '\\' if chars.get(i + 1) == Some(&'\'') => {
                            out.push('\'');
                            i += 2;
                            continue;
                        }
                        '\\' if i + 1 < chars.len() => {
                            out.push('\\');
                            out.push(chars[i + 1]);
                            i += 2;
                            continue;
                        }
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            c if (c.is_alphabetic() || c == '_') && follows_key_start(&out) => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn follows_key_start(out: &str) -> bool {
    matches!(out.trim_end().chars().last(), Some('{') | Some(','))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_in_prose() {
        let v = extract_json("Here you go:\n{\"invoice_number\":\"INV-1\",\"total\":\"123.45\"}")
            .unwrap();
        assert_eq!(v, json!({"invoice_number": "INV-1", "total": "123.45"}));
    }

    #[test]
    fn braces_inside_strings() {
        let raw = r#"Sure! {"note": "use {curly} and [square] \"quoted\" }", "n": 1} trailing"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["note"], "use {curly} and [square] \"quoted\" }");
        assert_eq!(v["n"], 1);
    }

    #[test]
    fn fenced_block() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
        let raw = "```JSON\n[1, 2]\n```";
        assert_eq!(extract_json(raw).unwrap(), json!([1, 2]));
    }

    #[test]
    fn trailing_commas_repaired() {
        let raw = "{\"a\": 1, \"b\": [1, 2,],}";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn fence_text_inside_values_is_kept() {
        let raw = r#"{"note": "wrap in ```json blocks"}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"note": "wrap in ```json blocks"}));

        let raw = "```json\n{\"note\": \"see ``` above\"}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"note": "see ``` above"}));
    }

    #[test]
    fn inline_fences_still_parse() {
        let raw = "```json {\"a\": 1} ```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn single_quotes_repaired() {
        let raw = "{'invoice_number': 'INV-1', 'total': 5}";
        assert_eq!(
            extract_json(raw).unwrap(),
            json!({"invoice_number": "INV-1", "total": 5})
        );

        let raw = r#"{'vendor': 'Say "hi" Ltd', 'ok': true, 'n': null}"#;
        assert_eq!(
            extract_json(raw).unwrap(),
            json!({"vendor": "Say \"hi\" Ltd", "ok": true, "n": null})
        );
    }

    #[test]
    fn bare_keys_repaired() {
        assert_eq!(
            extract_json(r#"{invoice_number: "A"}"#).unwrap(),
            json!({"invoice_number": "A"})
        );
        assert_eq!(
            extract_json("{total: 12.5, paid: false, items: [1, 2,],}").unwrap(),
            json!({"total": 12.5, "paid": false, "items": [1, 2]})
        );
    }

    #[test]
    fn requote_leaves_double_quoted_text_alone() {
        let s = r#"{"it's": "a, b: c", note: 'x'}"#;
        assert_eq!(requote(s), r#"{"it's": "a, b: c", "note": "x"}"#);
    }

    #[test]
    fn first_parseable_candidate_wins() {
        // "{not json}" balances but fails to parse; the next start succeeds.
        let raw = "{not json} then {\"ok\": true} and {\"later\": 1}";
        assert_eq!(extract_json(raw).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn mismatched_closer_abandons_start() {
        let raw = "[} {\"x\": 2}";
        assert_eq!(extract_json(raw).unwrap(), json!({"x": 2}));
    }

    #[test]
    fn empty_and_missing() {
        let e = extract_json("   \n").unwrap_err();
        assert_eq!(e.detail, "model returned an empty response");
        let e = extract_json("I could not find an invoice.").unwrap_err();
        assert!(e.detail.contains("no '{'"));
        assert!(extract_json("{ unterminated").is_err());
    }

    #[test]
    fn converts_to_attempt_failure() {
        let f: AttemptFailure = extract_json("").unwrap_err().into();
        assert!(matches!(f, AttemptFailure::NoJsonFound { .. }));
    }
}
