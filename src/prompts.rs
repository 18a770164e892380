//! Prompt construction for schema-guided JSON extraction.
//!
//! Every string the model sees is assembled here so prompt regressions can be
//! caught by unit tests without a model. The layout is fixed:
//!
//! 1. [`JSON_ONLY_INSTRUCTION`] — answer with one JSON object, nothing else
//! 2. the schema enumeration from [`Schema::describe`] and a shape example
//! 3. the user's instruction
//! 4. the (possibly truncated) document text
//! 5. the guidance block for the request's [`RequestMode`]
//! 6. [`RESPONSE_RULES`] and a `JSON Response:` cue
//!
//! Retries reuse the first-attempt prompt verbatim and append one correction
//! block built by [`build_retry_prompt`].

use crate::error::AttemptFailure;
use crate::schema::Schema;
use serde::Serialize;
use std::fmt;

/// Opening instruction of every prompt.
pub const JSON_ONLY_INSTRUCTION: &str = "You are an AI assistant specialized in extracting information from invoices.\n\
Respond with JSON only: a single JSON object matching the shape described below. \
Do not add explanations, markdown fences or any text before or after the JSON.";

/// Formatting rules appended after the document text.
pub const RESPONSE_RULES: &str = r#"RESPONSE RULES:
- Return ONLY a valid JSON object using exactly the field names listed above
- Use null for any field whose value is not present in the invoice
- Amount fields are plain numbers without currency symbols or thousands separators
- "total_amount"-style fields are the FINAL payable amount including all taxes, not the net or taxable value
- Dates use the format YYYY-MM-DD
- List fields are JSON arrays, even when they contain a single element"#;

/// How broad the user's request is; selects the guidance block of the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// A narrow question ("just the total", "what is the due date").
    Specific,
    /// Everything on the invoice ("extract all details").
    All,
    /// Anything in between.
    General,
}

const SPECIFIC_WORDS: &[&str] = &["only", "just", "extract", "find", "get"];
const ALL_WORDS: &[&str] = &["all", "everything", "complete", "full", "entire"];

/// Classify an instruction by its wording.
///
/// "All" words win over "specific" words; a short instruction with neither
/// counts as specific.
pub fn classify_request(instruction: &str) -> RequestMode {
    let lower = instruction.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let any = |list: &[&str]| words.iter().any(|w| list.contains(w));

    if any(ALL_WORDS) {
        RequestMode::All
    } else if any(SPECIFIC_WORDS) || lower.contains("what is") || words.len() <= 5 {
        RequestMode::Specific
    } else {
        RequestMode::General
    }
}

const AMOUNT_GUIDANCE: &str = "AMOUNT FIELDS:
- A total is the FINAL payable amount after all taxes, usually the highest amount near the bottom
- Look for labels like \"Total\", \"Grand Total\", \"Gross Total\", \"Gross Worth\", \"Amount Due\"
- \"Net Worth\", \"Net Amount\", \"Taxable Value\" and \"Subtotal\" are amounts BEFORE taxes, never the total
- Example: Net Worth 192.81 + VAT 19.28 gives a total of 212.09";

fn mode_guidance(mode: RequestMode) -> &'static str {
    match mode {
        RequestMode::Specific => "EXTRACTION MODE: specific
- Focus on exactly what the user asked for
- Leave optional fields the user did not ask about as null
- Do not add fields that are not listed above",
        RequestMode::All => "EXTRACTION MODE: complete
- Fill every listed field the invoice contains; use null only when a value is truly absent
- Further details the user asked for may be added with descriptive snake_case names",
        RequestMode::General => "EXTRACTION MODE: general
- Extract the details that answer the user's request
- Required fields must always be filled when the invoice contains them",
    }
}

/// Marker appended when the document had to be cut to fit the budget.
pub fn truncation_marker(kept: usize, original: usize) -> String {
    format!("\n[... document truncated: kept {kept} of {original} characters ...]")
}

/// Non-fatal notice that the document did not fit the character budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TruncationWarning {
    pub original_chars: usize,
    pub kept_chars: usize,
}

impl fmt::Display for TruncationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "document text truncated to {} of {} characters; fields near the end may be missed",
            self.kept_chars, self.original_chars
        )
    }
}

/// A prompt ready for the model, plus any truncation that happened building it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    pub truncation: Option<TruncationWarning>,
    pub mode: RequestMode,
}

/// Cut `text` to at most `max_chars` characters, appending a marker when cut.
///
/// Counts Unicode scalar values, never splits a character, and always keeps
/// the beginning of the document.
pub fn truncate_document(text: &str, max_chars: usize) -> (String, Option<TruncationWarning>) {
    let original = text.chars().count();
    if original <= max_chars {
        return (text.to_string(), None);
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut kept = text[..cut].to_string();
    kept.push_str(&truncation_marker(max_chars, original));
    (
        kept,
        Some(TruncationWarning {
            original_chars: original,
            kept_chars: max_chars,
        }),
    )
}

/// Build the first-attempt prompt.
pub fn build_prompt(
    document_text: &str,
    instruction: &str,
    schema: &Schema,
    max_document_chars: usize,
) -> BuiltPrompt {
    let (document, truncation) = truncate_document(document_text, max_document_chars);
    let mode = classify_request(instruction);

    let text = format!(
        "{JSON_ONLY_INSTRUCTION}\n\n\
SCHEMA FIELDS:\n{fields}\n\n\
EXPECTED SHAPE:\n{shape}\n\n\
USER REQUEST:\n{instruction}\n\n\
INVOICE TEXT:\n{document}\n\n\
{guidance}\n\n\
{AMOUNT_GUIDANCE}\n\n\
{RESPONSE_RULES}\n\n\
JSON Response:",
        fields = schema.describe(),
        shape = schema.shape_example(),
        instruction = instruction.trim(),
        guidance = mode_guidance(mode),
    );

    BuiltPrompt {
        text,
        truncation,
        mode,
    }
}

/// Build the prompt for the attempt that follows a failed one.
///
/// The failure text is appended verbatim so the model sees exactly which
/// fields to fix.
pub fn build_retry_prompt(base: &BuiltPrompt, failure: &AttemptFailure) -> String {
    let fix = match failure {
        AttemptFailure::Invalid(_) => {
            "Correct exactly these fields and respond again with the complete JSON object only."
        }
        AttemptFailure::NoJsonFound { .. } => {
            "Respond again with a single valid JSON object only, no prose and no code fences."
        }
        AttemptFailure::Timeout { .. } => {
            "Respond again, briefly, with the JSON object only."
        }
    };
    format!(
        "{}\n\nYOUR PREVIOUS RESPONSE WAS REJECTED:\n{}\n\n{}\n\nJSON Response:",
        base.text, failure, fix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FieldError, ValidationError};
    use crate::schema::{FieldType, SchemaField};

    fn schema() -> Schema {
        Schema::new(vec![
            SchemaField::required("invoice_number", FieldType::String),
            SchemaField::required("total", FieldType::Number),
        ])
        .unwrap()
    }

    #[test]
    fn sections_appear_in_order() {
        let p = build_prompt("Invoice #7 total 10", "get the total", &schema(), 1000);
        let t = &p.text;
        let a = t.find("Respond with JSON only").unwrap();
        let b = t.find("- invoice_number: string (required)").unwrap();
        let c = t.find("get the total").unwrap();
        let d = t.find("Invoice #7 total 10").unwrap();
        assert!(a < b && b < c && c < d, "unexpected layout:\n{t}");
        assert!(t.ends_with("JSON Response:"));
        assert!(p.truncation.is_none());
    }

    #[test]
    fn truncates_from_the_end_with_marker() {
        let doc = "a".repeat(50) + &"z".repeat(50);
        let p = build_prompt(&doc, "x", &schema(), 60);
        let w = p.truncation.expect("should warn");
        assert_eq!(w.original_chars, 100);
        assert_eq!(w.kept_chars, 60);
        assert!(p.text.contains(&"a".repeat(50)));
        assert!(!p.text.contains(&"z".repeat(11)));
        assert!(p.text.contains("[... document truncated: kept 60 of 100 characters ...]"));
    }

    #[test]
    fn truncation_is_char_safe_and_deterministic() {
        let doc = "é".repeat(10);
        let (a, wa) = truncate_document(&doc, 3);
        let (b, _) = truncate_document(&doc, 3);
        assert_eq!(a, b);
        assert!(a.starts_with("ééé\n"));
        assert_eq!(wa.unwrap().kept_chars, 3);
    }

    #[test]
    fn exact_budget_is_not_truncated() {
        let (t, w) = truncate_document("abcd", 4);
        assert_eq!(t, "abcd");
        assert!(w.is_none());
    }

    #[test]
    fn request_wording_selects_mode() {
        assert_eq!(classify_request("just the total"), RequestMode::Specific);
        assert_eq!(classify_request("What is the due date?"), RequestMode::Specific);
        assert_eq!(classify_request("invoice number"), RequestMode::Specific);
        assert_eq!(classify_request("Extract all details from this invoice"), RequestMode::All);
        assert_eq!(
            classify_request("I need the complete list of line items with quantities"),
            RequestMode::All
        );
        assert_eq!(
            classify_request("Please tell me the vendor, the invoice date and the amount payable"),
            RequestMode::General
        );
        // "small" contains "all" but is not the word.
        assert_eq!(
            classify_request("which small fees were charged on top of the rent"),
            RequestMode::General
        );
    }

    #[test]
    fn guidance_follows_mode_and_precedes_rules() {
        let p = build_prompt("doc", "just the total", &schema(), 100);
        assert_eq!(p.mode, RequestMode::Specific);
        let t = &p.text;
        let doc = t.find("INVOICE TEXT:").unwrap();
        let mode = t.find("EXTRACTION MODE: specific").unwrap();
        let amounts = t.find("AMOUNT FIELDS:").unwrap();
        let rules = t.find("RESPONSE RULES:").unwrap();
        assert!(doc < mode && mode < amounts && amounts < rules, "unexpected layout:\n{t}");

        let p = build_prompt("doc", "everything on the invoice", &schema(), 100);
        assert!(p.text.contains("EXTRACTION MODE: complete"));
        assert!(!p.text.contains("EXTRACTION MODE: specific"));
    }

    #[test]
    fn retry_prompt_appends_error_text() {
        let base = build_prompt("doc", "instr", &schema(), 100);
        let failure = AttemptFailure::Invalid(ValidationError {
            errors: vec![FieldError::Missing {
                field: "invoice_number".into(),
            }],
        });
        let retry = build_retry_prompt(&base, &failure);
        assert!(retry.starts_with(&base.text));
        assert!(retry.contains("missing required field 'invoice_number'"));
        assert!(retry.contains("Correct exactly these fields"));
    }
}
