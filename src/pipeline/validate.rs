//! Validation: check a parsed JSON value against a [`Schema`] and coerce it
//! into a [`ValidatedRecord`].
//!
//! Collect-all: every field is checked and every problem is reported in schema
//! order, so one retry prompt can fix all of them at once. Unknown keys never
//! fail validation; they are kept in the record's extras and flagged.

use crate::error::{FieldError, ValidationError};
use crate::output::{FieldValue, ValidatedRecord};
use crate::schema::{normalize_key, FieldType, Schema, SchemaField};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Values models use to say "not present".
const PLACEHOLDERS: &[&str] = &["", "n/a", "na", "none", "null", "-"];

/// Date formats tried in order; day-first formats precede month-first ones.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// ISO-style timestamps without an offset; `%.f` also matches no fraction.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Validate `value` against `schema`.
pub fn validate(value: &Value, schema: &Schema) -> Result<ValidatedRecord, ValidationError> {
    let obj = match value {
        Value::Object(map) => map,
        other => {
            return Err(ValidationError {
                errors: vec![FieldError::NotAnObject {
                    actual: describe_json(other),
                }],
            })
        }
    };

    let mut consumed: HashSet<&str> = HashSet::new();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut errors = Vec::new();

    for field in schema.fields() {
        let found = lookup(obj, field, &consumed);
        if let Some((key, _)) = found {
            consumed.insert(key);
        }

        match found.map(|(_, v)| v).filter(|v| !is_placeholder(v)) {
            None if field.required => errors.push(FieldError::Missing {
                field: field.name.clone(),
            }),
            None => {}
            Some(raw) => match coerce(raw, field.field_type) {
                Some(v) => fields.push((field.name.clone(), v)),
                None => errors.push(FieldError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.field_type,
                    actual: describe_json(raw),
                }),
            },
        }
    }

    if !errors.is_empty() {
        debug!("Validation failed with {} problem(s)", errors.len());
        return Err(ValidationError { errors });
    }

    let mut extras = Map::new();
    let mut warnings = Vec::new();
    for (k, v) in obj {
        if !consumed.contains(k.as_str()) {
            warnings.push(format!("unrecognised field '{k}' kept in extras"));
            extras.insert(k.clone(), v.clone());
        }
    }
    warnings.extend(format_warnings(&fields, &extras));
    warnings.extend(amount_sanity_warnings(&fields));

    Ok(ValidatedRecord::new(fields, extras, warnings))
}

/// Find the key for `field`: exact name first, then normalised name.
fn lookup<'a>(
    obj: &'a Map<String, Value>,
    field: &SchemaField,
    consumed: &HashSet<&str>,
) -> Option<(&'a str, &'a Value)> {
    if let Some((k, v)) = obj.get_key_value(&field.name) {
        return Some((k.as_str(), v));
    }
    let wanted = normalize_key(&field.name);
    obj.iter()
        .filter(|(k, _)| !consumed.contains(k.as_str()))
        .find(|(k, _)| normalize_key(k) == wanted)
        .map(|(k, v)| (k.as_str(), v))
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => PLACEHOLDERS.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}

fn coerce(value: &Value, field_type: FieldType) -> Option<FieldValue> {
    match field_type {
        FieldType::String => match value {
            Value::String(s) => Some(FieldValue::String(s.trim().to_string())),
            Value::Number(n) => Some(FieldValue::String(n.to_string())),
            _ => None,
        },
        FieldType::Number => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => parse_amount(s).map(FieldValue::Number),
            _ => None,
        },
        FieldType::Date => match value {
            Value::String(s) => parse_date(s).map(FieldValue::Date),
            _ => None,
        },
        FieldType::List => match value {
            Value::Array(items) => Some(FieldValue::List(items.clone())),
            _ => None,
        },
    }
}

static RE_CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z]{3}|Rs\.?)\s*|\s*[A-Z]{3}$").unwrap());
static RE_PLAIN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)$").unwrap());

/// Read a monetary or numeric string as `f64`.
///
/// Strips currency symbols, ISO codes and whitespace. When both `,` and `.`
/// appear, the later one is the decimal point. A lone comma followed by
/// exactly three digits is a thousands separator; otherwise it is a decimal
/// comma. A lone dot is always a decimal point, so `"1.500"` is 1.5.
/// Repeated separators of one kind are thousands separators.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = RE_CURRENCY_CODE.replace_all(raw.trim(), "");
    let s: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£' | '¥' | '₹' | '₩' | '₽' | '¢' | '\''))
        .collect();

    let commas = s.matches(',').count();
    let dots = s.matches('.').count();
    let normalised = match (commas, dots) {
        (0, 0) | (0, 1) => s,
        (0, _) => s.replace('.', ""),
        (1, 0) => {
            let decimals = s.len() - s.find(',').map(|i| i + 1).unwrap_or(s.len());
            if decimals == 3 {
                s.replace(',', "")
            } else {
                s.replace(',', ".")
            }
        }
        (_, 0) => s.replace(',', ""),
        _ => {
            let last_comma = s.rfind(',').unwrap_or(0);
            let last_dot = s.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
    };

    if !RE_PLAIN_NUMBER.is_match(&normalised) {
        return None;
    }
    normalised.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Read a date in any of the accepted invoice formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Short description of a JSON value for error messages.
fn describe_json(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => {
            let shown: String = s.chars().take(40).collect();
            if shown.len() < s.len() {
                format!("string \"{shown}...\"")
            } else {
                format!("string \"{shown}\"")
            }
        }
        Value::Array(a) => format!("array of {} element(s)", a.len()),
        Value::Object(_) => "object".into(),
    }
}

fn name_tokens(name: &str) -> Vec<String> {
    normalize_key(name).split('_').map(str::to_string).collect()
}

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static RE_INVOICE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_/#.]+$").unwrap());
static RE_PHONE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-().+]").unwrap());

/// Flag string values that look wrong for what their key names.
///
/// Checks emails, phone numbers and invoice numbers, in declared fields and
/// extras alike. Never an error: the value is kept as extracted.
fn format_warnings(fields: &[(String, FieldValue)], extras: &Map<String, Value>) -> Vec<String> {
    let declared = fields
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)));
    let extra = extras
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)));

    let mut warnings = Vec::new();
    for (name, value) in declared.chain(extra) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let tokens = name_tokens(name);
        let has = |t: &str| tokens.iter().any(|x| x == t);

        let what = if has("email") || has("mail") {
            (!RE_EMAIL.is_match(value)).then_some("email address")
        } else if has("phone") || has("tel") || has("telephone") || has("mobile") {
            let digits = RE_PHONE_NOISE.replace_all(value, "");
            let ok = digits.chars().all(|c| c.is_ascii_digit()) && (7..=15).contains(&digits.len());
            (!ok).then_some("phone number")
        } else if has("invoice") && (has("number") || has("no") || has("id")) {
            (!RE_INVOICE_NUMBER.is_match(value)).then_some("invoice number")
        } else {
            None
        };

        if let Some(what) = what {
            warnings.push(format!("'{name}' ({value:?}) does not look like a valid {what}"));
        }
    }
    warnings
}

/// Compare final totals against the pre-tax amounts they should include.
///
/// * a total lower than a subtotal, net or taxable amount
/// * a total equal to a net or taxable amount (taxes possibly left out)
/// * net or taxable amounts present without any total
fn amount_sanity_warnings(fields: &[(String, FieldValue)]) -> Vec<String> {
    let mut totals = Vec::new();
    let mut subtotals = Vec::new();
    let mut taxables = Vec::new();

    for (name, value) in fields {
        let Some(n) = value.as_f64() else { continue };
        let tokens = name_tokens(name);
        let has = |t: &str| tokens.iter().any(|x| x == t);

        if has("subtotal") {
            subtotals.push((name, n));
        } else if has("taxable") || has("net") {
            taxables.push((name, n));
        } else if (has("total") || has("grand") || has("gross")) && !has("tax") && !has("discount")
        {
            totals.push((name, n));
        }
    }

    let mut warnings = Vec::new();
    for (total_name, total) in &totals {
        for (base_name, base) in subtotals.iter().chain(&taxables) {
            if base > total {
                warnings.push(format!(
                    "'{total_name}' ({total}) is lower than '{base_name}' ({base}); \
the net or taxable amount may have been extracted instead of the final total"
                ));
            }
        }
        for (base_name, base) in &taxables {
            if base == total {
                warnings.push(format!(
                    "'{total_name}' ({total}) equals '{base_name}'; check that taxes are included in the total"
                ));
            }
        }
    }
    if totals.is_empty() && !taxables.is_empty() {
        warnings.push(
            "only net or taxable amounts were found; the final total including taxes may be missing"
                .to_string(),
        );
    }
    warnings
}
