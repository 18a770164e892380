//! Output types: the validated record and the run report around it.

use crate::error::AttemptFailure;
use crate::prompts::TruncationWarning;
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A single coerced field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    /// Serialised as `YYYY-MM-DD`.
    Date(NaiveDate),
    List(Vec<Value>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Plain JSON rendering (dates become ISO strings).
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::List(l) => Value::Array(l.clone()),
        }
    }
}

/// A field-complete, type-correct extraction result.
///
/// Only schema fields live in `fields`, in schema order. Keys the model added
/// on its own are kept in `extras` and flagged in `warnings`; they never make
/// a record invalid.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValidatedRecord {
    #[serde(serialize_with = "serialize_ordered")]
    fields: Vec<(String, FieldValue)>,
    extras: Map<String, Value>,
    warnings: Vec<String>,
}

impl ValidatedRecord {
    pub(crate) fn new(
        fields: Vec<(String, FieldValue)>,
        extras: Map<String, Value>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            fields,
            extras,
            warnings,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The declared fields as a JSON object (no extras).
    ///
    /// Feeding this back through the validator with the same schema yields an
    /// identical record.
    pub fn to_parsed(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_parsed())
    }

    /// The declared fields, serialising as an object in schema order.
    ///
    /// `to_parsed` goes through `serde_json::Map`, which sorts its keys.
    pub fn ordered_fields(&self) -> OrderedFields<'_> {
        OrderedFields(&self.fields)
    }
}

/// Schema-ordered view of a record's fields; see [`ValidatedRecord::ordered_fields`].
#[derive(Debug, Clone, Copy)]
pub struct OrderedFields<'a>(&'a [(String, FieldValue)]);

impl Serialize for OrderedFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_ordered(self.0, serializer)
    }
}

fn serialize_ordered<S: Serializer>(
    fields: &[(String, FieldValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (k, v) in fields {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

/// What happened on one model attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-indexed.
    pub attempt: u32,
    pub prompt_chars: usize,
    pub duration_ms: u64,
    /// `None` when this attempt produced the record.
    pub failure: Option<AttemptFailure>,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub record: ValidatedRecord,
    /// Attempt that produced the record (1-indexed).
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
    /// Raw model output of the successful attempt.
    pub raw_output: String,
    pub truncation: Option<TruncationWarning>,
    pub model_duration_ms: u64,
}

/// Timing and size statistics for an extraction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStats {
    pub document_chars: usize,
    pub page_count: usize,
    pub text_duration_ms: u64,
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Full report returned by the `extract*` entry points.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    /// File name (or URL tail) the document came from.
    pub source: String,
    pub record: ValidatedRecord,
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
    pub raw_output: String,
    pub truncation: Option<TruncationWarning>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// All non-fatal warnings: truncation first, then record warnings.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(t) = &self.truncation {
            out.push(t.to_string());
        }
        out.extend(self.record.warnings().iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ValidatedRecord {
        ValidatedRecord::new(
            vec![
                ("invoice_number".into(), FieldValue::String("INV-1".into())),
                ("total".into(), FieldValue::Number(123.45)),
                (
                    "invoice_date".into(),
                    FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
                ),
            ],
            Map::new(),
            vec![],
        )
    }

    #[test]
    fn serialises_in_schema_order_with_iso_dates() {
        let json = serde_json::to_string(&sample()).unwrap();
        let inv = json.find("invoice_number").unwrap();
        let total = json.find("\"total\"").unwrap();
        assert!(inv < total, "got: {json}");
        assert!(json.contains("\"2024-03-09\""), "got: {json}");
    }

    #[test]
    fn to_json_drops_nothing_declared() {
        let v = sample().to_json();
        assert_eq!(v["invoice_number"], "INV-1");
        assert_eq!(v["total"].as_f64(), Some(123.45));
        assert_eq!(v["invoice_date"], "2024-03-09");
    }

    #[test]
    fn ordered_fields_keep_schema_order() {
        let json = serde_json::to_string(&sample().ordered_fields()).unwrap();
        assert_eq!(
            json,
            r#"{"invoice_number":"INV-1","total":123.45,"invoice_date":"2024-03-09"}"#
        );
    }

    #[test]
    fn accessors() {
        let r = sample();
        assert_eq!(r.get("total").and_then(FieldValue::as_f64), Some(123.45));
        assert_eq!(r.get("invoice_number").and_then(FieldValue::as_str), Some("INV-1"));
        assert!(r.get("missing").is_none());
        assert_eq!(r.len(), 3);
    }
}
