//! Declarative description of the record the model is asked to produce.
//!
//! A [`Schema`] is a flat, ordered list of [`SchemaField`]s. It is rendered
//! into the prompt (so the model knows the target shape) and consumed by
//! [`crate::pipeline::validate`] (so the answer is checked against the same
//! shape). There is deliberately no nesting: invoices are flat records plus
//! an optional `items` list whose elements are kept as raw JSON.

use crate::error::InvoiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Target type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    List,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::List => "list",
        };
        f.write_str(s)
    }
}

/// One declared target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Free-text hint rendered next to the field in the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaField {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered set of fields with unique (normalised) names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

/// Accepts both `{"fields": [...]}` and a bare `[...]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    Wrapped { fields: Vec<SchemaField> },
    Bare(Vec<SchemaField>),
}

impl Schema {
    /// Build a schema, rejecting empty, blank or duplicate field names.
    pub fn new(fields: Vec<SchemaField>) -> Result<Self, InvoiceError> {
        if fields.is_empty() {
            return Err(InvoiceError::InvalidSchema(
                "a schema needs at least one field".into(),
            ));
        }
        let mut seen = HashSet::new();
        for f in &fields {
            let key = normalize_key(&f.name);
            if key.is_empty() {
                return Err(InvoiceError::InvalidSchema(
                    "field names must not be blank".into(),
                ));
            }
            if !seen.insert(key) {
                return Err(InvoiceError::InvalidSchema(format!(
                    "duplicate field '{}'",
                    f.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// The built-in invoice schema used when no other is configured.
    pub fn invoice_default() -> Self {
        Self {
            fields: vec![
                SchemaField::required("invoice_number", FieldType::String)
                    .describe("invoice number / ID as printed"),
                SchemaField::required("vendor_name", FieldType::String)
                    .describe("seller or supplier company name"),
                SchemaField::required("total_amount", FieldType::Number)
                    .describe("final payable amount including all taxes"),
                SchemaField::optional("invoice_date", FieldType::Date),
                SchemaField::optional("due_date", FieldType::Date),
                SchemaField::optional("customer_name", FieldType::String)
                    .describe("buyer / bill-to party"),
                SchemaField::optional("currency", FieldType::String)
                    .describe("ISO 4217 code when identifiable"),
                SchemaField::optional("tax_amount", FieldType::Number),
                SchemaField::optional("subtotal", FieldType::Number)
                    .describe("amount before taxes"),
                SchemaField::optional("items", FieldType::List)
                    .describe("line items as objects"),
            ],
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, InvoiceError> {
        let parsed: SchemaFile = serde_json::from_str(s)
            .map_err(|e| InvoiceError::InvalidSchema(format!("not a schema document: {e}")))?;
        match parsed {
            SchemaFile::Wrapped { fields } | SchemaFile::Bare(fields) => Self::new(fields),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, InvoiceError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            InvoiceError::InvalidSchema(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        let key = normalize_key(name);
        self.fields.iter().find(|f| normalize_key(&f.name) == key)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Machine-readable field enumeration embedded in the prompt.
    ///
    /// One line per field: `- name: type (required|optional)[ — description]`.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                let req = if f.required { "required" } else { "optional" };
                match &f.description {
                    Some(d) => format!("- {}: {} ({}) — {}", f.name, f.field_type, req, d),
                    None => format!("- {}: {} ({})", f.name, f.field_type, req),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// An example JSON object showing the expected shape.
    pub fn shape_example(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|f| {
                let placeholder = match f.field_type {
                    FieldType::String => "\"...\"",
                    FieldType::Number => "0.0",
                    FieldType::Date => "\"YYYY-MM-DD\"",
                    FieldType::List => "[]",
                };
                format!("  \"{}\": {}", f.name, placeholder)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{{\n{body}\n}}")
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::invoice_default()
    }
}

/// Canonical form used to match model keys against field names:
/// trimmed, lowercase, spaces and hyphens folded to `_`.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
