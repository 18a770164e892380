//! Error types for the edgequake-invoice2json library.
//!
//! Three layers of failure reflect three distinct scopes:
//!
//! * [`InvoiceError`] — **Fatal**: the request cannot produce a record
//!   (unreadable PDF, model backend down, retry budget spent). Returned as
//!   `Err(InvoiceError)` from the top-level `extract*` functions.
//!
//! * [`AttemptFailure`] — **Retryable**: one model attempt produced nothing
//!   usable (timeout, no JSON, schema violations). The orchestrator re-prompts
//!   with the failure text until the budget runs out.
//!
//! * [`FieldError`] — one field-level problem inside a [`ValidationError`].
//!   Serialisable so callers can render per-field messages or store them in
//!   a report.
//!
//! Every variant maps onto an [`ErrorKind`], the flat taxonomy callers match on
//! when they only care about *what* went wrong, not where.

use crate::schema::FieldType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Flat error taxonomy shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnreadablePdf,
    ModelUnavailable,
    Timeout,
    NoJsonFound,
    MissingField,
    TypeMismatch,
    RetriesExhausted,
}

impl ErrorKind {
    /// Whether the orchestrator may spend another attempt on this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::NoJsonFound
                | ErrorKind::MissingField
                | ErrorKind::TypeMismatch
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::UnreadablePdf => "unreadable_pdf",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NoJsonFound => "no_json_found",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::RetriesExhausted => "retries_exhausted",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the edgequake-invoice2json library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{source_name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF could not be opened or yielded no text.
    #[error("Unreadable PDF '{source_name}': {detail}")]
    UnreadablePdf { source_name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{source_name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { source_name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{source_name}'")]
    WrongPassword { source_name: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs a pdfium shared library. Either:\n\
  • install it system-wide (libpdfium.so / libpdfium.dylib / pdfium.dll), or\n\
  • set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model backend refused or failed the call in a way a retry will not fix.
    #[error("Model unavailable: {detail}\nIs the local model server running (e.g. `ollama serve`)?")]
    ModelUnavailable { detail: String },

    /// Every attempt failed; carries the failure of the final attempt.
    #[error("Extraction failed after {attempts} attempt(s). Last attempt: {last}")]
    RetriesExhausted { attempts: u32, last: AttemptFailure },

    // ── Request / config errors ───────────────────────────────────────────
    /// The extraction request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A schema definition is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output record file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InvoiceError {
    /// The taxonomy kind, for the variants that belong to it.
    ///
    /// Ambient failures (bad config, missing file, disk errors) return `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            InvoiceError::NotAPdf { .. }
            | InvoiceError::UnreadablePdf { .. }
            | InvoiceError::PasswordRequired { .. }
            | InvoiceError::WrongPassword { .. } => Some(ErrorKind::UnreadablePdf),
            InvoiceError::ProviderNotConfigured { .. } | InvoiceError::ModelUnavailable { .. } => {
                Some(ErrorKind::ModelUnavailable)
            }
            InvoiceError::RetriesExhausted { .. } => Some(ErrorKind::RetriesExhausted),
            _ => None,
        }
    }

    /// Field-level problems from the final attempt, if this is a retry exhaustion.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            InvoiceError::RetriesExhausted { last, .. } => last.field_errors(),
            _ => &[],
        }
    }
}

/// Why a single model attempt was rejected.
///
/// Every variant is retryable; the orchestrator appends the `Display` text
/// to the next prompt so the model can correct itself.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The model call did not return within the configured timeout.
    #[error("the model did not answer within {secs}s")]
    Timeout { secs: u64 },

    /// The raw output contained no parseable JSON object or array.
    #[error("no valid JSON object was found in the response ({detail})")]
    NoJsonFound { detail: String },

    /// JSON was found but did not satisfy the schema.
    #[error("{0}")]
    Invalid(ValidationError),
}

impl AttemptFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptFailure::Timeout { .. } => ErrorKind::Timeout,
            AttemptFailure::NoJsonFound { .. } => ErrorKind::NoJsonFound,
            AttemptFailure::Invalid(v) => v
                .errors
                .first()
                .map(FieldError::kind)
                .unwrap_or(ErrorKind::TypeMismatch),
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            AttemptFailure::Invalid(v) => &v.errors,
            _ => &[],
        }
    }
}

/// One field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    /// A required field is absent (or null / a placeholder like "N/A").
    #[error("missing required field '{field}'")]
    Missing { field: String },

    /// A present field could not be read as its declared type.
    #[error("field '{field}' must be a {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: String,
    },

    /// The top-level JSON value is not an object.
    #[error("the response must be a JSON object, got {actual}")]
    NotAnObject { actual: String },
}

impl FieldError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FieldError::Missing { .. } => ErrorKind::MissingField,
            FieldError::TypeMismatch { .. } | FieldError::NotAnObject { .. } => {
                ErrorKind::TypeMismatch
            }
        }
    }

    /// Name of the offending field; `None` for root-level problems.
    pub fn field(&self) -> Option<&str> {
        match self {
            FieldError::Missing { field } | FieldError::TypeMismatch { field, .. } => Some(field),
            FieldError::NotAnObject { .. } => None,
        }
    }
}

/// Ordered, collect-all list of field problems from one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn missing_fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().filter_map(|e| match e {
            FieldError::Missing { field } => Some(field.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} field problem(s):", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  - {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::NoJsonFound.is_retryable());
        assert!(ErrorKind::MissingField.is_retryable());
        assert!(ErrorKind::TypeMismatch.is_retryable());
        assert!(!ErrorKind::UnreadablePdf.is_retryable());
        assert!(!ErrorKind::ModelUnavailable.is_retryable());
        assert!(!ErrorKind::RetriesExhausted.is_retryable());
    }

    #[test]
    fn validation_error_lists_every_field() {
        let e = ValidationError {
            errors: vec![
                FieldError::Missing {
                    field: "invoice_number".into(),
                },
                FieldError::TypeMismatch {
                    field: "total".into(),
                    expected: FieldType::Number,
                    actual: "string \"abc\"".into(),
                },
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("2 field problem(s)"), "got: {msg}");
        assert!(msg.contains("missing required field 'invoice_number'"));
        assert!(msg.contains("field 'total' must be a number, got string \"abc\""));
    }

    #[test]
    fn retries_exhausted_carries_field_errors() {
        let last = AttemptFailure::Invalid(ValidationError {
            errors: vec![FieldError::Missing {
                field: "vendor_name".into(),
            }],
        });
        let e = InvoiceError::RetriesExhausted { attempts: 3, last };
        assert_eq!(e.kind(), Some(ErrorKind::RetriesExhausted));
        assert_eq!(e.field_errors().len(), 1);
        assert!(e.to_string().contains("vendor_name"));
        assert!(e.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn pdf_failures_share_a_kind() {
        let e = InvoiceError::PasswordRequired {
            source_name: "a.pdf".into(),
        };
        assert_eq!(e.kind(), Some(ErrorKind::UnreadablePdf));
        assert_eq!(InvoiceError::InvalidConfig("x".into()).kind(), None);
    }

    #[test]
    fn attempt_failure_kind_follows_first_error() {
        let f = AttemptFailure::Invalid(ValidationError {
            errors: vec![FieldError::Missing { field: "a".into() }],
        });
        assert_eq!(f.kind(), ErrorKind::MissingField);
        assert_eq!(
            AttemptFailure::Timeout { secs: 5 }.kind(),
            ErrorKind::Timeout
        );
    }
}
