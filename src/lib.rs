//! # edgequake-invoice2json
//!
//! Extract structured, validated JSON records from PDF invoices with a
//! locally-run language model.
//!
//! Models asked for JSON answer with prose, fences, missing fields and
//! amounts written as `"$1,234.50"`. This crate treats the model as an
//! unreliable component: every answer is parsed, checked against a declared
//! [`Schema`] and coerced to typed values, and a rejected answer is sent back
//! with the exact field problems until it validates or the attempt budget
//! runs out. Only a [`ValidatedRecord`] ever leaves the pipeline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Text      pdfium text layer, cleaned, `--- Page N ---` markers
//!  ├─ 3. Prompt    schema + instruction + (truncated) text
//!  ├─ 4. Model     ModelRunner (Ollama by default), per-call timeout
//!  ├─ 5. Parse     first well-formed JSON value in the output
//!  ├─ 6. Validate  presence, coercion, extras, sanity warnings
//!  │     └─ on failure: re-prompt with the error text (bounded)
//!  └─ 7. Store     write-once `<stem>_<timestamp>.json`
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice2json::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Local Ollama with llama3.2 unless configured otherwise
//!     let config = ExtractionConfig::default();
//!     let output = extract("invoice.pdf", "invoice number, vendor and total", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     for w in output.warnings() {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-invoice2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod storage;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{AttemptFailure, ErrorKind, FieldError, InvoiceError, ValidationError};
pub use extract::{
    extract, extract_from_bytes, extract_from_text, extract_sync, extract_to_dir, inspect_text,
};
pub use orchestrator::{ExtractionRequest, Orchestrator};
pub use output::{
    AttemptRecord, ExtractionOutput, ExtractionStats, FieldValue, OrderedFields, PipelineRun,
    ValidatedRecord,
};
pub use pipeline::llm::{GenerationParams, LlmRunner, ModelRunner, RunnerError};
pub use pipeline::parse::extract_json;
pub use pipeline::validate::validate;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{classify_request, BuiltPrompt, RequestMode, TruncationWarning};
pub use schema::{FieldType, Schema, SchemaField};
pub use storage::RecordStore;
pub use templates::PromptTemplate;
