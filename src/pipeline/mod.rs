//! Pipeline stages for invoice-to-JSON extraction.
//!
//! Each submodule implements exactly one transformation step and is tested
//! on its own; [`crate::orchestrator`] wires the model-facing stages into the
//! bounded retry loop.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──▶ (prompts) ──▶ llm ──▶ parse ──▶ validate
//! (URL/path) (pdfium)             (model)  (JSON)    (schema)
//! ```
//!
//! 1. [`input`]    — read the local file or download the URL, check `%PDF`
//! 2. [`text`]     — extract and clean the text layer; runs in `spawn_blocking`
//! 3. [`llm`]      — the [`llm::ModelRunner`] seam; the only stage with network I/O
//! 4. [`parse`]    — recover the first well-formed JSON value from raw output
//! 5. [`validate`] — check and coerce the value against the schema

pub mod input;
pub mod llm;
pub mod parse;
pub mod text;
pub mod validate;
