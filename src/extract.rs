//! Top-level extraction entry points.
//!
//! Every entry point ends in the same place: an [`ExtractionRequest`] handed
//! to an [`Orchestrator`] built from the [`ExtractionConfig`]. They differ only
//! in where the document text comes from.

use crate::config::ExtractionConfig;
use crate::error::InvoiceError;
use crate::orchestrator::{ExtractionRequest, Orchestrator};
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::text::ExtractedText;
use crate::pipeline::{input, llm, text};
use crate::storage::RecordStore;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Extract a validated record from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`       — local file path or HTTP/HTTPS URL to a PDF
/// * `instruction` — what to extract, in plain language
/// * `config`      — extraction configuration
///
/// # Errors
/// * `InvalidRequest` for a blank instruction
/// * input and PDF errors (`FileNotFound`, `NotAPdf`, `UnreadablePdf`, …)
/// * `ModelUnavailable` when the backend is down
/// * `RetriesExhausted` when no attempt produced a valid record
///
/// # Example
/// ```rust,no_run
/// use edgequake_invoice2json::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let output = extract("invoice.pdf", "invoice number, vendor and total", &config).await?;
/// println!("{}", serde_json::to_string_pretty(&output.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    instruction: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    let input_str = input_str.as_ref();
    check_instruction(instruction)?;
    info!("Starting extraction: {}", input_str);

    let loaded = input::load_input(input_str, config.download_timeout_secs).await?;
    extract_from_bytes(&loaded.bytes, &loaded.source_name, instruction, config).await
}

/// Extract a validated record from PDF bytes already in memory.
pub async fn extract_from_bytes(
    bytes: &[u8],
    source_name: &str,
    instruction: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    let total_start = Instant::now();
    check_instruction(instruction)?;
    input::check_magic(bytes, source_name)?;

    let text_start = Instant::now();
    let extracted =
        text::extract_text(bytes.to_vec(), source_name, config.password.as_deref()).await?;
    let text_duration_ms = text_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} chars from {} page(s) in {}ms",
        extracted.text.chars().count(),
        extracted.page_count,
        text_duration_ms
    );

    run(extracted, source_name, instruction, config, text_duration_ms, total_start).await
}

/// Extract a validated record from document text that is already plain text.
///
/// Skips PDF handling entirely; useful for text pulled from elsewhere and for
/// exercising the model stages on their own.
pub async fn extract_from_text(
    document_text: &str,
    source_name: &str,
    instruction: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    let extracted = ExtractedText {
        text: document_text.to_string(),
        page_count: 0,
    };
    run(extracted, source_name, instruction, config, 0, Instant::now()).await
}

/// Extract a record and persist it as a new file under `output_dir`.
///
/// Returns the output together with the path of the written file.
pub async fn extract_to_dir(
    input_str: impl AsRef<str>,
    instruction: &str,
    output_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<(ExtractionOutput, PathBuf), InvoiceError> {
    let output = extract(input_str, instruction, config).await?;
    let path = RecordStore::new(output_dir.as_ref()).persist(&output).await?;
    Ok((output, path))
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    instruction: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, InvoiceError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, instruction, config))
}

/// Load a PDF and return its cleaned text without calling a model.
///
/// Only `password` and `download_timeout_secs` are read from `config`.
pub async fn inspect_text(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractedText, InvoiceError> {
    let loaded = input::load_input(input_str.as_ref(), config.download_timeout_secs).await?;
    text::extract_text(loaded.bytes, &loaded.source_name, config.password.as_deref()).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn check_instruction(instruction: &str) -> Result<(), InvoiceError> {
    if instruction.trim().is_empty() {
        return Err(InvoiceError::InvalidRequest(
            "no extraction instruction provided".into(),
        ));
    }
    Ok(())
}

async fn run(
    extracted: ExtractedText,
    source_name: &str,
    instruction: &str,
    config: &ExtractionConfig,
    text_duration_ms: u64,
    total_start: Instant,
) -> Result<ExtractionOutput, InvoiceError> {
    let document_chars = extracted.text.chars().count();
    let request = ExtractionRequest::new(extracted.text, instruction)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_text_extracted(extracted.page_count, document_chars);
    }

    let runner = llm::resolve_runner(config)?;
    let run = Orchestrator::from_config(runner, config).run(&request).await?;

    let stats = ExtractionStats {
        document_chars,
        page_count: extracted.page_count,
        text_duration_ms,
        model_duration_ms: run.model_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {} after {} attempt(s), {}ms total",
        source_name, run.attempts, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        source: source_name.to_string(),
        record: run.record,
        attempts: run.attempts,
        history: run.history,
        raw_output: run.raw_output,
        truncation: run.truncation,
        stats,
    })
}
