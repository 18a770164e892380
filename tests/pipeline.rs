//! Pipeline integration tests with scripted model runners.
//!
//! No PDF library and no model server needed: document text goes straight
//! into `extract_from_text` and the runner replays canned answers.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_invoice2json::{
    extract_from_text, ErrorKind, ExtractionConfig, ExtractionProgressCallback, FieldError,
    FieldType, GenerationParams, InvoiceError, ModelRunner, RecordStore, RunnerError, Schema,
    SchemaField,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const INVOICE_TEXT: &str = "--- Page 1 ---\nACME Tools Ltd\nInvoice No: INV-1\nDate: 09/03/2024\nTotal due: $123.45";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays `replies` in order and records every prompt it was sent.
struct Replay {
    replies: Mutex<VecDeque<Result<String, RunnerError>>>,
    prompts: Mutex<Vec<String>>,
}

impl Replay {
    fn new(replies: &[&str]) -> Arc<Self> {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn with_results(replies: Vec<Result<String, RunnerError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelRunner for Replay {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, RunnerError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("I could not find anything.".into()))
    }

    fn name(&self) -> String {
        "replay".into()
    }
}

fn simple_schema() -> Schema {
    Schema::new(vec![
        SchemaField::required("invoice_number", FieldType::String),
        SchemaField::required("total", FieldType::Number),
    ])
    .unwrap()
}

fn config_for(runner: Arc<Replay>, max_attempts: u32) -> ExtractionConfig {
    ExtractionConfig::builder()
        .runner(runner)
        .schema(simple_schema())
        .max_attempts(max_attempts)
        .retry_backoff_ms(0)
        .build()
        .unwrap()
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_prose_wrapped_answer_validates() {
    let runner = Replay::new(&[
        "Here you go:\n{\"invoice_number\":\"INV-1\",\"total\":\"123.45\"}",
    ]);
    let config = config_for(runner.clone(), 3);

    let out = extract_from_text(INVOICE_TEXT, "inv.pdf", "invoice number and total", &config)
        .await
        .unwrap();

    assert_eq!(out.attempts, 1);
    assert_eq!(out.record.get("invoice_number").and_then(|v| v.as_str()), Some("INV-1"));
    assert_eq!(out.record.get("total").and_then(|v| v.as_f64()), Some(123.45));
    assert_eq!(out.source, "inv.pdf");
    assert_eq!(out.history.len(), 1);
    assert!(out.history[0].failure.is_none());
    assert_eq!(runner.prompts().len(), 1);
}

#[tokio::test]
async fn test_missing_required_field_is_reported() {
    let runner = Replay::new(&["{\"total\": 50}"]);
    let config = config_for(runner, 1);

    let err = extract_from_text(INVOICE_TEXT, "inv.pdf", "invoice number and total", &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::RetriesExhausted));
    assert_eq!(
        err.field_errors(),
        &[FieldError::Missing {
            field: "invoice_number".into()
        }]
    );
}

#[tokio::test]
async fn test_retry_prompt_carries_previous_error() {
    let runner = Replay::new(&[
        "{\"total\": 50}",
        "{\"invoice_number\": \"INV-1\", \"total\": 50}",
    ]);
    let config = config_for(runner.clone(), 3);

    let out = extract_from_text(INVOICE_TEXT, "inv.pdf", "invoice number and total", &config)
        .await
        .unwrap();

    assert_eq!(out.attempts, 2);
    assert_eq!(out.history.len(), 2);
    assert_eq!(
        out.history[0].failure.as_ref().map(|f| f.kind()),
        Some(ErrorKind::MissingField)
    );

    let prompts = runner.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("REJECTED"));
    assert!(prompts[1].contains("YOUR PREVIOUS RESPONSE WAS REJECTED"));
    assert!(prompts[1].contains("missing required field 'invoice_number'"));
}

#[tokio::test]
async fn test_same_answer_gives_same_record() {
    let answer = "```json\n{\"invoice_number\": \"INV-1\", \"total\": \"$1,234.50\"}\n```";
    let first = extract_from_text(INVOICE_TEXT, "a.pdf", "total", &config_for(Replay::new(&[answer]), 3))
        .await
        .unwrap();
    let second = extract_from_text(INVOICE_TEXT, "a.pdf", "total", &config_for(Replay::new(&[answer]), 3))
        .await
        .unwrap();

    assert_eq!(first.record, second.record);
    assert_eq!(first.record.get("total").and_then(|v| v.as_f64()), Some(1234.5));
}

#[tokio::test]
async fn test_budget_is_never_exceeded() {
    let runner = Replay::new(&["no json", "still no json", "nope", "never sent"]);
    let config = config_for(runner.clone(), 3);

    let err = extract_from_text(INVOICE_TEXT, "inv.pdf", "total", &config)
        .await
        .unwrap_err();

    match err {
        InvoiceError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.kind(), ErrorKind::NoJsonFound);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(runner.prompts().len(), 3);
}

#[tokio::test]
async fn test_unavailable_model_is_not_retried() {
    let runner = Replay::with_results(vec![Err(RunnerError::Unavailable(
        "connection refused".into(),
    ))]);
    let config = config_for(runner.clone(), 3);

    let err = extract_from_text(INVOICE_TEXT, "inv.pdf", "total", &config)
        .await
        .unwrap_err();

    assert!(matches!(err, InvoiceError::ModelUnavailable { .. }), "got {err:?}");
    assert_eq!(err.kind(), Some(ErrorKind::ModelUnavailable));
    assert_eq!(runner.prompts().len(), 1);
}

#[tokio::test]
async fn test_long_document_is_truncated_with_warning() {
    let runner = Replay::new(&["{\"invoice_number\": \"INV-1\", \"total\": 10}"]);
    let config = ExtractionConfig::builder()
        .runner(runner.clone())
        .schema(simple_schema())
        .max_document_chars(200)
        .build()
        .unwrap();
    let long_text = format!("{INVOICE_TEXT}\n{}", "line item row\n".repeat(100));

    let out = extract_from_text(&long_text, "long.pdf", "total", &config)
        .await
        .unwrap();

    let t = out.truncation.as_ref().expect("truncation warning");
    assert_eq!(t.kept_chars, 200);
    assert_eq!(t.original_chars, long_text.chars().count());
    assert!(out.warnings().iter().any(|w| w.contains("truncated")));
    assert!(!runner.prompts()[0].contains(&long_text));
}

#[tokio::test]
async fn test_empty_instruction_is_rejected() {
    let runner = Replay::new(&["{}"]);
    let config = config_for(runner.clone(), 3);

    let err = extract_from_text(INVOICE_TEXT, "inv.pdf", "   ", &config)
        .await
        .unwrap_err();

    assert!(matches!(err, InvoiceError::InvalidRequest(_)), "got {err:?}");
    assert!(runner.prompts().is_empty());
}

// ── Progress callback ────────────────────────────────────────────────────────

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl ExtractionProgressCallback for EventLog {
    fn on_text_extracted(&self, _page_count: usize, chars: usize) {
        self.0.lock().unwrap().push(format!("text:{chars}"));
    }
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        self.0.lock().unwrap().push(format!("start:{attempt}/{max_attempts}"));
    }
    fn on_attempt_failed(&self, attempt: u32, _max_attempts: u32, _error: &str) {
        self.0.lock().unwrap().push(format!("failed:{attempt}"));
    }
    fn on_extraction_complete(&self, attempts: u32, field_count: usize) {
        self.0
            .lock()
            .unwrap()
            .push(format!("done:{attempts}:{field_count}"));
    }
}

#[tokio::test]
async fn test_progress_events_in_order() {
    let log = Arc::new(EventLog::default());
    let runner = Replay::new(&["oops", "{\"invoice_number\": \"INV-1\", \"total\": 1}"]);
    let config = ExtractionConfig::builder()
        .runner(runner)
        .schema(simple_schema())
        .retry_backoff_ms(0)
        .progress_callback(log.clone())
        .build()
        .unwrap();

    extract_from_text("short invoice text", "inv.pdf", "total", &config)
        .await
        .unwrap();

    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "text:18",
            "start:1/3",
            "failed:1",
            "start:2/3",
            "done:2:2",
        ]
    );
}

// ── Storage ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_persisted_records_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("records"));
    let runner = Replay::new(&[
        "{\"invoice_number\": \"INV-1\", \"total\": 123.45, \"po_number\": \"PO-9\"}",
    ]);
    let out = extract_from_text(INVOICE_TEXT, "acme invoice.pdf", "total", &config_for(runner, 3))
        .await
        .unwrap();

    let first = store.persist(&out).await.unwrap();
    let second = store.persist(&out).await.unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with(store.dir()));
    assert!(first
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("acme_invoice_") && n.ends_with(".json")));

    let body = std::fs::read_to_string(&first).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stored["source"], "acme invoice.pdf");
    assert_eq!(stored["attempts"], 1);
    assert_eq!(stored["record"]["invoice_number"], "INV-1");
    assert_eq!(stored["record"]["total"], 123.45);
    assert_eq!(stored["extras"]["po_number"], "PO-9");
    assert!(stored["extracted_at"].as_str().is_some());
    assert!(stored["warnings"].as_array().is_some_and(|w| !w.is_empty()));

    let count = std::fs::read_dir(store.dir()).unwrap().count();
    assert_eq!(count, 2);
}
