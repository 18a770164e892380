//! Pipeline orchestrator: the bounded prompt → model → parse → validate loop.
//!
//! ## States
//!
//! ```text
//!            ┌─────────────── retry prompt ───────────────┐
//!            ▼                                            │
//!  Built ──▶ Invoked ──▶ Parsed ──▶ Validated (done)      │
//!    │          │           │                             │
//!    └──────────┴───────────┴──────▶ Failed(attempt) ─────┘
//!                                       │
//!                                       └─▶ RetriesExhausted (attempt == max)
//! ```
//!
//! A model that is down ([`RunnerError::Unavailable`]) ends the run at once
//! with [`InvoiceError::ModelUnavailable`]; everything else that goes wrong in
//! an attempt is an [`AttemptFailure`] and costs one unit of the budget. The
//! next prompt is the first-attempt prompt plus the most recent failure text.

use crate::config::ExtractionConfig;
use crate::error::{AttemptFailure, InvoiceError};
use crate::output::{AttemptRecord, PipelineRun};
use crate::pipeline::llm::{GenerationParams, ModelRunner, RunnerError};
use crate::pipeline::{parse, validate};
use crate::progress::ProgressCallback;
use crate::prompts::{build_prompt, build_retry_prompt};
use crate::schema::Schema;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One submission: the document text and what the user wants from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    document_text: String,
    user_instruction: String,
}

impl ExtractionRequest {
    /// Rejects a blank instruction or blank document text.
    pub fn new(
        document_text: impl Into<String>,
        user_instruction: impl Into<String>,
    ) -> Result<Self, InvoiceError> {
        let document_text = document_text.into();
        let user_instruction = user_instruction.into();
        if user_instruction.trim().is_empty() {
            return Err(InvoiceError::InvalidRequest(
                "no extraction instruction provided".into(),
            ));
        }
        if document_text.trim().is_empty() {
            return Err(InvoiceError::InvalidRequest("document text is empty".into()));
        }
        Ok(Self {
            document_text,
            user_instruction,
        })
    }

    pub fn document_text(&self) -> &str {
        &self.document_text
    }

    pub fn user_instruction(&self) -> &str {
        &self.user_instruction
    }
}

enum State {
    Built { attempt: u32, prompt: String },
    Invoked { attempt: u32, raw: String },
    Parsed { attempt: u32, raw: String, value: Value },
    Failed { attempt: u32, failure: AttemptFailure },
}

/// Drives one request through the retry loop.
pub struct Orchestrator {
    runner: Arc<dyn ModelRunner>,
    schema: Schema,
    params: GenerationParams,
    max_attempts: u32,
    call_timeout: Duration,
    retry_backoff_ms: u64,
    max_document_chars: usize,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn ModelRunner>, schema: Schema) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            runner,
            schema,
            params: GenerationParams::from(&defaults),
            max_attempts: defaults.max_attempts,
            call_timeout: Duration::from_secs(defaults.api_timeout_secs),
            retry_backoff_ms: defaults.retry_backoff_ms,
            max_document_chars: defaults.max_document_chars,
            progress: None,
        }
    }

    pub fn from_config(runner: Arc<dyn ModelRunner>, config: &ExtractionConfig) -> Self {
        Self {
            runner,
            schema: config.schema.clone(),
            params: GenerationParams::from(config),
            max_attempts: config.max_attempts.max(1),
            call_timeout: Duration::from_secs(config.api_timeout_secs),
            retry_backoff_ms: config.retry_backoff_ms,
            max_document_chars: config.max_document_chars,
            progress: config.progress_callback.clone(),
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn max_document_chars(mut self, n: usize) -> Self {
        self.max_document_chars = n;
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run the request until a record validates or the budget is spent.
    pub async fn run(&self, request: &ExtractionRequest) -> Result<PipelineRun, InvoiceError> {
        let base = build_prompt(
            request.document_text(),
            request.user_instruction(),
            &self.schema,
            self.max_document_chars,
        );
        debug!(mode = ?base.mode, "Request classified");
        if let Some(t) = &base.truncation {
            warn!("{}", t);
        }

        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut model_duration_ms = 0u64;
        let mut timeouts = 0u32;
        let mut attempt_started = Instant::now();
        let mut prompt_chars = 0usize;

        let mut state = State::Built {
            attempt: 1,
            prompt: base.text.clone(),
        };

        loop {
            state = match state {
                State::Built { attempt, prompt } => {
                    debug!("Attempt {}/{}: prompt built", attempt, self.max_attempts);
                    if let Some(ref cb) = self.progress {
                        cb.on_attempt_start(attempt, self.max_attempts);
                    }
                    attempt_started = Instant::now();
                    prompt_chars = prompt.chars().count();

                    let result =
                        tokio::time::timeout(self.call_timeout, self.runner.generate(&prompt, &self.params))
                            .await;
                    model_duration_ms += attempt_started.elapsed().as_millis() as u64;

                    match result {
                        Err(_) => State::Failed {
                            attempt,
                            failure: AttemptFailure::Timeout {
                                secs: self.call_timeout.as_secs(),
                            },
                        },
                        Ok(Err(RunnerError::Timeout { secs })) => State::Failed {
                            attempt,
                            failure: AttemptFailure::Timeout { secs },
                        },
                        Ok(Err(RunnerError::Unavailable(detail))) => {
                            warn!("Attempt {}: model unavailable: {}", attempt, detail);
                            return Err(InvoiceError::ModelUnavailable { detail });
                        }
                        Ok(Ok(raw)) => State::Invoked { attempt, raw },
                    }
                }

                State::Invoked { attempt, raw } => {
                    debug!("Attempt {}: {} chars of model output", attempt, raw.len());
                    match parse::extract_json(&raw) {
                        Ok(value) => State::Parsed {
                            attempt,
                            raw,
                            value,
                        },
                        Err(e) => State::Failed {
                            attempt,
                            failure: e.into(),
                        },
                    }
                }

                State::Parsed {
                    attempt,
                    raw,
                    value,
                } => match validate::validate(&value, &self.schema) {
                    Ok(record) => {
                        history.push(AttemptRecord {
                            attempt,
                            prompt_chars,
                            duration_ms: attempt_started.elapsed().as_millis() as u64,
                            failure: None,
                        });
                        info!(
                            "Record validated on attempt {}/{} ({} fields, {} extras)",
                            attempt,
                            self.max_attempts,
                            record.len(),
                            record.extras().len()
                        );
                        if let Some(ref cb) = self.progress {
                            cb.on_extraction_complete(attempt, record.len());
                        }
                        return Ok(PipelineRun {
                            record,
                            attempts: attempt,
                            history,
                            raw_output: raw,
                            truncation: base.truncation,
                            model_duration_ms,
                        });
                    }
                    Err(e) => State::Failed {
                        attempt,
                        failure: AttemptFailure::Invalid(e),
                    },
                },

                State::Failed { attempt, failure } => {
                    warn!(
                        "Attempt {}/{} rejected ({}): {}",
                        attempt,
                        self.max_attempts,
                        failure.kind(),
                        failure
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_attempt_failed(attempt, self.max_attempts, &failure.to_string());
                    }
                    history.push(AttemptRecord {
                        attempt,
                        prompt_chars,
                        duration_ms: attempt_started.elapsed().as_millis() as u64,
                        failure: Some(failure.clone()),
                    });

                    if attempt >= self.max_attempts {
                        return Err(InvoiceError::RetriesExhausted {
                            attempts: attempt,
                            last: failure,
                        });
                    }

                    if matches!(failure, AttemptFailure::Timeout { .. }) {
                        timeouts += 1;
                        let backoff = self
                            .retry_backoff_ms
                            .saturating_mul(2u64.saturating_pow(timeouts - 1));
                        if backoff > 0 {
                            debug!("Backing off {}ms after timeout", backoff);
                            tokio::time::sleep(Duration::from_millis(backoff)).await;
                        }
                    }

                    State::Built {
                        attempt: attempt + 1,
                        prompt: build_retry_prompt(&base, &failure),
                    }
                }
            };
        }
    }
}
