//! Configuration types for invoice extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is immutable once built and
//! cheap to clone: trait objects are shared behind `Arc`.

use crate::error::InvoiceError;
use crate::pipeline::llm::ModelRunner;
use crate::progress::ProgressCallback;
use crate::schema::Schema;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for an invoice extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_invoice2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .provider_name("ollama")
///     .model("llama3.2")
///     .max_attempts(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier, e.g. "llama3.2", "mistral".
    /// If None, uses [`crate::pipeline::llm::DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "ollama", "openai").
    /// If None, falls back to `EDGEQUAKE_LLM_PROVIDER`/`EDGEQUAKE_MODEL`, then Ollama.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model runner. Takes precedence over everything else.
    pub runner: Option<Arc<dyn ModelRunner>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction wants the most literal reading of the document; keep this low.
    pub temperature: f32,

    /// Maximum tokens the model may generate per attempt. Default: 1024.
    pub max_tokens: usize,

    /// Attempt budget, first attempt included. Default: 3. Minimum: 1.
    pub max_attempts: u32,

    /// Base back-off before an attempt that follows a timeout. Default: 500.
    ///
    /// Doubles after each timeout: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Document character budget in the prompt. Default: 12 000.
    pub max_document_chars: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Target record shape. Default: [`Schema::invoice_default`].
    pub schema: Schema,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            runner: None,
            temperature: 0.1,
            max_tokens: 1024,
            max_attempts: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 90,
            max_document_chars: 12_000,
            password: None,
            schema: Schema::invoice_default(),
            progress_callback: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("runner", &self.runner.as_ref().map(|r| r.name()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_document_chars", &self.max_document_chars)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("schema_fields", &self.schema.fields().len())
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ModelRunner>) -> Self {
        self.config.runner = Some(runner);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_document_chars(mut self, n: usize) -> Self {
        self.config.max_document_chars = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, InvoiceError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(InvoiceError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(InvoiceError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(InvoiceError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_document_chars < 100 {
            return Err(InvoiceError::InvalidConfig(format!(
                "max_document_chars must be ≥ 100, got {}",
                c.max_document_chars
            )));
        }
        Ok(self.config)
    }
}
