//! Model runner: the seam between the orchestrator and a language model.
//!
//! The orchestrator only ever sees [`ModelRunner`], so tests drive it with
//! scripted stubs and production wires in [`LlmRunner`], a thin adapter over
//! an `edgequake_llm` provider. All prompt text is built in
//! [`crate::prompts`]; nothing here alters it.
//!
//! Timeouts are enforced by the orchestrator (`tokio::time::timeout` around
//! each call). A runner may still report [`RunnerError::Timeout`] when the
//! backend itself gives up first; both count as a retryable attempt.

use crate::config::ExtractionConfig;
use crate::error::InvoiceError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Provider used when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "ollama";

/// Model used with [`DEFAULT_PROVIDER`] or a named provider without a model.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Sampling parameters for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.1,
        }
    }
}

impl From<&ExtractionConfig> for GenerationParams {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Why a single generation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The backend is down, misconfigured or refused the request.
    #[error("{0}")]
    Unavailable(String),

    /// The backend gave up before answering.
    #[error("generation timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Anything that turns a prompt into raw model text.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, RunnerError>;

    /// Short label for logs and reports.
    fn name(&self) -> String {
        "model".to_string()
    }
}

/// [`ModelRunner`] backed by an `edgequake_llm` provider.
pub struct LlmRunner {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout_secs: u64,
}

impl LlmRunner {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout_secs: 0,
        }
    }

    /// Seconds reported in [`RunnerError::Timeout`] when the provider times out.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl ModelRunner for LlmRunner {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, RunnerError> {
        let messages = vec![ChatMessage::user(prompt)];
        let options = CompletionOptions {
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.label, response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
            Err(e) => Err(classify_provider_error(&e.to_string(), self.timeout_secs)),
        }
    }

    fn name(&self) -> String {
        self.label.clone()
    }
}

/// Map a provider error message onto a [`RunnerError`].
fn classify_provider_error(message: &str, timeout_secs: u64) -> RunnerError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        RunnerError::Timeout { secs: timeout_secs }
    } else {
        RunnerError::Unavailable(message.to_string())
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the model runner, from most-specific to least-specific.
///
/// 1. **Pre-built runner** (`config.runner`), used as-is.
/// 2. **Pre-built provider** (`config.provider`), wrapped in an [`LlmRunner`].
/// 3. **Named provider** (`config.provider_name`) with `config.model`, or
///    [`DEFAULT_MODEL`] when no model is set.
/// 4. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when
///    both are non-empty.
/// 5. **Local default**: [`DEFAULT_PROVIDER`] with `config.model` or
///    [`DEFAULT_MODEL`].
pub fn resolve_runner(config: &ExtractionConfig) -> Result<Arc<dyn ModelRunner>, InvoiceError> {
    if let Some(ref runner) = config.runner {
        return Ok(Arc::clone(runner));
    }

    let timeout = config.api_timeout_secs;

    if let Some(ref provider) = config.provider {
        let label = config.model.clone().unwrap_or_else(|| "custom provider".into());
        return Ok(Arc::new(
            LlmRunner::new(Arc::clone(provider), label).with_timeout_secs(timeout),
        ));
    }

    let (provider_name, model) = match config.provider_name {
        Some(ref name) => (
            name.clone(),
            config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        ),
        None => match (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            (Ok(p), Ok(m)) if !p.is_empty() && !m.is_empty() => (p, m),
            _ => (
                DEFAULT_PROVIDER.to_string(),
                config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ),
        },
    };

    info!("Using provider '{}' with model '{}'", provider_name, model);
    let provider = create_provider(&provider_name, &model)?;
    Ok(Arc::new(
        LlmRunner::new(provider, format!("{provider_name}/{model}")).with_timeout_secs(timeout),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_follow_config() {
        let config = ExtractionConfig::builder()
            .max_tokens(256)
            .temperature(0.0)
            .build()
            .unwrap();
        let params = GenerationParams::from(&config);
        assert_eq!(params.max_tokens, 256);
        assert_eq!(params.temperature, 0.0);
        assert_eq!(GenerationParams::default().max_tokens, 1024);
    }

    #[test]
    fn classifies_timeouts() {
        assert_eq!(
            classify_provider_error("request Timed Out", 90),
            RunnerError::Timeout { secs: 90 }
        );
        assert_eq!(
            classify_provider_error("connection refused", 90),
            RunnerError::Unavailable("connection refused".into())
        );
    }

    struct Echo;

    #[async_trait]
    impl ModelRunner for Echo {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, RunnerError> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn prebuilt_runner_wins() {
        let runner: Arc<dyn ModelRunner> = Arc::new(Echo);
        let config = ExtractionConfig::builder()
            .runner(Arc::clone(&runner))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let resolved = resolve_runner(&config).unwrap();
        let out = resolved
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(out, "hi");
        assert_eq!(resolved.name(), "model");
    }
}
