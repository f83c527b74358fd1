//! LLM integration for email classification.
//!
//! Supports:
//! - **OpenAI**: default, via rig-core
//! - **Anthropic**: via rig-core
//!
//! Both backends are wrapped in a `RigClassifier` carrying the
//! classification preamble.

pub mod classifier;

pub use classifier::{CLASSIFY_PREAMBLE, Classifier, RigClassifier};

use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-3.5-turbo",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "JOBQUEUE_LLM_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected openai or anthropic)"),
            }),
        }
    }
}

/// Configuration for creating a classifier.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Read `JOBQUEUE_LLM_BACKEND` (default `openai`), the backend's API key
    /// and `JOBQUEUE_MODEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("JOBQUEUE_LLM_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => LlmBackend::OpenAi,
        };
        let api_key = std::env::var(backend.key_var())
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.key_var().into()))?;
        let model = std::env::var("JOBQUEUE_MODEL")
            .unwrap_or_else(|_| backend.default_model().to_string());

        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model,
        })
    }
}

/// Create a classifier from configuration.
pub fn create_classifier(config: &LlmConfig) -> Result<Arc<dyn Classifier>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_classifier(config),
        LlmBackend::OpenAi => create_openai_classifier(config),
    }
}

fn create_anthropic_classifier(config: &LlmConfig) -> Result<Arc<dyn Classifier>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    let agent = client
        .agent(config.model.as_str())
        .preamble(CLASSIFY_PREAMBLE)
        .temperature(0.0)
        .max_tokens(64)
        .build();
    tracing::info!(model = %config.model, "Using Anthropic classifier");
    Ok(Arc::new(RigClassifier::new(agent, "anthropic", &config.model)))
}

fn create_openai_classifier(config: &LlmConfig) -> Result<Arc<dyn Classifier>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let agent = client
        .agent(config.model.as_str())
        .preamble(CLASSIFY_PREAMBLE)
        .temperature(0.0)
        .build();
    tracing::info!(model = %config.model, "Using OpenAI classifier");
    Ok(Arc::new(RigClassifier::new(agent, "openai", &config.model)))
}
