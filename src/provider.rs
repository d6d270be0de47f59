use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::ToolRef;
use crate::cli::Provider;
use crate::config::{Credentials, RuntimeConfig};
use crate::error::CrewError;
use crate::llm::{LlmBackend, OllamaBackend, OpenAiBackend};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3:instruct";

/// Which backend serves an agent, and which model on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn openai(model: impl Into<String>) -> Self {
        Self::new(Provider::Openai, model)
    }

    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new(Provider::Ollama, model)
    }

    pub fn provider_default(provider: Provider) -> Self {
        Self::new(provider, default_model(provider))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", provider_label(self.provider), self.model)
    }
}

pub fn provider_label(provider: Provider) -> &'static str {
    match provider {
        Provider::Openai => "openai",
        Provider::Ollama => "ollama",
    }
}

pub fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Openai => DEFAULT_OPENAI_MODEL,
        Provider::Ollama => DEFAULT_OLLAMA_MODEL,
    }
}

pub fn validate_model_for_provider(provider: Provider, model_name: &str) -> Result<(), CrewError> {
    let trimmed = model_name.trim();
    let is_valid = match provider {
        Provider::Openai => {
            trimmed.starts_with("gpt-")
                || trimmed.starts_with("chatgpt-")
                || trimmed.starts_with("o1")
                || trimmed.starts_with("o3")
                || trimmed.starts_with("o4")
        }
        Provider::Ollama => !trimmed.is_empty() && !trimmed.contains(char::is_whitespace),
    };

    if is_valid {
        return Ok(());
    }

    Err(CrewError::config(format!(
        "model '{}' is not compatible with provider '{}'",
        model_name,
        provider_label(provider)
    )))
}

/// Applies `--provider`/`--model` overrides to an agent's declared model.
///
/// A provider override without a model falls back to that provider's default
/// model; a model override alone keeps the agent's provider.
pub fn apply_model_override(declared: &ModelRef, cfg: &RuntimeConfig) -> ModelRef {
    match (cfg.provider, cfg.model.as_deref()) {
        (None, None) => declared.clone(),
        (None, Some(model)) => ModelRef::new(declared.provider, model),
        (Some(provider), Some(model)) => ModelRef::new(provider, model),
        (Some(provider), None) if provider == declared.provider => declared.clone(),
        (Some(provider), None) => ModelRef::provider_default(provider),
    }
}

/// Everything needed to decide whether a model or tool reference is usable.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub credentials: Credentials,
    pub openai_base_url: String,
    pub ollama_host: String,
    pub request_timeout: Duration,
}

impl ProviderSettings {
    pub fn new(cfg: &RuntimeConfig, credentials: Credentials) -> Self {
        Self {
            credentials,
            openai_base_url: cfg.openai_base_url.clone(),
            ollama_host: cfg.ollama_host.clone(),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
        }
    }

    /// Fails with `InvalidConfiguration` unless `model` resolves to a configured backend.
    pub fn check_model(&self, model: &ModelRef) -> Result<(), CrewError> {
        match model.provider {
            Provider::Openai => {
                if self.credentials.openai_api_key().is_none() {
                    return Err(CrewError::config(format!(
                        "OPENAI_API_KEY is required for model '{model}'"
                    )));
                }
                if self.openai_base_url.trim().is_empty() {
                    return Err(CrewError::config("OpenAI base URL cannot be empty"));
                }
                // compatible gateways host arbitrary model names
                if self.openai_base_url.trim_end_matches('/') == DEFAULT_OPENAI_BASE_URL {
                    validate_model_for_provider(model.provider, &model.model)?;
                } else if model.model.trim().is_empty() {
                    return Err(CrewError::config("model name cannot be empty"));
                }
            }
            Provider::Ollama => {
                if self.ollama_host.trim().is_empty() {
                    return Err(CrewError::config(format!(
                        "an Ollama host is required for model '{model}'"
                    )));
                }
                validate_model_for_provider(model.provider, &model.model)?;
            }
        }
        Ok(())
    }

    pub fn check_tool(&self, tool: ToolRef) -> Result<(), CrewError> {
        match tool.required_credential() {
            Some(var) if !self.credentials.is_set(var) => Err(CrewError::config(format!(
                "{var} is required for tool '{}'",
                tool.name()
            ))),
            _ => Ok(()),
        }
    }
}

/// Turns a model reference into a live backend.
pub trait BackendFactory: Send + Sync {
    fn build(&self, model: &ModelRef) -> Result<Arc<dyn LlmBackend>, CrewError>;
}

/// Builds reqwest-backed OpenAI and Ollama clients sharing one connection pool.
pub struct HttpBackendFactory {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl HttpBackendFactory {
    pub fn new(settings: ProviderSettings) -> Result<Self, CrewError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("crewline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CrewError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { settings, client })
    }
}

impl BackendFactory for HttpBackendFactory {
    fn build(&self, model: &ModelRef) -> Result<Arc<dyn LlmBackend>, CrewError> {
        self.settings.check_model(model)?;
        match model.provider {
            Provider::Openai => {
                let api_key = self
                    .settings
                    .credentials
                    .openai_api_key()
                    .ok_or_else(|| CrewError::config("OPENAI_API_KEY is required for OpenAI"))?;
                Ok(Arc::new(OpenAiBackend::new(
                    self.client.clone(),
                    api_key.to_string(),
                    model.model.clone(),
                    self.settings.openai_base_url.clone(),
                )))
            }
            Provider::Ollama => Ok(Arc::new(OllamaBackend::new(
                self.client.clone(),
                model.model.clone(),
                self.settings.ollama_host.clone(),
            ))),
        }
    }
}

/// Picks the provider the resolved configuration can actually serve. An
/// explicit ollama profile wins; otherwise an OpenAI key, then a configured
/// Ollama host.
pub fn detect_provider(cfg: &RuntimeConfig, credentials: &Credentials) -> Option<Provider> {
    let ollama_configured = !cfg.ollama_host.trim().is_empty();
    if cfg.provider == Some(Provider::Ollama) && ollama_configured {
        return Some(Provider::Ollama);
    }
    if credentials.openai_api_key().is_some() {
        return Some(Provider::Openai);
    }
    if ollama_configured && cfg.ollama_host.trim_end_matches('/') != DEFAULT_OLLAMA_HOST {
        return Some(Provider::Ollama);
    }
    None
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}
