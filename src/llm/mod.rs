//! Chat-completion backends.
//!
//! A crew never talks HTTP directly: every agent's [`ModelRef`](crate::provider::ModelRef)
//! resolves to an [`LlmBackend`] through a [`BackendFactory`](crate::provider::BackendFactory).
//! Two implementations ship: a hosted OpenAI-compatible API and a local Ollama server.

pub(crate) mod ollama;
pub(crate) mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CrewError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A model endpoint that turns a chat transcript into one reply.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short backend label used in logs and errors ("openai", "ollama").
    fn backend_name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CrewError>;
}

/// Maps a transport error to a backend failure. Timeouts and connection
/// errors are worth retrying; everything else is not.
pub(crate) fn map_transport_error(backend: &str, err: reqwest::Error) -> CrewError {
    if err.is_timeout() || err.is_connect() {
        CrewError::transient_backend(backend, err.to_string())
    } else if err.is_decode() {
        CrewError::backend(backend, format!("malformed response: {err}"))
    } else {
        CrewError::backend(backend, err.to_string())
    }
}

/// Maps a non-success HTTP status to a backend failure. 429 and 5xx retry.
pub(crate) fn status_error(backend: &str, status: reqwest::StatusCode, detail: String) -> CrewError {
    let reason = format!("HTTP {}: {}", status.as_u16(), detail);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CrewError::transient_backend(backend, reason)
    } else {
        CrewError::backend(backend, reason)
    }
}
