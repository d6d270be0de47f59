//! Local Ollama backend (`/api/chat`, non-streaming).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::CrewError;
use crate::llm::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmBackend, map_transport_error,
    status_error,
};

const BACKEND: &str = "ollama";

#[derive(Debug)]
pub struct OllamaBackend {
    client: Client,
    model: String,
    host: String,
}

impl OllamaBackend {
    pub fn new(client: Client, model: String, host: String) -> Self {
        Self {
            client,
            model,
            host: host.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

pub(crate) fn parse_chat(body: &str) -> Result<CompletionResponse, CrewError> {
    let response: OllamaResponse = serde_json::from_str(body)
        .map_err(|e| CrewError::backend(BACKEND, format!("malformed response: {e}")))?;
    let content = response
        .message
        .map(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CrewError::backend(BACKEND, "malformed response: empty message"))?;

    Ok(CompletionResponse {
        content,
        input_tokens: response.prompt_eval_count,
        output_tokens: response.eval_count,
    })
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CrewError> {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };
        let payload = OllamaRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error(BACKEND, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(BACKEND, e))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(status_error(BACKEND, status, detail));
        }

        parse_chat(&body)
    }
}
