//! OpenAI-compatible chat completion port.
//!
//! Works against Ollama's `/v1` surface, OpenAI itself, and any local server
//! speaking the same protocol.

use crate::error::{TemperError, TransportFailure};
use crate::provider::{GenerationPort, ProviderSettings, RawOutput};
use crate::request::Request;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

fn build_http_client(timeout: Duration) -> Result<Client, TemperError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| TemperError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// Classifies a non-success HTTP status.
pub fn classify_status(status: u16, body: &str) -> TransportFailure {
    let detail = format!("status {}: {}", status, body);
    match status {
        429 => TransportFailure::RateLimited(detail),
        408 | 504 => TransportFailure::Timeout(detail),
        500..=599 => TransportFailure::Unavailable(detail),
        _ => TransportFailure::Malformed(detail),
    }
}

fn map_http_error(error: reqwest::Error) -> TransportFailure {
    if let Some(status) = error.status() {
        classify_status(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        TransportFailure::Timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        TransportFailure::Unavailable(format!("Connection error: {}", error))
    } else if error.is_builder() {
        TransportFailure::Malformed(format!("Invalid request: {}", error))
    } else {
        TransportFailure::Unavailable(format!("HTTP error: {}", error))
    }
}

pub struct ChatPort {
    client: Client,
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatPort {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, TemperError> {
        let base_url = settings.resolved_endpoint().ok_or_else(|| {
            TemperError::ProviderError(format!(
                "Provider kind '{}' requires an endpoint",
                settings.kind
            ))
        })?;
        Ok(Self {
            client: build_http_client(Duration::from_secs(settings.timeout_secs))?,
            name: settings.kind.as_str().to_string(),
            model: settings.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn system_message(request: &Request) -> String {
        format!(
            "{}\n\nRespond with a single JSON object (contract '{}') containing these fields:\n{}",
            request.instructions,
            request.contract_name(),
            request.contract.describe()
        )
    }

    fn user_message(request: &Request) -> String {
        serde_json::to_string_pretty(&request.context).unwrap_or_else(|_| "{}".to_string())
    }
}

#[async_trait]
impl GenerationPort for ChatPort {
    async fn submit(&self, request: &Request) -> Result<RawOutput, TransportFailure> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_message(request),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::user_message(request),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            port = %self.name,
            model = %self.model,
            contract = request.contract_name(),
            attempt = request.attempt,
            "Submitting chat completion"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &error_text));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            TransportFailure::Malformed(format!("Failed to parse response: {}", e))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| RawOutput::Text(choice.message.content))
            .ok_or_else(|| TransportFailure::Malformed("No choices in response".to_string()))
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
