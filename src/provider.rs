//! Generation Port Abstraction
//!
//! The single boundary through which the orchestration core reaches a model.
//! A port submits one request and classifies failures; it never retries and
//! never validates. Retry and contract enforcement live in the invoker.

use crate::error::{TemperError, TransportFailure};
use crate::request::Request;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod chat;
pub mod scripted;

pub use chat::ChatPort;
pub use scripted::ScriptedPort;

/// Unvalidated output returned by a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum RawOutput {
    Structured(Value),
    Text(String),
}

impl RawOutput {
    pub fn text(text: impl Into<String>) -> Self {
        RawOutput::Text(text.into())
    }
}

impl From<Value> for RawOutput {
    fn from(value: Value) -> Self {
        RawOutput::Structured(value)
    }
}

/// External generation endpoint.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    async fn submit(&self, request: &Request) -> Result<RawOutput, TransportFailure>;

    fn port_name(&self) -> &str;
}

/// Supported endpoint families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    Local,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Local => "local",
        }
    }

    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => Some("http://localhost:11434/v1"),
            ProviderKind::OpenAI => Some("https://api.openai.com/v1"),
            ProviderKind::Local => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Provider section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_kind")]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL up to and including `/v1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_kind() -> ProviderKind {
    ProviderKind::Ollama
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ProviderSettings {
    /// Endpoint to use, falling back to the kind's default.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint
            .clone()
            .or_else(|| self.kind.default_endpoint().map(str::to_string))
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.model.trim().is_empty() {
            errors.push("Model name cannot be empty".to_string());
        }

        match self.resolved_endpoint() {
            None => errors.push(format!(
                "Provider kind '{}' requires an endpoint",
                self.kind
            )),
            Some(endpoint) => {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    errors.push(format!(
                        "Endpoint must start with http:// or https://, got '{}'",
                        endpoint
                    ));
                }
            }
        }

        if self.kind == ProviderKind::OpenAI
            && self.api_key.as_deref().map(str::is_empty).unwrap_or(true)
        {
            errors.push("Provider kind 'openai' requires an api_key".to_string());
        }

        if self.timeout_secs == 0 {
            errors.push("timeout_secs must be greater than 0".to_string());
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    temperature
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Provider factory for creating generation ports.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_port(settings: &ProviderSettings) -> Result<Arc<dyn GenerationPort>, TemperError> {
        settings
            .validate()
            .map_err(|errors| TemperError::ProviderError(errors.join("; ")))?;
        Ok(Arc::new(ChatPort::from_settings(settings)?))
    }
}
