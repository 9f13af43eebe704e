//! Model provider access behind the [`ModelGateway`] seam.
//!
//! [`HttpGateway`] speaks the OpenAI, Anthropic and Gemini wire formats plus
//! OpenAI-compatible custom endpoints. Request building, reply extraction and
//! status mapping are plain functions so they can be tested without a network.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::error::ProviderError;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);
pub const TEMPERATURE: f64 = 0.7;
pub const MAX_TOKENS: u32 = 4096;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Gemini,
    Custom,
}

impl ProviderKind {
    /// Known names map to their provider; anything else is a custom endpoint.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" => Self::Openai,
            "anthropic" => Self::Anthropic,
            "gemini" => Self::Gemini,
            _ => Self::Custom,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Custom => "custom",
        }
    }

    /// Name used in operator-facing error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Openai => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
            Self::Custom => "Custom",
        }
    }

    pub fn default_model(self) -> Option<&'static str> {
        match self {
            Self::Openai => Some("gpt-4o"),
            Self::Anthropic => Some("claude-3-5-sonnet-20241022"),
            Self::Gemini => Some("gemini-1.5-pro-latest"),
            Self::Custom => None,
        }
    }

    /// For Gemini this is the models base URL; the model and method are appended per request.
    pub fn default_api_url(self) -> Option<&'static str> {
        match self {
            Self::Openai => Some(OPENAI_URL),
            Self::Anthropic => Some(ANTHROPIC_URL),
            Self::Gemini => Some(GEMINI_MODELS_URL),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Send one prompt, get the model's text back.
pub trait ModelGateway {
    fn send(&mut self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
}

/// Blocking HTTP client for a single provider. Keeps the conversation history
/// of successful exchanges.
pub struct HttpGateway {
    provider: ProviderKind,
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
    client: Client,
    history: Vec<ChatMessage>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let provider = config.provider;
        let Some(api_url) = config
            .api_url
            .or_else(|| provider.default_api_url().map(str::to_string))
        else {
            bail!("api_url must be provided for custom provider");
        };
        let Some(model) = config
            .model
            .or_else(|| provider.default_model().map(str::to_string))
        else {
            bail!("model must be provided for custom provider");
        };
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client for model provider")?;

        debug!(provider = %provider, model = %model, "model gateway ready");
        Ok(Self {
            provider,
            api_key: config.api_key,
            api_url,
            model,
            timeout: config.timeout,
            client,
            history: Vec::new(),
        })
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn reset_conversation(&mut self) {
        self.history.clear();
    }

    fn request_url(&self) -> String {
        match self.provider {
            ProviderKind::Gemini => gemini_url(&self.api_url, &self.model),
            _ => self.api_url.clone(),
        }
    }

    fn request_body(&self, prompt: &str, system: Option<&str>) -> Value {
        match self.provider {
            ProviderKind::Openai | ProviderKind::Custom => {
                build_openai_body(&self.model, &self.history, prompt, system)
            }
            ProviderKind::Anthropic => {
                build_anthropic_body(&self.model, &self.history, prompt, system)
            }
            ProviderKind::Gemini => build_gemini_body(&self.history, prompt, system),
        }
    }

    fn record_exchange(&mut self, prompt: &str, reply: &str) {
        self.history.push(ChatMessage::new(Role::User, prompt));
        self.history.push(ChatMessage::new(Role::Assistant, reply));
    }

    fn transport_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: self.provider.label().to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            ProviderError::Transport {
                provider: self.provider.label().to_string(),
                message: format!("failed to communicate: {err}"),
            }
        }
    }
}

impl ModelGateway for HttpGateway {
    #[instrument(skip_all, fields(provider = %self.provider, model = %self.model, prompt_chars = prompt.len()))]
    fn send(&mut self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError> {
        let body = self.request_body(prompt, system);
        let request = self.client.post(self.request_url()).json(&body);
        let request = match self.provider {
            ProviderKind::Openai | ProviderKind::Custom => request.bearer_auth(&self.api_key),
            ProviderKind::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::Gemini => request.header("x-goog-api-key", &self.api_key),
        };

        info!("waiting for model response");
        let response = request.send().map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let text = response.text().map_err(|e| self.transport_error(&e))?;
        if !status.is_success() {
            let err = classify_status(self.provider, status.as_u16(), &text);
            warn!(status = status.as_u16(), err = %err, "model request failed");
            return Err(err);
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
                provider: self.provider.label().to_string(),
                message: format!("invalid JSON: {e}"),
            })?;
        let reply =
            extract_reply(self.provider, &value).ok_or_else(|| ProviderError::MalformedResponse {
                provider: self.provider.label().to_string(),
                message: "no response text found".to_string(),
            })?;

        self.record_exchange(prompt, &reply);
        debug!(reply_chars = reply.len(), "model response received");
        Ok(reply)
    }
}

pub fn gemini_url(base: &str, model: &str) -> String {
    format!("{}/{model}:generateContent", base.trim_end_matches('/'))
}

/// OpenAI chat completions body. Custom endpoints use the same shape.
pub fn build_openai_body(
    model: &str,
    history: &[ChatMessage],
    prompt: &str,
    system: Option<&str>,
) -> Value {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = system {
        messages.push(ChatMessage::new(Role::System, system));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::new(Role::User, prompt));
    json!({
        "model": model,
        "messages": messages,
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
    })
}

pub fn build_anthropic_body(
    model: &str,
    history: &[ChatMessage],
    prompt: &str,
    system: Option<&str>,
) -> Value {
    let mut messages: Vec<ChatMessage> = history.to_vec();
    messages.push(ChatMessage::new(Role::User, prompt));
    let mut body = json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": messages,
    });
    if let Some(system) = system {
        body["system"] = Value::String(system.to_string());
    }
    body
}

/// Gemini has no system role; the instruction is prepended to the first user turn.
pub fn build_gemini_body(history: &[ChatMessage], prompt: &str, system: Option<&str>) -> Value {
    let first_text = match system {
        Some(system) if history.is_empty() => format!("{system}\n\n{prompt}"),
        _ => prompt.to_string(),
    };
    let mut contents: Vec<Value> = history
        .iter()
        .map(|message| {
            let role = if message.role == Role::User {
                "user"
            } else {
                "model"
            };
            json!({ "role": role, "parts": [{ "text": message.content }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": first_text }] }));
    json!({
        "contents": contents,
        "generationConfig": {
            "temperature": TEMPERATURE,
            "maxOutputTokens": MAX_TOKENS,
        },
    })
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pull the reply text out of a provider response body.
pub fn extract_reply(provider: ProviderKind, value: &Value) -> Option<String> {
    match provider {
        ProviderKind::Openai => text_at(value, "/choices/0/message/content"),
        ProviderKind::Anthropic => text_at(value, "/content/0/text"),
        ProviderKind::Gemini => text_at(value, "/candidates/0/content/parts/0/text"),
        ProviderKind::Custom => text_at(value, "/choices/0/message/content")
            .or_else(|| text_at(value, "/content/0/text")),
    }
}

/// Map a non-success HTTP status to a provider error.
pub fn classify_status(provider: ProviderKind, status: u16, body: &str) -> ProviderError {
    let name = provider.label().to_string();
    match status {
        401 => ProviderError::Auth { provider: name },
        403 if provider == ProviderKind::Gemini => ProviderError::Auth { provider: name },
        429 => ProviderError::RateLimit { provider: name },
        400 => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|value| text_at(&value, "/error/message"))
                .unwrap_or_else(|| body.to_string());
            ProviderError::Transport {
                provider: name,
                message,
            }
        }
        _ => ProviderError::Transport {
            provider: name,
            message: format!("({status}): {body}"),
        },
    }
}
