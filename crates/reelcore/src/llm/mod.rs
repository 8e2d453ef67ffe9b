//! Chat-completion client (GigaChat, OpenAI-compatible request shape).

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::oauth::{TokenError, TokenProvider};

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("chat API returned no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

/// One completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Anything that turns a conversation into one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// GigaChat `/chat/completions` with a bearer token from a [`TokenProvider`].
pub struct GigaChatClient {
    http: reqwest::Client,
    url: String,
    model: String,
    tokens: Arc<TokenProvider>,
}

impl GigaChatClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>, model: impl Into<String>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            url: url.into(),
            model: model.into(),
            tokens,
        }
    }

    /// Client on `GIGACHAT_API_URL` with `GIGACHAT_MODEL`.
    pub fn from_env(http: reqwest::Client, tokens: Arc<TokenProvider>) -> Self {
        Self::new(
            http,
            config::sber::GIGACHAT_URL.as_str(),
            config::sber::GIGACHAT_MODEL.as_str(),
            tokens,
        )
    }
}

#[async_trait]
impl ChatModel for GigaChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let token = self.tokens.get_token()?;
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        log::info!("Sending request to GigaChat ({} messages)", request.messages.len());
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("GigaChat API error {}: {}", status, body);
            return Err(LlmError::Status { status, body });
        }

        let data: CompletionResponse = response.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        log::debug!("Raw GigaChat response: {}", content);
        Ok(content)
    }
}
