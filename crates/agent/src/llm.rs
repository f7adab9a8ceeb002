//! Pluggable language-model clients. The HTTP client speaks the OpenAI,
//! Anthropic, and Ollama wire shapes; `NoopLlmClient` stands in when no
//! provider is configured so callers can fall back deterministically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use tenderflow_core::config::{LlmConfig, LlmProvider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm client is disabled")]
    Disabled,
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm protocol violation: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Client used when the provider is `disabled`. Every call reports
/// [`LlmError::Disabled`] so stages can switch to their deterministic path.
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.provider == LlmProvider::Disabled {
            return Err(LlmError::Disabled);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_owned());

        Ok(Self {
            client,
            provider: config.provider,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn try_complete(&self, url: &str, body: &Value) -> Result<String, LlmError> {
        let mut request = self.client.post(url).json(body);
        match self.provider {
            LlmProvider::OpenAi => {
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key.expose_secret());
                }
            }
            LlmProvider::Anthropic => {
                request = request.header("anthropic-version", "2023-06-01");
                if let Some(key) = &self.api_key {
                    request = request.header("x-api-key", key.expose_secret());
                }
            }
            LlmProvider::Ollama => {}
            LlmProvider::Disabled => return Err(LlmError::Disabled),
        }

        let response =
            request.send().await.map_err(|err| LlmError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Protocol(format!("provider returned status {status}")));
        }

        let payload: Value =
            response.json().await.map_err(|err| LlmError::Protocol(err.to_string()))?;
        extract_completion(self.provider, &payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let (url, body) = request_parts(self.provider, &self.base_url, &self.model, prompt)?;

        let mut last_error = LlmError::Transport("no request attempts were made".to_owned());
        for attempt in 0..=self.max_retries {
            match self.try_complete(&url, &body).await {
                Ok(text) => return Ok(text),
                Err(err @ LlmError::Transport(_)) => {
                    tracing::warn!(attempt, error = %err, "llm request failed");
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }
}

/// Build the runtime's client from configuration. The disabled provider maps
/// to the no-op client rather than an error.
pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.provider {
        LlmProvider::Disabled => Ok(Arc::new(NoopLlmClient)),
        _ => Ok(Arc::new(HttpLlmClient::from_config(config)?)),
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama | LlmProvider::Disabled => "http://localhost:11434",
    }
}

fn request_parts(
    provider: LlmProvider,
    base_url: &str,
    model: &str,
    prompt: &str,
) -> Result<(String, Value), LlmError> {
    let base = base_url.trim_end_matches('/');
    match provider {
        LlmProvider::OpenAi => Ok((
            format!("{base}/v1/chat/completions"),
            json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0,
            }),
        )),
        LlmProvider::Anthropic => Ok((
            format!("{base}/v1/messages"),
            json!({
                "model": model,
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": prompt}],
            }),
        )),
        LlmProvider::Ollama => Ok((
            format!("{base}/api/generate"),
            json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
            }),
        )),
        LlmProvider::Disabled => Err(LlmError::Disabled),
    }
}

fn extract_completion(provider: LlmProvider, payload: &Value) -> Result<String, LlmError> {
    let text = match provider {
        LlmProvider::OpenAi => payload["choices"][0]["message"]["content"].as_str(),
        LlmProvider::Anthropic => payload["content"][0]["text"].as_str(),
        LlmProvider::Ollama => payload["response"].as_str(),
        LlmProvider::Disabled => return Err(LlmError::Disabled),
    };

    text.map(str::to_owned)
        .ok_or_else(|| LlmError::Protocol("response payload carries no completion text".to_owned()))
}
