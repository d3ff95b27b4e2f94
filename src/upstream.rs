//! The upstream AI provider call: `generate(modelName, prompt, maxTokens)
//! -> text | error`. Treated as an external collaborator -- implemented
//! here as a trait boundary plus a generic HTTP default so the crate runs
//! end-to-end without a live third party.
//!
//! Grounded on `openai-client`'s `OpenAIClient` shape (http client + api key
//! + base url) but generalized to any HTTP JSON provider instead of OpenAI
//! specifically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream error (status={status:?}): {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },
    #[error("upstream returned no parseable response")]
    Parse,
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Api { status, .. } => *status,
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            UpstreamError::Api { message, .. } => message.clone(),
            UpstreamError::Network(e) => e.to_string(),
            UpstreamError::Parse => "no parseable response".to_string(),
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn generate(
        &self,
        model_name: &str,
        prompt: &str,
        max_tokens: u32,
        credential: &str,
    ) -> Result<String, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Ok { text: String },
    Err { error: ApiError },
}

#[derive(Debug, Deserialize)]
struct ApiError {
    status: Option<u16>,
    message: String,
}

/// Generic HTTP JSON adapter: posts `{model, prompt, max_tokens}` to
/// `base_url` with a bearer credential, expects `{text}` or `{error}` back.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn generate(
        &self,
        model_name: &str,
        prompt: &str,
        max_tokens: u32,
        credential: &str,
    ) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(credential)
            .timeout(Duration::from_secs(30))
            .json(&GenerateRequest {
                model: model_name,
                prompt,
                max_tokens,
            })
            .send()
            .await?;

        let status = response.status();
        let body: GenerateResponse = response.json().await.map_err(|_| UpstreamError::Parse)?;

        match body {
            GenerateResponse::Ok { text } => Ok(text),
            GenerateResponse::Err { error } => Err(UpstreamError::Api {
                status: error.status.or(Some(status.as_u16())),
                message: error.message,
            }),
        }
    }
}
