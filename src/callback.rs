//! Signed egress callback.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback secret is empty or default -- refusing to sign")]
    MisconfiguredSecret,
    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("callback returned non-2xx status: {0}")]
    NonSuccess(u16),
}

#[derive(Debug, Clone)]
pub struct CallbackConfig {
    pub url: String,
    pub secret: String,
}

impl CallbackConfig {
    /// A default/empty secret is a fatal misconfiguration.
    pub fn validate(&self) -> Result<(), CallbackError> {
        if self.secret.is_empty() || self.secret == "default" {
            return Err(CallbackError::MisconfiguredSecret);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackMetadata {
    #[serde(rename = "contentBlocks")]
    pub content_blocks: u32,
    #[serde(rename = "totalWords")]
    pub total_words: u32,
    #[serde(rename = "mainContentWords")]
    pub main_content_words: u32,
    #[serde(rename = "processingTimeMs")]
    pub processing_time_ms: f64,
    #[serde(rename = "processedAt")]
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackBody {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub summary: String,
    pub metadata: CallbackMetadata,
}

/// `hex_hmac = HMAC_SHA256(secret, timestamp_ms + "." + body)`.
fn sign(secret: &str, timestamp_ms: i64, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(format!("{timestamp_ms}.{body}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the `x-internal-auth` header value for a given body and timestamp.
pub fn auth_header(secret: &str, timestamp_ms: i64, body: &str) -> String {
    format!("{timestamp_ms}.{}", sign(secret, timestamp_ms, body))
}

pub async fn post_callback(
    client: &reqwest::Client,
    config: &CallbackConfig,
    body: &CallbackBody,
    now_ms: i64,
) -> Result<(), CallbackError> {
    config.validate()?;

    let payload = serde_json::to_string(body).expect("CallbackBody always serializes");
    let header = auth_header(&config.secret, now_ms, &payload);

    let response = client
        .post(&config.url)
        .header("x-internal-auth", header)
        .header("content-type", "application/json")
        .timeout(CALLBACK_TIMEOUT)
        .body(payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(CallbackError::NonSuccess(response.status().as_u16()));
    }

    Ok(())
}
