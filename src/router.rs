//! Candidate walk, quota gating, and error classification.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::error::ErrorClass;
use crate::models::{ActiveModel, Period};
use crate::store::Store;
use crate::upstream::Upstream;

const PROMPT_PREAMBLE: &str =
    "Summarize the following content concisely, preserving key facts and figures.\n\n";

#[derive(Debug, Error)]
pub enum RouterFailure {
    #[error("no active models available")]
    NoCandidates,
    #[error("all candidates failed: {0}")]
    AllCandidatesFailed(String),
    #[error("upstream rejected input: {0}")]
    InputInvalid(String),
}

pub struct Router {
    store: Arc<Store>,
    upstream: Arc<dyn Upstream>,
}

impl Router {
    pub fn new(store: Arc<Store>, upstream: Arc<dyn Upstream>) -> Self {
        Self { store, upstream }
    }

    /// One public operation: walk candidates in priority order, gate each
    /// through the rate limiter, invoke upstream, classify failures, and
    /// record attempts. No parallelism across candidates.
    pub async fn dispatch(
        &self,
        job_id: uuid::Uuid,
        content: &str,
        max_tokens: u32,
    ) -> Result<String, RouterFailure> {
        let candidates = self
            .store
            .list_active_models()
            .await
            .map_err(|e| RouterFailure::AllCandidatesFailed(e.to_string()))?;

        if candidates.is_empty() {
            return Err(RouterFailure::NoCandidates);
        }

        let prompt = format!("{PROMPT_PREAMBLE}{content}");
        let mut last_error = String::new();

        for candidate in &candidates {
            match self.try_candidate(job_id, candidate, &prompt, max_tokens).await {
                CandidateOutcome::Success(text) => return Ok(text),
                CandidateOutcome::JobFatal(message) => {
                    return Err(RouterFailure::InputInvalid(message))
                }
                CandidateOutcome::Skip(reason) => {
                    last_error = reason;
                    continue;
                }
            }
        }

        Err(RouterFailure::AllCandidatesFailed(last_error))
    }

    async fn try_candidate(
        &self,
        job_id: uuid::Uuid,
        candidate: &ActiveModel,
        prompt: &str,
        max_tokens: u32,
    ) -> CandidateOutcome {
        for period in [Period::Minute, Period::Day] {
            match self.store.try_consume(&candidate.id, period).await {
                Ok(consume) if consume.allowed => {}
                Ok(_) => {
                    return CandidateOutcome::Skip(format!(
                        "{} rate-limited ({:?})",
                        candidate.id, period
                    ))
                }
                Err(e) => return CandidateOutcome::Skip(e.to_string()),
            }
        }

        let generated = self
            .upstream
            .generate(
                &candidate.model_name,
                prompt,
                max_tokens,
                &candidate.provider_credential,
            )
            .await;

        match generated {
            Ok(text) if !text.trim().is_empty() => {
                if let Err(e) = self
                    .store
                    .increment_attempt(
                        job_id,
                        Some(&candidate.provider_id),
                        Some(&candidate.id),
                        true,
                        None,
                    )
                    .await
                {
                    warn!(error = %e, "failed to record successful attempt");
                }
                info!(model_id = %candidate.id, "dispatch succeeded");
                CandidateOutcome::Success(text.trim().to_string())
            }
            Ok(_) => {
                self.record_failure(job_id, candidate, "empty response").await;
                CandidateOutcome::Skip(format!("{} returned empty text", candidate.id))
            }
            Err(e) => {
                let message = e.message();
                self.record_failure(job_id, candidate, &message).await;

                let class = ErrorClass::classify(e.status(), &message);
                if let Some(minutes) = class.backoff_minutes() {
                    let until = chrono::Utc::now() + chrono::Duration::minutes(minutes);
                    if let Err(store_err) = self
                        .store
                        .set_backoff(&candidate.provider_id, until, &format!("{class:?}"))
                        .await
                    {
                        warn!(error = %store_err, "failed to record provider backoff");
                    }
                }

                if class.is_job_fatal() {
                    CandidateOutcome::JobFatal(message)
                } else {
                    CandidateOutcome::Skip(message)
                }
            }
        }
    }

    async fn record_failure(&self, job_id: uuid::Uuid, candidate: &ActiveModel, message: &str) {
        if let Err(e) = self
            .store
            .increment_attempt(
                job_id,
                Some(&candidate.provider_id),
                Some(&candidate.id),
                false,
                Some(message),
            )
            .await
        {
            warn!(error = %e, "failed to record failed attempt");
        }
    }
}

enum CandidateOutcome {
    Success(String),
    /// Non-fatal to the job; the Router continues to the next candidate.
    Skip(String),
    /// Fatal to the job (`InputInvalid`); the Router stops immediately.
    JobFatal(String),
}
