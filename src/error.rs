//! Error taxonomy.
//!
//! Store errors are typed (`thiserror`) because callers branch on them
//! (a unique-violation during `enqueue` is recovered, not propagated).
//! Orchestration-level code above the store boundary uses `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown provider_id: {0}")]
    UnknownProvider(String),

    #[error("job {0} not found")]
    JobNotFound(uuid::Uuid),
}

/// Error classes an upstream failure is bucketed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Quota,
    Auth,
    Transient,
    InputInvalid,
    Empty,
    Other,
}

impl ErrorClass {
    /// Backoff applied to the whole provider after a failure of this class.
    /// `None` means no provider-wide backoff is set.
    pub fn backoff_minutes(&self) -> Option<i64> {
        match self {
            ErrorClass::Quota => Some(60),
            ErrorClass::Auth => Some(240),
            ErrorClass::Transient => Some(15),
            ErrorClass::InputInvalid | ErrorClass::Empty | ErrorClass::Other => None,
        }
    }

    /// Whether this class is fatal to the whole job rather than just this
    /// candidate (only `InputInvalid` is job-fatal).
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, ErrorClass::InputInvalid)
    }

    /// Classify an upstream failure by status code and message, case-insensitive
    /// substring matching.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("quota") || lower.contains("rate limit") || status == Some(429) {
            return ErrorClass::Quota;
        }
        if lower.contains("auth")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || matches!(status, Some(401) | Some(403))
        {
            return ErrorClass::Auth;
        }
        if lower.contains("service unavailable")
            || matches!(status, Some(500) | Some(502) | Some(503) | Some(504))
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            return ErrorClass::Transient;
        }
        if lower.contains("malformed") || lower.contains("invalid prompt") || lower.contains("invalid request") {
            return ErrorClass::InputInvalid;
        }
        ErrorClass::Other
    }
}

/// Job-level failure kinds, the subset that drives retry decisions.
#[derive(Debug, Clone, Error)]
pub enum JobFailure {
    #[error("no active models available")]
    NoCandidates,
    #[error("all candidates failed: {0}")]
    AllCandidatesFailed(String),
    #[error("upstream rejected input: {0}")]
    InputInvalid(String),
    #[error("extractor produced no content")]
    NoExtractableContent,
    #[error("callback delivery failed: {0}")]
    CallbackFailed(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl JobFailure {
    /// Retryable classes re-enqueue while attempts remain; non-retryable
    /// classes go straight to `dead`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobFailure::NoCandidates
                | JobFailure::AllCandidatesFailed(_)
                | JobFailure::CallbackFailed(_)
        )
    }
}
