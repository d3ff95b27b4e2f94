//! Entity types persisted by the [`crate::store::Store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Dead,
}

impl JobState {
    /// Non-terminal states participate in the dedupe invariant (D1).
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rate_period", rename_all = "snake_case")]
pub enum Period {
    Minute,
    Day,
}

impl Period {
    pub fn window_seconds(&self) -> i64 {
        match self {
            Period::Minute => 60,
            Period::Day => 86_400,
        }
    }

    /// Floor `now` to this period's window boundary, in UTC.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.window_seconds();
        let floored = (now.timestamp() / secs) * secs;
        DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(now)
    }
}

/// The outcome of a dispatch cycle, as recorded by `completeJob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Queued,
    Failed,
    Dead,
}

impl JobOutcome {
    pub(crate) fn target_state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Queued => JobState::Queued,
            JobOutcome::Failed => JobState::Failed,
            JobOutcome::Dead => JobState::Dead,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Provider {
    pub id: String,
    pub name: String,
    /// Secret credential. Never logged; see [`crate::config`] for how it's sourced.
    pub credential: String,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Model {
    pub id: String,
    pub provider_id: String,
    pub model_name: String,
    pub per_minute_limit: i32,
    pub per_day_limit: i32,
    pub enabled: bool,
}

/// A model joined with the provider fields the [`crate::router::Router`] needs
/// to dispatch without a second round trip.
#[derive(Debug, Clone, FromRow)]
pub struct ActiveModel {
    pub id: String,
    pub provider_id: String,
    pub model_name: String,
    pub per_minute_limit: i32,
    pub per_day_limit: i32,
    pub provider_name: String,
    pub provider_credential: String,
    pub provider_priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub file_id: String,
    pub dedupe_key: String,
    pub content_hash: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobAttempt {
    pub id: i64,
    pub job_id: Uuid,
    pub attempt_no: i32,
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateCounter {
    pub model_id: String,
    pub period: Period,
    pub window_start: DateTime<Utc>,
    pub used_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderBackoff {
    pub provider_id: String,
    pub until: DateTime<Utc>,
    pub reason: String,
}

/// Status of `Store::enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueStatus {
    Enqueued,
    AlreadyQueued,
    AlreadyCompleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResult {
    pub job_id: Uuid,
    pub status: EnqueueStatus,
    /// Populated only when `status == AlreadyCompleted`.
    pub result: Option<String>,
}

/// Per-state job counts, as returned by `Store::queue_stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub processing: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub dead: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_window_start_floors_to_the_minute() {
        let now = DateTime::parse_from_rfc3339("2026-07-30T12:34:56Z")
            .unwrap()
            .with_timezone(&Utc);
        let expected = DateTime::parse_from_rfc3339("2026-07-30T12:34:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Period::Minute.window_start(now), expected);
    }

    #[test]
    fn day_window_start_floors_to_midnight_utc() {
        let now = DateTime::parse_from_rfc3339("2026-07-30T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc);
        let expected = DateTime::parse_from_rfc3339("2026-07-30T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Period::Day.window_start(now), expected);
    }

    #[test]
    fn day_window_advances_across_midnight() {
        let before = DateTime::parse_from_rfc3339("2026-07-30T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc);
        let after = DateTime::parse_from_rfc3339("2026-07-31T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_ne!(Period::Day.window_start(before), Period::Day.window_start(after));
    }

    #[test]
    fn queued_and_processing_are_active_states() {
        assert!(JobState::Queued.is_active());
        assert!(JobState::Processing.is_active());
        assert!(!JobState::Succeeded.is_active());
        assert!(!JobState::Failed.is_active());
        assert!(!JobState::Dead.is_active());
    }

    #[test]
    fn job_outcome_maps_to_expected_state() {
        assert_eq!(JobOutcome::Succeeded.target_state(), JobState::Succeeded);
        assert_eq!(JobOutcome::Queued.target_state(), JobState::Queued);
        assert_eq!(JobOutcome::Failed.target_state(), JobState::Failed);
        assert_eq!(JobOutcome::Dead.target_state(), JobState::Dead);
    }
}
