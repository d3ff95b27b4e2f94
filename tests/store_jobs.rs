//! Integration tests for `Store` job operations against a real Postgres,
//! exercising the invariants that need `FOR UPDATE SKIP LOCKED` and the
//! unique partial index to actually be enforced.

mod common;

use chrono::Utc;
use common::TestHarness;
use gist_queue::models::{EnqueueStatus, JobOutcome, JobState};
use serde_json::json;
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn enqueue_is_idempotent_for_identical_payload(ctx: &TestHarness) {
    let payload = json!({ "b": 1, "a": "x" });

    let first = ctx
        .store
        .enqueue("file-1", payload.clone(), 1, 3)
        .await
        .unwrap();
    assert_eq!(first.status, EnqueueStatus::Enqueued);

    let second = ctx.store.enqueue("file-1", payload, 1, 3).await.unwrap();
    assert_eq!(second.status, EnqueueStatus::AlreadyQueued);
    assert_eq!(second.job_id, first.job_id);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE file_id = 'file-1'")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn enqueue_after_success_reports_already_completed_with_result(ctx: &TestHarness) {
    let payload = json!({ "content": "hello" });
    let enqueued = ctx
        .store
        .enqueue("file-2", payload.clone(), 1, 3)
        .await
        .unwrap();

    ctx.store
        .complete_job(enqueued.job_id, JobOutcome::Succeeded, Some("SUMMARY"), None)
        .await
        .unwrap();

    let resubmit = ctx.store.enqueue("file-2", payload, 1, 3).await.unwrap();
    assert_eq!(resubmit.status, EnqueueStatus::AlreadyCompleted);
    assert_eq!(resubmit.result.as_deref(), Some("SUMMARY"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn different_content_hash_is_not_deduped(ctx: &TestHarness) {
    let first = ctx
        .store
        .enqueue("file-3", json!({ "v": 1 }), 1, 3)
        .await
        .unwrap();
    let second = ctx
        .store
        .enqueue("file-3", json!({ "v": 2 }), 1, 3)
        .await
        .unwrap();

    assert_ne!(first.job_id, second.job_id);
    assert_eq!(second.status, EnqueueStatus::Enqueued);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_next_is_mutually_exclusive(ctx: &TestHarness) {
    let enqueued = ctx
        .store
        .enqueue("file-4", json!({ "content": "x" }), 1, 3)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let store = ctx.store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_next(&format!("worker-{i}")).await.unwrap()
        }));
    }

    let mut claimants = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            claimants += 1;
        }
    }

    assert_eq!(claimants, 1);

    let job = ctx.store.get_job(enqueued.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Processing);
    assert!(job.worker_id.is_some());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_next_honors_priority_then_created_at(ctx: &TestHarness) {
    let low = ctx
        .store
        .enqueue("file-low", json!({ "v": 1 }), 1, 3)
        .await
        .unwrap();
    let high = ctx
        .store
        .enqueue("file-high", json!({ "v": 1 }), 5, 3)
        .await
        .unwrap();

    let claimed = ctx.store.claim_next("worker-a").await.unwrap().unwrap();
    assert_eq!(claimed.id, high.job_id);

    let claimed_next = ctx.store.claim_next("worker-a").await.unwrap().unwrap();
    assert_eq!(claimed_next.id, low.job_id);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn job_goes_dead_after_max_attempts(ctx: &TestHarness) {
    let enqueued = ctx
        .store
        .enqueue("file-5", json!({ "content": "x" }), 1, 1)
        .await
        .unwrap();

    let attempt_no = ctx
        .store
        .increment_attempt(enqueued.job_id, None, None, false, Some("boom"))
        .await
        .unwrap();
    assert_eq!(attempt_no, 1);

    // attempts (1) == max_attempts (1): non-retryable from here.
    ctx.store
        .complete_job(enqueued.job_id, JobOutcome::Dead, None, Some("boom"))
        .await
        .unwrap();

    let job = ctx.store.get_job(enqueued.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn attempts_count_matches_job_attempt_rows(ctx: &TestHarness) {
    let enqueued = ctx
        .store
        .enqueue("file-6", json!({ "content": "x" }), 1, 5)
        .await
        .unwrap();

    for i in 1..=3 {
        let attempt_no = ctx
            .store
            .increment_attempt(enqueued.job_id, None, None, false, Some("retry"))
            .await
            .unwrap();
        assert_eq!(attempt_no, i);
    }

    let job = ctx.store.get_job(enqueued.job_id).await.unwrap().unwrap();
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_attempts WHERE job_id = $1")
        .bind(enqueued.job_id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();

    assert_eq!(job.attempts as i64, rows);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recover_stale_reclaims_expired_claims(ctx: &TestHarness) {
    let enqueued = ctx
        .store
        .enqueue("file-7", json!({ "content": "x" }), 1, 3)
        .await
        .unwrap();
    ctx.store.claim_next("worker-stale").await.unwrap();

    sqlx::query("UPDATE jobs SET locked_at = $1 WHERE id = $2")
        .bind(Utc::now() - chrono::Duration::minutes(20))
        .bind(enqueued.job_id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let recovered = ctx
        .store
        .recover_stale(chrono::Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    let job = ctx.store.get_job(enqueued.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.locked_at.is_none());
    assert!(job.worker_id.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recover_stale_is_idempotent_when_nothing_is_stale(ctx: &TestHarness) {
    ctx.store
        .enqueue("file-8", json!({ "content": "x" }), 1, 3)
        .await
        .unwrap();

    let first = ctx
        .store
        .recover_stale(chrono::Duration::minutes(10))
        .await
        .unwrap();
    let second = ctx
        .store
        .recover_stale(chrono::Duration::minutes(10))
        .await
        .unwrap();

    assert_eq!(first, 0);
    assert_eq!(second, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn queue_stats_reflects_state_counts(ctx: &TestHarness) {
    ctx.store
        .enqueue("file-9", json!({ "v": 1 }), 1, 3)
        .await
        .unwrap();
    let claimed = ctx
        .store
        .enqueue("file-10", json!({ "v": 1 }), 1, 3)
        .await
        .unwrap();
    ctx.store.claim_next("worker-a").await.unwrap();

    let stats = ctx.store.queue_stats().await.unwrap();
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.processing, 1);

    let _ = claimed;
}
