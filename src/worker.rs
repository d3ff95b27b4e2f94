//! Single-flight claim -> extract -> route -> report loop.
//!
//! A concurrency-capped poll loop: each claimed job is processed on its
//! own spawned task, and shutdown drains in-flight work before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::callback::{post_callback, CallbackBody, CallbackConfig, CallbackMetadata};
use crate::content::{estimate_max_tokens, ContentExtractor};
use crate::error::JobFailure;
use crate::models::{Job, JobOutcome};
use crate::router::{Router, RouterFailure};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub housekeeping_interval: Duration,
    pub stale_timeout: chrono::Duration,
}

impl WorkerConfig {
    /// `host-pid-startNanos`.
    pub fn generate_worker_id() -> String {
        let host = hostname_or_unknown();
        let pid = std::process::id();
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{host}-{pid}-{nanos}")
    }
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "host".to_string())
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: Self::generate_worker_id(),
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
            housekeeping_interval: Duration::from_secs(5 * 60),
            stale_timeout: chrono::Duration::minutes(10),
        }
    }
}

pub struct Worker {
    config: WorkerConfig,
    store: Arc<Store>,
    router: Arc<Router>,
    extractor: Arc<dyn ContentExtractor>,
    callback_config: CallbackConfig,
    http_client: reqwest::Client,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<Store>,
        router: Arc<Router>,
        extractor: Arc<dyn ContentExtractor>,
        callback_config: CallbackConfig,
    ) -> Self {
        Self {
            config,
            store,
            router,
            extractor,
            callback_config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight tasks
    /// before returning; an in-flight upstream or callback call is never cancelled.
    pub async fn run_until_shutdown(self: Arc<Self>, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();

        let housekeeping = tokio::spawn(housekeeping_loop(
            Arc::clone(&self.store),
            self.config.housekeeping_interval,
            self.config.stale_timeout,
            shutdown.clone(),
        ));

        info!(worker_id = %self.config.worker_id, concurrency = self.config.concurrency, "worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => {
                    let permit = permit.expect("semaphore never closed");
                    match self.store.claim_next(&self.config.worker_id).await {
                        Ok(Some(job)) => {
                            let worker = Arc::clone(&self);
                            tasks.spawn(async move {
                                let _permit = permit;
                                worker.process_job(job).await;
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                            tokio::select! {
                                _ = tokio::time::sleep(self.config.poll_interval) => {}
                                _ = shutdown.cancelled() => break,
                            }
                        }
                        Err(e) => {
                            drop(permit);
                            error!(error = %e, "claim_next failed");
                            tokio::select! {
                                _ = tokio::time::sleep(self.config.poll_interval) => {}
                                _ = shutdown.cancelled() => break,
                            }
                        }
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "draining in-flight jobs");
        while tasks.join_next().await.is_some() {}
        housekeeping.abort();
    }

    async fn process_job(&self, job: Job) {
        let started = std::time::Instant::now();

        match self.store.list_active_models().await {
            Ok(candidates) if candidates.is_empty() => {
                self.handle_failure(&job, JobFailure::NoCandidates, true).await;
                return;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "pre-flight candidate check failed, leaving job for stale recovery");
                return;
            }
            _ => {}
        }

        let content = self.extractor.extract(&job.payload);
        if content.is_empty() {
            self.handle_failure(&job, JobFailure::NoExtractableContent, true).await;
            return;
        }

        let max_tokens = estimate_max_tokens(&content);

        match self.router.dispatch(job.id, &content, max_tokens).await {
            Ok(summary) => self.complete_with_callback(&job, summary, started).await,
            Err(RouterFailure::NoCandidates) => {
                self.handle_failure(&job, JobFailure::NoCandidates, true).await
            }
            Err(RouterFailure::AllCandidatesFailed(msg)) => {
                self.handle_failure(&job, JobFailure::AllCandidatesFailed(msg), false)
                    .await
            }
            Err(RouterFailure::InputInvalid(msg)) => {
                self.handle_failure(&job, JobFailure::InputInvalid(msg), false)
                    .await
            }
        }
    }

    async fn complete_with_callback(
        &self,
        job: &Job,
        summary: String,
        started: std::time::Instant,
    ) {
        let body = CallbackBody {
            file_id: job.file_id.clone(),
            summary: summary.clone(),
            metadata: CallbackMetadata {
                content_blocks: 1,
                total_words: summary.split_whitespace().count() as u32,
                main_content_words: summary.split_whitespace().count() as u32,
                processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                processed_at: chrono::Utc::now(),
            },
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        match post_callback(&self.http_client, &self.callback_config, &body, now_ms).await {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .complete_job(job.id, JobOutcome::Succeeded, Some(&summary), None)
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to mark job succeeded");
                }
            }
            Err(e) => {
                self.handle_failure(job, JobFailure::CallbackFailed(e.to_string()), false)
                    .await
            }
        }
    }

    /// `increment_here = true` for pre-router failures the Router never saw
    /// (`NoCandidates`, `NoExtractableContent`); Router-originated failures
    /// already recorded their own attempt per candidate.
    async fn handle_failure(&self, job: &Job, failure: JobFailure, increment_here: bool) {
        let message = failure.to_string();

        let attempts = if increment_here {
            match self
                .store
                .increment_attempt(job.id, None, None, false, Some(&message))
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to record attempt");
                    return;
                }
            }
        } else {
            match self.store.get_job(job.id).await {
                Ok(Some(current)) => current.attempts,
                Ok(None) => {
                    error!(job_id = %job.id, "job vanished while handling failure");
                    return;
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to re-read job");
                    return;
                }
            }
        };

        let outcome = if failure.is_retryable() && attempts < job.max_attempts {
            JobOutcome::Queued
        } else {
            JobOutcome::Dead
        };

        warn!(job_id = %job.id, attempts, max_attempts = job.max_attempts, outcome = ?outcome, error = %message, "job processing failed");

        if let Err(e) = self
            .store
            .complete_job(job.id, outcome, None, Some(&message))
            .await
        {
            error!(job_id = %job.id, error = %e, "failed to complete job after failure");
        }
    }
}

async fn housekeeping_loop(
    store: Arc<Store>,
    interval: Duration,
    stale_timeout: chrono::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.recover_stale(stale_timeout).await {
                    Ok(n) if n > 0 => info!(recovered = n, "recovered stale jobs"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "recover_stale failed"),
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
