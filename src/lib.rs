//! Durable job queue and dispatch engine for AI summarization work.
//!
//! The core subsystem is the queue + router: a durable [`store::Store`]
//! with deduplication and atomic single-worker claim, a [`worker::Worker`]
//! runtime driving the job lifecycle, and a [`router::Router`] that walks
//! (provider, model) candidates under per-model rate limits and
//! provider-level backoff. HTTP ingress, content extraction, and the
//! upstream AI SDK are external collaborators, represented here as trait
//! boundaries (see [`content`], [`upstream`]) with minimal default adapters.

pub mod callback;
pub mod config;
pub mod content;
pub mod error;
pub mod hash;
pub mod models;
pub mod registry;
pub mod router;
pub mod store;
pub mod upstream;
pub mod worker;

pub use error::{ErrorClass, JobFailure, StoreError};
pub use models::{EnqueueResult, EnqueueStatus, Job, JobState};
pub use router::Router;
pub use store::Store;
pub use worker::{Worker, WorkerConfig};
