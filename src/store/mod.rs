//! Durable persistence for providers, models, jobs, attempts, rate counters,
//! and provider backoff.
//!
//! One [`Store`] wraps a single [`PgPool`]; each entity gets its own file
//! under this module, one file per concern.

mod backoff;
mod jobs;
mod providers;
pub mod rate_limiter;

pub use rate_limiter::ConsumeResult;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    /// Connect and apply pending migrations. `statement_timeout`/`lock_timeout`
    /// are set on each new connection to bound how long a writer waits on a busy lock.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let connect_options = PgConnectOptions::from_str(database_url)?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET statement_timeout = 5000; SET lock_timeout = 5000;")
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Wrap an already-migrated pool. Intended for integration tests that
    /// manage their own container/migration lifecycle.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
