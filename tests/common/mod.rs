//! Shared Postgres-backed test harness: a single container (no Redis, no
//! pgvector -- this crate has no vector search).

use anyhow::{Context, Result};
use gist_queue::store::Store;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("shared test infra init failed") })
            .await
    }
}

pub struct TestHarness {
    pub pool: PgPool,
    pub store: Store,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let pool = PgPool::connect(&infra.db_url)
            .await
            .context("failed to connect test pool")?;

        // Each test starts from a clean slate; truncation is cheap relative
        // to container startup, which `SharedTestInfra` amortizes.
        sqlx::query(
            "TRUNCATE job_attempts, rate_counters, provider_backoff, jobs, models, providers RESTART IDENTITY CASCADE",
        )
        .execute(&pool)
        .await?;

        let store = Store::from_pool(pool.clone());
        Ok(Self { pool, store })
    }

    pub async fn seed_provider(&self, id: &str, priority: i32) -> Result<()> {
        self.store
            .upsert_provider(id, id, "test-credential", priority, true)
            .await?;
        Ok(())
    }

    pub async fn seed_model(
        &self,
        id: &str,
        provider_id: &str,
        per_minute_limit: i32,
        per_day_limit: i32,
    ) -> Result<()> {
        self.store
            .upsert_model(id, provider_id, id, per_minute_limit, per_day_limit, true)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        TestHarness::new().await.expect("harness setup failed")
    }
}
