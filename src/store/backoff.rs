//! Provider-wide cool-down bookkeeping.

use std::collections::HashSet;

use super::{Store, StoreResult};

impl Store {
    /// Idempotent on `provider_id`: a new backoff overwrites the prior one
    /// (idempotent: setting the same backoff twice is a no-op).
    pub async fn set_backoff(
        &self,
        provider_id: &str,
        until: chrono::DateTime<chrono::Utc>,
        reason: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO provider_backoff (provider_id, until, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider_id) DO UPDATE
            SET until = EXCLUDED.until, reason = EXCLUDED.reason
            "#,
        )
        .bind(provider_id)
        .bind(until)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_gated_providers(&self) -> StoreResult<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT provider_id FROM provider_backoff WHERE until > NOW()",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    pub async fn gated(&self, provider_id: &str) -> StoreResult<bool> {
        let until: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
            "SELECT until FROM provider_backoff WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(until.is_some_and(|u| u > chrono::Utc::now()))
    }
}
