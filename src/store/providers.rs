//! Provider/model registry persistence, the read path for Router/Registry.

use super::{Store, StoreResult};
use crate::error::StoreError;
use crate::models::ActiveModel;

impl Store {
    /// Insert-or-update, keyed by `id`.
    pub async fn upsert_provider(
        &self,
        id: &str,
        name: &str,
        credential: &str,
        priority: i32,
        enabled: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO providers (id, name, credential, priority, enabled)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                credential = EXCLUDED.credential,
                priority = EXCLUDED.priority,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(credential)
        .bind(priority)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert-or-update, keyed by `id`. Fails with [`StoreError::UnknownProvider`]
    /// if `provider_id` doesn't resolve.
    pub async fn upsert_model(
        &self,
        id: &str,
        provider_id: &str,
        model_name: &str,
        per_minute_limit: i32,
        per_day_limit: i32,
        enabled: bool,
    ) -> StoreResult<()> {
        let provider_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM providers WHERE id = $1)",
        )
        .bind(provider_id)
        .fetch_one(&self.pool)
        .await?;

        if !provider_exists {
            return Err(StoreError::UnknownProvider(provider_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO models (id, provider_id, model_name, per_minute_limit, per_day_limit, enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET provider_id = EXCLUDED.provider_id,
                model_name = EXCLUDED.model_name,
                per_minute_limit = EXCLUDED.per_minute_limit,
                per_day_limit = EXCLUDED.per_day_limit,
                enabled = EXCLUDED.enabled
            "#,
        )
        .bind(id)
        .bind(provider_id)
        .bind(model_name)
        .bind(per_minute_limit)
        .bind(per_day_limit)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Candidates for the Router: enabled models on enabled, non-gated
    /// providers, ordered `(provider.priority ASC, model.id ASC)`.
    pub async fn list_active_models(&self) -> StoreResult<Vec<ActiveModel>> {
        let rows = sqlx::query_as::<_, ActiveModel>(
            r#"
            SELECT
                m.id, m.provider_id, m.model_name, m.per_minute_limit, m.per_day_limit,
                p.name AS provider_name, p.credential AS provider_credential, p.priority AS provider_priority
            FROM models m
            JOIN providers p ON p.id = m.provider_id
            LEFT JOIN provider_backoff b ON b.provider_id = p.id
            WHERE m.enabled AND p.enabled AND (b.until IS NULL OR b.until <= NOW())
            ORDER BY p.priority ASC, m.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
