//! Per-(model, window) quota counters.

use sqlx::Row;

use super::{Store, StoreResult};
use crate::error::StoreError;
use crate::models::Period;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeResult {
    pub allowed: bool,
    pub used: i32,
    pub limit: i32,
}

impl Store {
    /// Atomic check-and-increment: the `ON CONFLICT ... DO UPDATE ... WHERE`
    /// clause only advances `used_count` when doing so would not exceed the
    /// limit, so a denied call leaves no trace.
    pub async fn try_consume(&self, model_id: &str, period: Period) -> StoreResult<ConsumeResult> {
        let mut tx = self.pool.begin().await?;

        let limit_column = match period {
            Period::Minute => "per_minute_limit",
            Period::Day => "per_day_limit",
        };
        let limit: i32 = sqlx::query_scalar(&format!(
            "SELECT {limit_column} FROM models WHERE id = $1"
        ))
        .bind(model_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::UnknownProvider(model_id.to_string()))?;

        let window_start = period.window_start(chrono::Utc::now());

        let row = sqlx::query(
            r#"
            INSERT INTO rate_counters (model_id, period, window_start, used_count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (model_id, period, window_start) DO UPDATE
            SET used_count = rate_counters.used_count + 1
            WHERE rate_counters.used_count < $4
            RETURNING used_count
            "#,
        )
        .bind(model_id)
        .bind(period)
        .bind(window_start)
        .bind(limit)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(match row {
            Some(row) => ConsumeResult {
                allowed: true,
                used: row.try_get("used_count")?,
                limit,
            },
            None => {
                let used = self.current_usage(model_id, period, window_start).await?;
                ConsumeResult {
                    allowed: false,
                    used,
                    limit,
                }
            }
        })
    }

    async fn current_usage(
        &self,
        model_id: &str,
        period: Period,
        window_start: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<i32> {
        let used = sqlx::query_scalar::<_, i32>(
            "SELECT used_count FROM rate_counters WHERE model_id = $1 AND period = $2 AND window_start = $3",
        )
        .bind(model_id)
        .bind(period)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or(0);

        Ok(used)
    }

    /// Delete counters whose window is more than 2x its period old.
    pub async fn prune_rate_counters(&self) -> StoreResult<u64> {
        let now = chrono::Utc::now();
        let minute_cutoff = now - chrono::Duration::seconds(2 * Period::Minute.window_seconds());
        let day_cutoff = now - chrono::Duration::seconds(2 * Period::Day.window_seconds());

        let affected = sqlx::query(
            r#"
            DELETE FROM rate_counters
            WHERE (period = 'minute' AND window_start < $1)
               OR (period = 'day' AND window_start < $2)
            "#,
        )
        .bind(minute_cutoff)
        .bind(day_cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }
}
