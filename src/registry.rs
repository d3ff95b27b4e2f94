//! Provider/model seeding at startup. Not hot-reloadable: a restart
//! re-seeds via `upsert`, so changed configuration simply overwrites the
//! previous rows.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::store::Store;

pub async fn seed(store: &Arc<Store>, config: &Config) -> anyhow::Result<()> {
    for provider in &config.providers {
        store
            .upsert_provider(
                &provider.id,
                &provider.name,
                &provider.credential,
                provider.priority,
                provider.enabled,
            )
            .await?;

        for model in &provider.models {
            store
                .upsert_model(
                    &model.id,
                    &provider.id,
                    &model.model_name,
                    model.per_minute_limit,
                    model.per_day_limit,
                    true,
                )
                .await?;
        }

        info!(
            provider_id = %provider.id,
            models = provider.models.len(),
            enabled = provider.enabled,
            "seeded provider"
        );
    }

    Ok(())
}
