//! Startup configuration: `dotenvy` once, then `std::env::var` with
//! `anyhow::Context` for required keys.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_PER_MINUTE_LIMIT: i32 = 60;
const DEFAULT_PER_DAY_LIMIT: i32 = 10_000;

#[derive(Debug, Clone)]
pub struct ModelSeed {
    pub id: String,
    pub model_name: String,
    pub per_minute_limit: i32,
    pub per_day_limit: i32,
}

#[derive(Debug, Clone)]
pub struct ProviderSeed {
    pub id: String,
    pub name: String,
    pub credential: String,
    pub priority: i32,
    pub enabled: bool,
    pub models: Vec<ModelSeed>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub callback_url: String,
    pub internal_secret: String,
    pub upstream_base_url: String,
    pub worker_concurrency: usize,
    pub poll_interval: Duration,
    pub stale_timeout_min: i64,
    pub providers: Vec<ProviderSeed>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment. A
    /// missing or default `INTERNAL_SECRET` is a fatal misconfiguration
    /// required.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10)?;
        let callback_url = std::env::var("CALLBACK_URL").context("CALLBACK_URL is required")?;
        let upstream_base_url =
            std::env::var("UPSTREAM_BASE_URL").context("UPSTREAM_BASE_URL is required")?;

        let internal_secret =
            std::env::var("INTERNAL_SECRET").unwrap_or_default();
        if internal_secret.is_empty() || internal_secret == "default" {
            bail!("INTERNAL_SECRET must be set to a non-default value");
        }

        let worker_concurrency = env_or("WORKER_CONCURRENCY", 1usize)?;
        let poll_interval_ms = env_or("POLL_INTERVAL_MS", 1000u64)?;
        let stale_timeout_min = env_or("STALE_TIMEOUT_MIN", 10i64)?;

        let providers = parse_providers()?;
        if providers.iter().all(|p| !p.enabled) {
            bail!("at least one enabled provider is required");
        }

        Ok(Self {
            database_url,
            max_connections,
            callback_url,
            internal_secret,
            upstream_base_url,
            worker_concurrency,
            poll_interval: Duration::from_millis(poll_interval_ms),
            stale_timeout_min,
            providers,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

/// `PROVIDERS=openai,anthropic` names the providers to seed. For each `P`:
/// `PROVIDER_<P>_CREDENTIAL` (required), `PROVIDER_<P>_PRIORITY` (default =
/// list position), `PROVIDER_ENABLED_<P>=true|false` (default true),
/// `PROVIDER_<P>_MODELS=name:id:minute:day;...` (semicolon-separated).
/// `MODEL_CONFIG_<P>_<MODEL_ID>=minute,day` overrides one model's limits.
fn parse_providers() -> Result<Vec<ProviderSeed>> {
    let names = std::env::var("PROVIDERS").context("PROVIDERS is required (comma-separated)")?;

    names
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(index, name)| parse_provider(name, index as i32 + 1))
        .collect()
}

fn parse_provider(name: &str, default_priority: i32) -> Result<ProviderSeed> {
    let upper = name.to_uppercase();

    let credential = std::env::var(format!("PROVIDER_{upper}_CREDENTIAL"))
        .with_context(|| format!("PROVIDER_{upper}_CREDENTIAL is required"))?;
    let priority = env_or(&format!("PROVIDER_{upper}_PRIORITY"), default_priority)?;
    let enabled = env_or(&format!("PROVIDER_ENABLED_{upper}"), true)?;
    let models_raw = std::env::var(format!("PROVIDER_{upper}_MODELS")).unwrap_or_default();

    let overrides = parse_model_overrides(&upper);
    let models = parse_models(&upper, &models_raw, &overrides)?;

    Ok(ProviderSeed {
        id: name.to_string(),
        name: name.to_string(),
        credential,
        priority,
        enabled,
        models,
    })
}

fn parse_models(
    provider_upper: &str,
    raw: &str,
    overrides: &HashMap<String, (i32, i32)>,
) -> Result<Vec<ModelSeed>> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() != 2 && parts.len() != 4 {
                bail!("PROVIDER_{provider_upper}_MODELS entry `{entry}` must be `name:id[:minute:day]`");
            }
            let (model_name, id) = (parts[0], parts[1]);

            let (mut per_minute_limit, mut per_day_limit) =
                (DEFAULT_PER_MINUTE_LIMIT, DEFAULT_PER_DAY_LIMIT);
            if parts.len() == 4 {
                per_minute_limit = parts[2].parse().context("invalid per-minute limit")?;
                per_day_limit = parts[3].parse().context("invalid per-day limit")?;
            }
            if let Some(&(minute, day)) = overrides.get(id) {
                per_minute_limit = minute;
                per_day_limit = day;
            }

            Ok(ModelSeed {
                id: id.to_string(),
                model_name: model_name.to_string(),
                per_minute_limit,
                per_day_limit,
            })
        })
        .collect()
}

fn parse_model_overrides(provider_upper: &str) -> HashMap<String, (i32, i32)> {
    let prefix = format!("MODEL_CONFIG_{provider_upper}_");
    std::env::vars()
        .filter_map(|(key, value)| {
            let model_id = key.strip_prefix(&prefix)?;
            let (minute, day) = value.split_once(',')?;
            Some((model_id.to_string(), (minute.parse().ok()?, day.parse().ok()?)))
        })
        .collect()
}
