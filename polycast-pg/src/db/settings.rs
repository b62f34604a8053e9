//! Settings storage
//!
//! Simple key/value table shared with the lock-retry budget and the API key.
//! Generation parameters are persisted here so tuning survives restarts.

use crate::models::{DurationTier, GenerationParameters};
use polycast_common::Result;
use sqlx::SqlitePool;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

/// Settings keys used by this module
pub mod keys {
    pub const POLL_INITIAL_DELAY_SECS: &str = "poll_initial_delay_secs";
    pub const POLL_INTERVAL_SECS: &str = "poll_interval_secs";
    pub const MAX_POLL_ATTEMPTS: &str = "max_poll_attempts";
    pub const TRANSPORT_RETRY_LIMIT: &str = "transport_retry_limit";
    pub const STALE_AFTER_SECS: &str = "stale_after_secs";
    pub const SWEEP_INTERVAL_SECS: &str = "sweep_interval_secs";
    pub const DURATION_TIER: &str = "duration_tier";
    pub const SPEECH_API_KEY: &str = "speech_api_key";
}

/// Read a setting, parsing it into the requested type
///
/// An unparseable stored value is treated as absent (with a warning) so a
/// corrupt setting degrades to the default instead of wedging startup.
pub async fn get_setting<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value {
        Some(raw) => match raw.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => {
                warn!(key, value = %raw, "Unparseable setting value, using default");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Write a setting, inserting or updating as needed
pub async fn set_setting<T: Display>(pool: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load generation parameters, falling back to defaults for absent keys
pub async fn load_parameters(pool: &SqlitePool) -> GenerationParameters {
    let mut params = GenerationParameters::default();

    if let Ok(Some(v)) = get_setting(pool, keys::POLL_INITIAL_DELAY_SECS).await {
        params.poll_initial_delay_secs = v;
    }
    if let Ok(Some(v)) = get_setting(pool, keys::POLL_INTERVAL_SECS).await {
        params.poll_interval_secs = v;
    }
    if let Ok(Some(v)) = get_setting(pool, keys::MAX_POLL_ATTEMPTS).await {
        params.max_poll_attempts = v;
    }
    if let Ok(Some(v)) = get_setting(pool, keys::TRANSPORT_RETRY_LIMIT).await {
        params.transport_retry_limit = v;
    }
    if let Ok(Some(v)) = get_setting(pool, keys::STALE_AFTER_SECS).await {
        params.stale_after_secs = v;
    }
    if let Ok(Some(v)) = get_setting(pool, keys::SWEEP_INTERVAL_SECS).await {
        params.sweep_interval_secs = v;
    }
    if let Ok(Some(v)) = get_setting::<DurationTier>(pool, keys::DURATION_TIER).await {
        params.duration_tier = v;
    }

    params
}

/// Persist the full parameter set
pub async fn persist_parameters(pool: &SqlitePool, params: &GenerationParameters) -> Result<()> {
    set_setting(pool, keys::POLL_INITIAL_DELAY_SECS, params.poll_initial_delay_secs).await?;
    set_setting(pool, keys::POLL_INTERVAL_SECS, params.poll_interval_secs).await?;
    set_setting(pool, keys::MAX_POLL_ATTEMPTS, params.max_poll_attempts).await?;
    set_setting(pool, keys::TRANSPORT_RETRY_LIMIT, params.transport_retry_limit).await?;
    set_setting(pool, keys::STALE_AFTER_SECS, params.stale_after_secs).await?;
    set_setting(pool, keys::SWEEP_INTERVAL_SECS, params.sweep_interval_secs).await?;
    set_setting(pool, keys::DURATION_TIER, params.duration_tier).await?;
    Ok(())
}
