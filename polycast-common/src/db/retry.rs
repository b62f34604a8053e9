//! Database lock retry helper
//!
//! SQLite allows a single writer at a time. With the dispatcher, per-job
//! pollers and the sweep service all writing to the same database, a busy
//! connection surfaces as a "database is locked" error. This wrapper retries
//! such failures with exponential backoff instead of failing the operation.
//!
//! Only lock contention is retried; every other error returns immediately.

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Settings key controlling the total time budget for lock retries
pub const MAX_LOCK_WAIT_SETTING: &str = "database_max_lock_wait_ms";

/// Default retry budget when the setting is absent or unreadable
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Initial backoff delay
const INITIAL_DELAY_MS: u64 = 10;

/// Backoff ceiling
const MAX_DELAY_MS: u64 = 1000;

/// Read the configured lock-wait budget from the settings table
async fn get_max_lock_wait_ms(pool: &SqlitePool) -> u64 {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(MAX_LOCK_WAIT_SETTING)
            .fetch_optional(pool)
            .await
            .ok()
            .flatten();

    value
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS)
}

/// True when the error is SQLite lock contention
fn is_lock_error(error: &Error) -> bool {
    match error {
        Error::Database(db_err) => db_err.to_string().contains("database is locked"),
        _ => false,
    }
}

/// Run a database operation, retrying on lock contention with exponential
/// backoff (10ms doubling up to 1s per wait) until the configured total
/// budget is exhausted.
///
/// The operation closure is re-invoked on each attempt, so it must be safe
/// to repeat (single statements and idempotent upserts are; multi-statement
/// sequences should be wrapped individually).
pub async fn retry_on_lock<F, Fut, T>(pool: &SqlitePool, operation_name: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_wait_ms = get_max_lock_wait_ms(pool).await;
    let mut delay_ms = INITIAL_DELAY_MS;
    let mut total_waited_ms = 0u64;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt,
                        waited_ms = total_waited_ms,
                        "Database operation succeeded after lock retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if is_lock_error(&e) => {
                if total_waited_ms >= max_wait_ms {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        waited_ms = total_waited_ms,
                        "Database still locked after retry budget exhausted"
                    );
                    return Err(e);
                }

                // Escalate visibility as the wait drags on
                if total_waited_ms >= 5000 {
                    warn!(
                        operation = operation_name,
                        waited_ms = total_waited_ms,
                        "Database locked for over 5s, still retrying"
                    );
                } else if total_waited_ms >= 2000 {
                    debug!(
                        operation = operation_name,
                        waited_ms = total_waited_ms,
                        "Database locked for over 2s, still retrying"
                    );
                }

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                total_waited_ms += delay_ms;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
            Err(e) => return Err(e),
        }
    }
}
