//! Database layer for the podcast generation module

pub mod jobs;
pub mod settings;

use polycast_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the module database and create the schema if needed
pub async fn init_database(database_path: &Path) -> Result<SqlitePool> {
    let pool = polycast_common::db::open_database_pool(database_path).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes (idempotent)
///
/// Status columns store the JSON encodings of the status enums, which is why
/// the partial index literals carry embedded quotes.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    polycast_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation_jobs (
            job_id TEXT PRIMARY KEY,
            digest_date TEXT NOT NULL,
            language TEXT NOT NULL,
            content_status TEXT NOT NULL,
            audio_status TEXT NOT NULL,
            request_id TEXT,
            audio_url TEXT,
            audio_duration_seconds REAL,
            error_message TEXT,
            poll_attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            submitted_at TEXT,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_generation_jobs_date_language
        ON generation_jobs(digest_date, language)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_generation_jobs_request_id
        ON generation_jobs(request_id)
        "#,
    )
    .execute(pool)
    .await?;

    // At most one live synthesis request per date/language pair
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_generation_jobs_active
        ON generation_jobs(digest_date, language)
        WHERE audio_status IN ('"SUBMITTED"', '"POLLING"')
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // Single connection so the in-memory database is shared
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}
