//! Database pool initialization

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (and create if missing) the SQLite database at the given path
///
/// Uses `mode=rwc` so a first run creates the file. The parent directory must
/// already exist; callers resolve and create the data folder beforehand.
pub async fn open_database_pool(database_path: &Path) -> Result<SqlitePool> {
    let database_url = format!("sqlite://{}?mode=rwc", database_path.display());
    tracing::info!("Opening database: {}", database_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    Ok(pool)
}

/// Create the settings table used for runtime-tunable configuration
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
