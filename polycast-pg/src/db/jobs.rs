//! Generation job persistence
//!
//! Status columns hold the JSON encodings of the status enums, so SQL
//! literals for them carry embedded quotes (e.g. `'"READY"'`).
//!
//! Terminal transitions are guarded by the current status in the WHERE
//! clause. A transition that matches zero rows means another writer settled
//! the job first; callers treat that as "already settled", never as an error.

use crate::models::{AudioStatus, ContentStatus, GenerationJob, Language};
use chrono::{DateTime, NaiveDate, Utc};
use polycast_common::db::retry_on_lock;
use polycast_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn status_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize status: {}", e)))
}

fn parse_timestamp(value: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| Error::Internal(format!("Invalid {}: {}", field, e))),
        None => Ok(None),
    }
}

fn decode_row(row: &SqliteRow) -> Result<GenerationJob> {
    let job_id: String = row.try_get("job_id")?;
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|e| Error::Internal(format!("Invalid job_id: {}", e)))?;

    let digest_date: String = row.try_get("digest_date")?;
    let digest_date = digest_date
        .parse::<NaiveDate>()
        .map_err(|e| Error::Internal(format!("Invalid digest_date: {}", e)))?;

    let language: String = row.try_get("language")?;
    let language = Language::from_code(&language)
        .ok_or_else(|| Error::Internal(format!("Unknown language code: {}", language)))?;

    let content_status: String = row.try_get("content_status")?;
    let content_status: ContentStatus = serde_json::from_str(&content_status)
        .map_err(|e| Error::Internal(format!("Invalid content_status: {}", e)))?;

    let audio_status: String = row.try_get("audio_status")?;
    let audio_status: AudioStatus = serde_json::from_str(&audio_status)
        .map_err(|e| Error::Internal(format!("Invalid audio_status: {}", e)))?;

    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid created_at: {}", e)))?;

    let poll_attempts: i64 = row.try_get("poll_attempts")?;

    Ok(GenerationJob {
        job_id,
        digest_date,
        language,
        content_status,
        audio_status,
        request_id: row.try_get("request_id")?,
        audio_url: row.try_get("audio_url")?,
        audio_duration_seconds: row.try_get("audio_duration_seconds")?,
        error_message: row.try_get("error_message")?,
        poll_attempts: poll_attempts as u32,
        created_at,
        submitted_at: parse_timestamp(row.try_get("submitted_at")?, "submitted_at")?,
        completed_at: parse_timestamp(row.try_get("completed_at")?, "completed_at")?,
    })
}

/// Insert a new job row
///
/// The partial unique index rejects a second in-flight row for the same
/// date/language pair; callers see that as a database error.
pub async fn insert_job(pool: &SqlitePool, job: &GenerationJob) -> Result<()> {
    let content_status = status_json(&job.content_status)?;
    let audio_status = status_json(&job.audio_status)?;
    let job_id = job.job_id.to_string();
    let digest_date = job.digest_date.to_string();
    let created_at = job.created_at.to_rfc3339();
    let submitted_at = job.submitted_at.map(|t| t.to_rfc3339());
    let completed_at = job.completed_at.map(|t| t.to_rfc3339());

    retry_on_lock(pool, "insert_job", || async {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs (
                job_id, digest_date, language, content_status, audio_status,
                request_id, audio_url, audio_duration_seconds, error_message,
                poll_attempts, created_at, submitted_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job_id)
        .bind(&digest_date)
        .bind(job.language.code())
        .bind(&content_status)
        .bind(&audio_status)
        .bind(&job.request_id)
        .bind(&job.audio_url)
        .bind(job.audio_duration_seconds)
        .bind(&job.error_message)
        .bind(job.poll_attempts as i64)
        .bind(&created_at)
        .bind(&submitted_at)
        .bind(&completed_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<GenerationJob>> {
    let row = sqlx::query("SELECT * FROM generation_jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(decode_row).transpose()
}

/// Latest job row for a date/language pair
///
/// Resubmissions create new rows; the newest one is authoritative.
pub async fn get_current_job(
    pool: &SqlitePool,
    digest_date: NaiveDate,
    language: Language,
) -> Result<Option<GenerationJob>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM generation_jobs
        WHERE digest_date = ? AND language = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(digest_date.to_string())
    .bind(language.code())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(decode_row).transpose()
}

pub async fn get_job_by_request_id(
    pool: &SqlitePool,
    request_id: &str,
) -> Result<Option<GenerationJob>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM generation_jobs
        WHERE request_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(decode_row).transpose()
}

/// All job rows for a date, oldest first
pub async fn list_jobs_for_date(
    pool: &SqlitePool,
    digest_date: NaiveDate,
) -> Result<Vec<GenerationJob>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM generation_jobs
        WHERE digest_date = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(digest_date.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(decode_row).collect()
}

/// All in-flight jobs across every date, used at startup to resume polling
pub async fn list_inflight(pool: &SqlitePool) -> Result<Vec<GenerationJob>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM generation_jobs
        WHERE audio_status IN ('"SUBMITTED"', '"POLLING"')
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(decode_row).collect()
}

/// In-flight jobs for a date whose submission predates the cutoff
pub async fn list_stale_inflight(
    pool: &SqlitePool,
    digest_date: NaiveDate,
    cutoff: DateTime<Utc>,
) -> Result<Vec<GenerationJob>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM generation_jobs
        WHERE digest_date = ?
          AND audio_status IN ('"SUBMITTED"', '"POLLING"')
          AND submitted_at IS NOT NULL
          AND submitted_at < ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(digest_date.to_string())
    .bind(cutoff.to_rfc3339())
    .fetch_all(pool)
    .await?;

    rows.iter().map(decode_row).collect()
}

/// Record the poll attempt count (informational, not a transition)
pub async fn record_poll_attempt(pool: &SqlitePool, job_id: Uuid, attempts: u32) -> Result<()> {
    let job_id = job_id.to_string();
    retry_on_lock(pool, "record_poll_attempt", || async {
        sqlx::query("UPDATE generation_jobs SET poll_attempts = ? WHERE job_id = ?")
            .bind(attempts as i64)
            .bind(&job_id)
            .execute(pool)
            .await?;
        Ok(())
    })
    .await
}

/// SUBMITTED -> POLLING, true if this call performed the transition
pub async fn mark_polling(pool: &SqlitePool, job_id: Uuid) -> Result<bool> {
    let job_id = job_id.to_string();
    retry_on_lock(pool, "mark_polling", || async {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET audio_status = '"POLLING"'
            WHERE job_id = ? AND audio_status = '"SUBMITTED"'
            "#,
        )
        .bind(&job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

/// In-flight -> READY, true if this call won the transition
///
/// A row with no request id can never become READY; audio is only ever
/// located through the request id it was submitted under.
pub async fn complete_job(
    pool: &SqlitePool,
    job_id: Uuid,
    audio_url: &str,
    duration_seconds: f64,
) -> Result<bool> {
    let job_id = job_id.to_string();
    let completed_at = Utc::now().to_rfc3339();
    retry_on_lock(pool, "complete_job", || async {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET audio_status = '"READY"',
                audio_url = ?,
                audio_duration_seconds = ?,
                error_message = NULL,
                completed_at = ?
            WHERE job_id = ?
              AND audio_status IN ('"SUBMITTED"', '"POLLING"')
              AND request_id IS NOT NULL
            "#,
        )
        .bind(audio_url)
        .bind(duration_seconds)
        .bind(&completed_at)
        .bind(&job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

/// In-flight -> FAILED, true if this call won the transition
pub async fn fail_job(pool: &SqlitePool, job_id: Uuid, error_message: &str) -> Result<bool> {
    let job_id = job_id.to_string();
    let completed_at = Utc::now().to_rfc3339();
    retry_on_lock(pool, "fail_job", || async {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET audio_status = '"FAILED"',
                error_message = ?,
                completed_at = ?
            WHERE job_id = ? AND audio_status IN ('"SUBMITTED"', '"POLLING"')
            "#,
        )
        .bind(error_message)
        .bind(&completed_at)
        .bind(&job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

/// In-flight -> TIMED_OUT, true if this call won the transition
pub async fn time_out_job(pool: &SqlitePool, job_id: Uuid, attempts: u32) -> Result<bool> {
    let job_id = job_id.to_string();
    let completed_at = Utc::now().to_rfc3339();
    retry_on_lock(pool, "time_out_job", || async {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET audio_status = '"TIMED_OUT"',
                poll_attempts = ?,
                completed_at = ?
            WHERE job_id = ? AND audio_status IN ('"SUBMITTED"', '"POLLING"')
            "#,
        )
        .bind(attempts as i64)
        .bind(&completed_at)
        .bind(&job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    fn sample_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn submitted_job(language: Language, request_id: &str) -> GenerationJob {
        let mut job = GenerationJob::new(sample_date(), language);
        job.mark_submitted(request_id.to_string());
        job
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let pool = test_pool().await;
        let job = submitted_job(Language::Es, "req-es-1");

        insert_job(&pool, &job).await.unwrap();
        let loaded = get_job(&pool, job.job_id).await.unwrap().unwrap();

        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.digest_date, sample_date());
        assert_eq!(loaded.language, Language::Es);
        assert_eq!(loaded.audio_status, AudioStatus::Submitted);
        assert_eq!(loaded.request_id.as_deref(), Some("req-es-1"));
        assert_eq!(loaded.created_at, job.created_at);
        assert_eq!(loaded.submitted_at, job.submitted_at);
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_current_job_is_newest_row() {
        let pool = test_pool().await;

        // Step 1: old failed attempt
        let mut old = GenerationJob::new(sample_date(), Language::De);
        old.created_at = Utc::now() - Duration::hours(2);
        old.mark_failed("synthesis rejected");
        insert_job(&pool, &old).await.unwrap();

        // Step 2: fresh resubmission
        let fresh = submitted_job(Language::De, "req-de-2");
        insert_job(&pool, &fresh).await.unwrap();

        let current = get_current_job(&pool, sample_date(), Language::De)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.job_id, fresh.job_id);
        assert_eq!(current.audio_status, AudioStatus::Submitted);
    }

    #[tokio::test]
    async fn test_terminal_transition_has_single_winner() {
        let pool = test_pool().await;
        let job = submitted_job(Language::Fr, "req-fr-1");
        insert_job(&pool, &job).await.unwrap();

        // Step 1: first settle wins
        let won = complete_job(&pool, job.job_id, "https://cdn.example.com/fr.mp3", 280.0)
            .await
            .unwrap();
        assert!(won);

        // Step 2: late failure report loses, status unchanged
        let lost = fail_job(&pool, job.job_id, "late error").await.unwrap();
        assert!(!lost);

        let loaded = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.audio_status, AudioStatus::Ready);
        assert!(loaded.error_message.is_none());
        assert_eq!(loaded.audio_duration_seconds, Some(280.0));
    }

    #[tokio::test]
    async fn test_mark_polling_only_from_submitted() {
        let pool = test_pool().await;
        let job = submitted_job(Language::Ja, "req-ja-1");
        insert_job(&pool, &job).await.unwrap();

        assert!(mark_polling(&pool, job.job_id).await.unwrap());
        // Second call is a no-op: status is already POLLING
        assert!(!mark_polling(&pool, job.job_id).await.unwrap());

        let loaded = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.audio_status, AudioStatus::Polling);
    }

    #[tokio::test]
    async fn test_active_unique_index_blocks_duplicate_inflight() {
        let pool = test_pool().await;

        let first = submitted_job(Language::Ko, "req-ko-1");
        insert_job(&pool, &first).await.unwrap();

        // Step 1: second in-flight row for the same pair is rejected
        let duplicate = submitted_job(Language::Ko, "req-ko-2");
        assert!(insert_job(&pool, &duplicate).await.is_err());

        // Step 2: once the first settles, a new submission is allowed
        fail_job(&pool, first.job_id, "synthesis failed").await.unwrap();
        let retry = submitted_job(Language::Ko, "req-ko-3");
        insert_job(&pool, &retry).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_stale_inflight_filters_by_cutoff() {
        let pool = test_pool().await;

        let mut stale = submitted_job(Language::En, "req-en-old");
        stale.submitted_at = Some(Utc::now() - Duration::minutes(30));
        insert_job(&pool, &stale).await.unwrap();

        let fresh = submitted_job(Language::Es, "req-es-new");
        insert_job(&pool, &fresh).await.unwrap();

        let mut settled = GenerationJob::new(sample_date(), Language::Fr);
        settled.mark_submitted("req-fr-old".to_string());
        settled.submitted_at = Some(Utc::now() - Duration::minutes(30));
        settled.mark_ready("https://cdn.example.com/fr.mp3".to_string(), 300.0);
        insert_job(&pool, &settled).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(15);
        let found = list_stale_inflight(&pool, sample_date(), cutoff).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].job_id, stale.job_id);
    }

    #[tokio::test]
    async fn test_list_inflight_skips_terminal_rows() {
        let pool = test_pool().await;

        let submitted = submitted_job(Language::En, "req-en-1");
        insert_job(&pool, &submitted).await.unwrap();

        let mut polling = submitted_job(Language::Es, "req-es-1");
        insert_job(&pool, &polling).await.unwrap();
        mark_polling(&pool, polling.job_id).await.unwrap();
        polling.mark_polling();

        let mut done = GenerationJob::new(sample_date(), Language::Pt);
        done.mark_submitted("req-pt-1".to_string());
        done.mark_ready("https://cdn.example.com/pt.mp3".to_string(), 295.0);
        insert_job(&pool, &done).await.unwrap();

        let inflight = list_inflight(&pool).await.unwrap();
        let ids: Vec<Uuid> = inflight.iter().map(|j| j.job_id).collect();

        assert_eq!(inflight.len(), 2);
        assert!(ids.contains(&submitted.job_id));
        assert!(ids.contains(&polling.job_id));
    }

    #[tokio::test]
    async fn test_record_poll_attempt() {
        let pool = test_pool().await;
        let job = submitted_job(Language::En, "req-en-attempts");
        insert_job(&pool, &job).await.unwrap();

        record_poll_attempt(&pool, job.job_id, 17).await.unwrap();

        let loaded = get_job(&pool, job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.poll_attempts, 17);
    }
}
