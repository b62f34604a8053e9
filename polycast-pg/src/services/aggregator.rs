//! Operator-facing status aggregation
//!
//! Collapses the job history for a date into one entry per supported
//! language plus rollup counts. Read-only; the API status endpoint is a
//! thin wrapper around this module.

use crate::db::jobs;
use crate::models::{AudioStatus, ContentStatus, GenerationJob, Language};
use chrono::{DateTime, NaiveDate, Utc};
use polycast_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-language snapshot derived from the newest job row
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub content_status: ContentStatus,
    pub audio_status: AudioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub poll_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobSummary {
    fn from_job(job: &GenerationJob) -> Self {
        Self {
            content_status: job.content_status,
            audio_status: job.audio_status,
            job_id: Some(job.job_id),
            request_id: job.request_id.clone(),
            audio_url: job.audio_url.clone(),
            audio_duration_seconds: job.audio_duration_seconds,
            error_message: job.error_message.clone(),
            poll_attempts: job.poll_attempts,
            updated_at: job
                .completed_at
                .or(job.submitted_at)
                .or(Some(job.created_at)),
        }
    }

    /// Placeholder for a language with no job rows at all
    fn absent() -> Self {
        Self {
            content_status: ContentStatus::Missing,
            audio_status: AudioStatus::None,
            job_id: None,
            request_id: None,
            audio_url: None,
            audio_duration_seconds: None,
            error_message: None,
            poll_attempts: 0,
            updated_at: None,
        }
    }
}

/// Rollup counts across all languages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub ready: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub missing: usize,
}

/// Full per-date status: one entry per supported language
#[derive(Debug, Clone, Serialize)]
pub struct DateStatus {
    pub digest_date: NaiveDate,
    pub languages: BTreeMap<Language, JobSummary>,
    pub summary: StatusCounts,
}

/// Build the status report for a date
///
/// Every supported language appears exactly once; languages with no job
/// rows show as missing. The newest row per language is authoritative.
pub async fn status_for_date(pool: &SqlitePool, digest_date: NaiveDate) -> Result<DateStatus> {
    let rows = jobs::list_jobs_for_date(pool, digest_date).await?;

    // Rows come back oldest first, so the last insert per language wins
    let mut latest: BTreeMap<Language, GenerationJob> = BTreeMap::new();
    for job in rows {
        latest.insert(job.language, job);
    }

    let mut languages = BTreeMap::new();
    let mut summary = StatusCounts::default();

    for language in Language::all() {
        match latest.remove(&language) {
            Some(job) => {
                match job.audio_status {
                    AudioStatus::Ready => summary.ready += 1,
                    AudioStatus::Submitted | AudioStatus::Polling => summary.in_flight += 1,
                    AudioStatus::Failed => summary.failed += 1,
                    AudioStatus::TimedOut => summary.timed_out += 1,
                    AudioStatus::None => summary.missing += 1,
                }
                languages.insert(language, JobSummary::from_job(&job));
            }
            None => {
                summary.missing += 1;
                languages.insert(language, JobSummary::absent());
            }
        }
    }

    Ok(DateStatus {
        digest_date,
        languages,
        summary,
    })
}
