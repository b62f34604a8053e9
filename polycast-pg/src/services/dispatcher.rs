//! Dispatch: fan out synthesis jobs for a digest date
//!
//! One dispatch pass fetches the digest, classifies every supported language
//! against its current job row, submits where needed and spawns a poller per
//! accepted submission. The per-date lock keeps concurrent dispatches and
//! sweeps for the same date from interleaving.

use crate::db::jobs;
use crate::models::{AudioStatus, GenerationJob, GenerationParameters, Language};
use crate::services::audio_client::AudioJobClient;
use crate::services::content_client::{ContentError, ContentProvider};
use crate::services::poller;
use crate::state::DateLocks;
use chrono::{NaiveDate, Utc};
use polycast_common::events::{EventBus, PolycastEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Digest content for {0} is not ready")]
    ContentNotReady(NaiveDate),

    #[error("Content API error: {0}")]
    Content(ContentError),

    #[error(transparent)]
    Database(#[from] polycast_common::Error),
}

impl From<ContentError> for DispatchError {
    fn from(error: ContentError) -> Self {
        match error {
            ContentError::NotReady(date) => DispatchError::ContentNotReady(date),
            other => DispatchError::Content(other),
        }
    }
}

/// What a dispatch pass should do for one language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// No usable job: submit a new one
    NeedsSubmit,
    /// A live job exists, leave it to its poller
    InFlight,
    /// Audio is already ready
    AlreadyReady,
}

/// Decide what to do for a language given its current job row
///
/// `force_refresh` re-submits the base language even when its audio is
/// ready, since a regenerated digest needs fresh base audio. Translations
/// keep their ready audio; they are only re-submitted after their own jobs
/// fail, time out, or disappear.
pub fn classify(
    language: Language,
    current: Option<&GenerationJob>,
    force_refresh: bool,
) -> DispatchAction {
    match current {
        None => DispatchAction::NeedsSubmit,
        Some(job) if job.audio_status.is_in_flight() => DispatchAction::InFlight,
        Some(job) if job.audio_status == AudioStatus::Ready => {
            if force_refresh && language.is_base() {
                DispatchAction::NeedsSubmit
            } else {
                DispatchAction::AlreadyReady
            }
        }
        // Failed, TimedOut, or a row that never reached submission
        Some(_) => DispatchAction::NeedsSubmit,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyReady,
    InFlight,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub language: Language,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedEntry {
    pub language: Language,
    pub error: String,
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub digest_date: NaiveDate,
    pub submitted: Vec<Language>,
    pub skipped: Vec<SkippedEntry>,
    pub failed: Vec<FailedEntry>,
}

pub struct Dispatcher {
    db: SqlitePool,
    event_bus: EventBus,
    content: Arc<dyn ContentProvider>,
    audio: Arc<dyn AudioJobClient>,
    params: Arc<RwLock<GenerationParameters>>,
    date_locks: DateLocks,
}

impl Dispatcher {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        content: Arc<dyn ContentProvider>,
        audio: Arc<dyn AudioJobClient>,
        params: Arc<RwLock<GenerationParameters>>,
        date_locks: DateLocks,
    ) -> Self {
        Self {
            db,
            event_bus,
            content,
            audio,
            params,
            date_locks,
        }
    }

    /// Ensure every language has audio for the date, submitting where needed
    ///
    /// Individual submission failures do not abort the pass; each becomes a
    /// Failed row eligible for re-dispatch and shows up in the report.
    pub async fn ensure_generated(
        &self,
        digest_date: NaiveDate,
        force_refresh: bool,
    ) -> Result<DispatchReport, DispatchError> {
        let _guard = self.date_locks.acquire(digest_date).await;
        let params = *self.params.read().await;

        self.event_bus.emit_lossy(PolycastEvent::DispatchStarted {
            digest_date,
            force_refresh,
            timestamp: Utc::now(),
        });

        let digest = self.content.get_digest(digest_date, force_refresh).await?;
        info!(date = %digest_date, force_refresh, "Dispatching synthesis jobs");

        let mut report = DispatchReport {
            digest_date,
            submitted: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };

        for language in Language::all() {
            let current = jobs::get_current_job(&self.db, digest_date, language).await?;
            match classify(language, current.as_ref(), force_refresh) {
                DispatchAction::InFlight => {
                    debug!(%language, "Job already in flight, skipping");
                    report.skipped.push(SkippedEntry {
                        language,
                        reason: SkipReason::InFlight,
                    });
                }
                DispatchAction::AlreadyReady => {
                    debug!(%language, "Audio already ready, skipping");
                    report.skipped.push(SkippedEntry {
                        language,
                        reason: SkipReason::AlreadyReady,
                    });
                }
                DispatchAction::NeedsSubmit => {
                    self.submit_language(&digest.content, digest_date, language, params, &mut report)
                        .await;
                }
            }
        }

        self.event_bus.emit_lossy(PolycastEvent::DispatchCompleted {
            digest_date,
            submitted: report.submitted.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
            timestamp: Utc::now(),
        });

        info!(
            date = %digest_date,
            submitted = report.submitted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Dispatch pass complete"
        );

        Ok(report)
    }

    async fn submit_language(
        &self,
        content: &str,
        digest_date: NaiveDate,
        language: Language,
        params: GenerationParameters,
        report: &mut DispatchReport,
    ) {
        match self.audio.submit(content, language, params.duration_tier).await {
            Ok(request_id) => {
                let mut job = GenerationJob::new(digest_date, language);
                job.mark_submitted(request_id.clone());

                if let Err(e) = jobs::insert_job(&self.db, &job).await {
                    warn!(%language, error = %e, "Failed to record submitted job");
                    self.event_bus.emit_lossy(PolycastEvent::DatabaseError {
                        operation: "insert_job".to_string(),
                        error: e.to_string(),
                        retry_attempted: true,
                        timestamp: Utc::now(),
                    });
                    report.failed.push(FailedEntry {
                        language,
                        error: format!(
                            "accepted by audio API as {} but not recorded: {}",
                            request_id, e
                        ),
                    });
                    return;
                }

                self.event_bus.emit_lossy(PolycastEvent::JobSubmitted {
                    job_id: job.job_id,
                    digest_date,
                    language: language.code().to_string(),
                    request_id,
                    timestamp: Utc::now(),
                });

                poller::spawn_poller(
                    self.db.clone(),
                    self.event_bus.clone(),
                    self.audio.clone(),
                    params,
                    job,
                );
                report.submitted.push(language);
            }
            Err(e) => {
                warn!(%language, error = %e, "Synthesis submission failed");

                let mut job = GenerationJob::new(digest_date, language);
                job.mark_failed(e.to_string());
                if let Err(db_err) = jobs::insert_job(&self.db, &job).await {
                    warn!(%language, error = %db_err, "Failed to record submission failure");
                }

                self.event_bus.emit_lossy(PolycastEvent::JobSubmissionFailed {
                    digest_date,
                    language: language.code().to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                report.failed.push(FailedEntry {
                    language,
                    error: e.to_string(),
                });
            }
        }
    }
}
