//! Reconciliation sweep for stuck jobs
//!
//! A poller can die without settling its row (process crash, redeploy mid
//! poll). Rows stuck in SUBMITTED or POLLING past the staleness window are
//! re-checked directly against the synthesis API and settled when the API
//! has an answer. Jobs the API reports as still in progress are left alone.

use crate::db::jobs;
use crate::models::GenerationParameters;
use crate::services::audio_client::{AudioJobClient, SynthesisStatus};
use crate::state::DateLocks;
use chrono::{NaiveDate, Utc};
use polycast_common::events::{EventBus, PolycastEvent};
use polycast_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Outcome of sweeping one date
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub digest_date: NaiveDate,
    pub stale_found: usize,
    pub updated: usize,
}

/// Re-check stale in-flight jobs for a date against the synthesis API
///
/// Takes the per-date lock, so a sweep never interleaves with a dispatch
/// pass for the same date. Updates are guarded; losing a race to a live
/// poller just means nothing to do.
pub async fn sweep_date(
    db: &SqlitePool,
    event_bus: &EventBus,
    audio: &dyn AudioJobClient,
    params: &GenerationParameters,
    date_locks: &DateLocks,
    digest_date: NaiveDate,
) -> Result<SweepReport> {
    let _guard = date_locks.acquire(digest_date).await;

    let cutoff = Utc::now() - chrono::Duration::seconds(params.stale_after_secs);
    let stale = jobs::list_stale_inflight(db, digest_date, cutoff).await?;
    let stale_found = stale.len();
    let mut updated = 0;

    for job in &stale {
        let request_id = match &job.request_id {
            Some(id) => id,
            None => {
                // A submitted row with no request id can never make progress
                if jobs::fail_job(db, job.job_id, "stale job with no request id").await? {
                    event_bus.emit_lossy(PolycastEvent::JobFailed {
                        job_id: job.job_id,
                        digest_date: job.digest_date,
                        language: job.language.code().to_string(),
                        error: "stale job with no request id".to_string(),
                        timestamp: Utc::now(),
                    });
                    updated += 1;
                }
                continue;
            }
        };

        match audio.poll_status(request_id).await {
            Ok(SynthesisStatus::Complete {
                audio_url,
                duration_seconds,
            }) => {
                if jobs::complete_job(db, job.job_id, &audio_url, duration_seconds).await? {
                    info!(
                        job_id = %job.job_id,
                        language = %job.language,
                        "Sweep recovered a completed job"
                    );
                    event_bus.emit_lossy(PolycastEvent::JobReady {
                        job_id: job.job_id,
                        digest_date: job.digest_date,
                        language: job.language.code().to_string(),
                        audio_url,
                        duration_seconds,
                        timestamp: Utc::now(),
                    });
                    updated += 1;
                }
            }
            Ok(SynthesisStatus::Error { message }) => {
                if jobs::fail_job(db, job.job_id, &message).await? {
                    event_bus.emit_lossy(PolycastEvent::JobFailed {
                        job_id: job.job_id,
                        digest_date: job.digest_date,
                        language: job.language.code().to_string(),
                        error: message,
                        timestamp: Utc::now(),
                    });
                    updated += 1;
                }
            }
            Ok(SynthesisStatus::Pending) | Ok(SynthesisStatus::Processing) => {
                debug!(job_id = %job.job_id, "Stale job still in progress on the API side");
            }
            Err(e) => {
                // Leave the row for the next cycle
                warn!(job_id = %job.job_id, error = %e, "Could not re-check stale job");
            }
        }
    }

    event_bus.emit_lossy(PolycastEvent::SweepCompleted {
        digest_date,
        stale_found,
        updated,
        timestamp: Utc::now(),
    });

    Ok(SweepReport {
        digest_date,
        stale_found,
        updated,
    })
}

/// Background service sweeping recent dates on an interval
pub struct SweepService {
    db: SqlitePool,
    event_bus: EventBus,
    audio: Arc<dyn AudioJobClient>,
    params: Arc<RwLock<GenerationParameters>>,
    date_locks: DateLocks,
    last_error: Arc<RwLock<Option<String>>>,
}

impl SweepService {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        audio: Arc<dyn AudioJobClient>,
        params: Arc<RwLock<GenerationParameters>>,
        date_locks: DateLocks,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            event_bus,
            audio,
            params,
            date_locks,
            last_error,
        })
    }

    /// Run forever, sweeping today and yesterday each cycle
    ///
    /// The first cycle runs immediately at startup so jobs orphaned by the
    /// previous process get reconciled without waiting a full interval.
    pub async fn run(self: Arc<Self>) {
        let mut interval_secs = self.params.read().await.sweep_interval_secs;
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval_secs, "Sweep service started");

        loop {
            ticker.tick().await;

            let params = *self.params.read().await;
            let today = Utc::now().date_naive();
            let dates = match today.pred_opt() {
                Some(yesterday) => vec![today, yesterday],
                None => vec![today],
            };

            for date in dates {
                match sweep_date(
                    &self.db,
                    &self.event_bus,
                    self.audio.as_ref(),
                    &params,
                    &self.date_locks,
                    date,
                )
                .await
                {
                    Ok(report) if report.stale_found > 0 => {
                        info!(
                            date = %date,
                            stale_found = report.stale_found,
                            updated = report.updated,
                            "Sweep settled stale jobs"
                        );
                    }
                    Ok(_) => debug!(date = %date, "Sweep found nothing stale"),
                    Err(e) => {
                        error!(date = %date, error = %e, "Sweep failed");
                        *self.last_error.write().await = Some(format!("sweep {}: {}", date, e));
                    }
                }
            }

            // Pick up interval changes made over the API
            let configured = self.params.read().await.sweep_interval_secs;
            if configured != interval_secs {
                interval_secs = configured;
                ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                info!(interval_secs, "Sweep interval updated");
            }
        }
    }
}
