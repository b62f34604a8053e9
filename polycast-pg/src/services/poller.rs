//! Per-job status poller
//!
//! Each accepted submission gets its own task that waits out the initial
//! delay, then polls the synthesis API until the job settles. All database
//! transitions are guarded, so a poller racing the reconciliation sweep can
//! never produce a second terminal write.

use crate::db::jobs;
use crate::models::{AudioStatus, GenerationJob, GenerationParameters};
use crate::services::audio_client::{AudioJobClient, SynthesisStatus};
use chrono::Utc;
use polycast_common::events::{EventBus, PolycastEvent};
use polycast_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Terminal result of driving one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Audio is ready
    Ready,
    /// The API reported a terminal failure
    Failed,
    /// The poll budget ran out
    TimedOut,
    /// Another writer settled the job first
    AlreadySettled,
}

/// Spawn a background task driving one job to a terminal state
pub fn spawn_poller(
    db: SqlitePool,
    event_bus: EventBus,
    audio: Arc<dyn AudioJobClient>,
    params: GenerationParameters,
    job: GenerationJob,
) -> JoinHandle<PollOutcome> {
    tokio::spawn(async move {
        let outcome = drive_job(&db, &event_bus, audio.as_ref(), &params, &job).await;
        match outcome {
            PollOutcome::Ready => {
                info!(job_id = %job.job_id, language = %job.language, "Job ready")
            }
            PollOutcome::Failed => {
                warn!(job_id = %job.job_id, language = %job.language, "Job failed")
            }
            PollOutcome::TimedOut => {
                warn!(job_id = %job.job_id, language = %job.language, "Job timed out")
            }
            PollOutcome::AlreadySettled => {
                debug!(job_id = %job.job_id, "Job was settled elsewhere")
            }
        }
        outcome
    })
}

/// Poll one job until it settles
///
/// Attempt accounting: each Pending/Processing response consumes one poll
/// attempt. Transient transport errors have their own smaller budget;
/// exhausting it consumes one attempt and resets the transport counter, so
/// a flaky network drains the budget gradually instead of instantly.
pub async fn drive_job(
    db: &SqlitePool,
    event_bus: &EventBus,
    audio: &dyn AudioJobClient,
    params: &GenerationParameters,
    job: &GenerationJob,
) -> PollOutcome {
    let request_id = match job.request_id.clone() {
        Some(id) => id,
        None => {
            warn!(job_id = %job.job_id, "In-flight job has no request id");
            return settle_failed(db, event_bus, job, "missing request id").await;
        }
    };

    tokio::time::sleep(Duration::from_secs(params.poll_initial_delay_secs)).await;

    let mut attempts = job.poll_attempts;
    let mut transport_failures: u32 = 0;
    let mut polling_marked = job.audio_status == AudioStatus::Polling;

    loop {
        match audio.poll_status(&request_id).await {
            Ok(status) => {
                transport_failures = 0;
                match status {
                    SynthesisStatus::Complete {
                        audio_url,
                        duration_seconds,
                    } => {
                        return settle_ready(db, event_bus, job, &audio_url, duration_seconds)
                            .await;
                    }
                    SynthesisStatus::Error { message } => {
                        return settle_failed(db, event_bus, job, &message).await;
                    }
                    SynthesisStatus::Pending | SynthesisStatus::Processing => {
                        if !polling_marked {
                            match jobs::mark_polling(db, job.job_id).await {
                                Ok(true) => polling_marked = true,
                                Ok(false) => {
                                    // Guard missed: POLLING already set, or the row
                                    // is terminal. Stop in the terminal case.
                                    match jobs::get_job(db, job.job_id).await {
                                        Ok(Some(current))
                                            if current.audio_status.is_terminal() =>
                                        {
                                            return PollOutcome::AlreadySettled;
                                        }
                                        _ => polling_marked = true,
                                    }
                                }
                                Err(e) => {
                                    warn!(job_id = %job.job_id, error = %e, "Could not mark job polling")
                                }
                            }
                        }

                        attempts += 1;
                        if let Err(e) = jobs::record_poll_attempt(db, job.job_id, attempts).await
                        {
                            warn!(job_id = %job.job_id, error = %e, "Could not record poll attempt");
                        }

                        if attempts >= params.max_poll_attempts {
                            return settle_timed_out(db, event_bus, job, attempts).await;
                        }
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                transport_failures += 1;
                warn!(
                    job_id = %job.job_id,
                    failures = transport_failures,
                    error = %e,
                    "Transient poll failure"
                );
                if transport_failures >= params.transport_retry_limit {
                    transport_failures = 0;
                    attempts += 1;
                    if attempts >= params.max_poll_attempts {
                        return settle_timed_out(db, event_bus, job, attempts).await;
                    }
                }
            }
            Err(e) => {
                // Definitive API error: bad key, unknown request id
                return settle_failed(db, event_bus, job, &e.to_string()).await;
            }
        }

        tokio::time::sleep(Duration::from_secs(params.poll_interval_secs)).await;
    }
}

/// Restart pollers for jobs that were in flight when the process stopped
pub async fn resume_inflight_jobs(
    db: &SqlitePool,
    event_bus: &EventBus,
    audio: &Arc<dyn AudioJobClient>,
    params: &Arc<RwLock<GenerationParameters>>,
) -> Result<usize> {
    let inflight = jobs::list_inflight(db).await?;
    let count = inflight.len();
    let snapshot = *params.read().await;

    for job in inflight {
        info!(
            job_id = %job.job_id,
            date = %job.digest_date,
            language = %job.language,
            "Resuming poller for in-flight job"
        );
        spawn_poller(db.clone(), event_bus.clone(), audio.clone(), snapshot, job);
    }

    Ok(count)
}

async fn settle_ready(
    db: &SqlitePool,
    event_bus: &EventBus,
    job: &GenerationJob,
    audio_url: &str,
    duration_seconds: f64,
) -> PollOutcome {
    match jobs::complete_job(db, job.job_id, audio_url, duration_seconds).await {
        Ok(true) => {
            event_bus.emit_lossy(PolycastEvent::JobReady {
                job_id: job.job_id,
                digest_date: job.digest_date,
                language: job.language.code().to_string(),
                audio_url: audio_url.to_string(),
                duration_seconds,
                timestamp: Utc::now(),
            });
            PollOutcome::Ready
        }
        Ok(false) => PollOutcome::AlreadySettled,
        Err(e) => {
            // The audio exists even though the row update failed; the sweep
            // will reconcile the row later.
            error!(job_id = %job.job_id, error = %e, "Could not record ready job");
            report_db_error(event_bus, "complete_job", &e);
            PollOutcome::Ready
        }
    }
}

async fn settle_failed(
    db: &SqlitePool,
    event_bus: &EventBus,
    job: &GenerationJob,
    message: &str,
) -> PollOutcome {
    match jobs::fail_job(db, job.job_id, message).await {
        Ok(true) => {
            event_bus.emit_lossy(PolycastEvent::JobFailed {
                job_id: job.job_id,
                digest_date: job.digest_date,
                language: job.language.code().to_string(),
                error: message.to_string(),
                timestamp: Utc::now(),
            });
            PollOutcome::Failed
        }
        Ok(false) => PollOutcome::AlreadySettled,
        Err(e) => {
            error!(job_id = %job.job_id, error = %e, "Could not record failed job");
            report_db_error(event_bus, "fail_job", &e);
            PollOutcome::Failed
        }
    }
}

async fn settle_timed_out(
    db: &SqlitePool,
    event_bus: &EventBus,
    job: &GenerationJob,
    attempts: u32,
) -> PollOutcome {
    match jobs::time_out_job(db, job.job_id, attempts).await {
        Ok(true) => {
            event_bus.emit_lossy(PolycastEvent::JobTimedOut {
                job_id: job.job_id,
                digest_date: job.digest_date,
                language: job.language.code().to_string(),
                attempts,
                timestamp: Utc::now(),
            });
            PollOutcome::TimedOut
        }
        Ok(false) => PollOutcome::AlreadySettled,
        Err(e) => {
            error!(job_id = %job.job_id, error = %e, "Could not record timed out job");
            report_db_error(event_bus, "time_out_job", &e);
            PollOutcome::TimedOut
        }
    }
}

fn report_db_error(event_bus: &EventBus, operation: &str, error: &polycast_common::Error) {
    event_bus.emit_lossy(PolycastEvent::DatabaseError {
        operation: operation.to_string(),
        error: error.to_string(),
        retry_attempted: true,
        timestamp: Utc::now(),
    });
}
