//! Integration tests for the dispatch pass
//!
//! Covers fresh fan-out, skip classification on re-dispatch, the content
//! gate, partial submission failure, and force refresh semantics.

use async_trait::async_trait;
use chrono::NaiveDate;
use polycast_common::events::{EventBus, PolycastEvent};
use polycast_pg::db::{self, jobs};
use polycast_pg::models::{
    AudioStatus, DurationTier, GenerationJob, GenerationParameters, Language,
};
use polycast_pg::services::audio_client::{AudioApiError, AudioJobClient, SynthesisStatus};
use polycast_pg::services::content_client::{ContentError, ContentProvider, DigestContent};
use polycast_pg::services::dispatcher::{DispatchError, Dispatcher, SkipReason};
use polycast_pg::state::DateLocks;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

fn sample_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::create_schema(&pool).await.unwrap();
    pool
}

/// Long initial delay keeps spawned pollers asleep for the test duration
fn test_params() -> GenerationParameters {
    GenerationParameters {
        poll_initial_delay_secs: 60,
        ..Default::default()
    }
}

struct StaticContent {
    ready: bool,
}

#[async_trait]
impl ContentProvider for StaticContent {
    async fn get_digest(
        &self,
        date: NaiveDate,
        _force_refresh: bool,
    ) -> Result<DigestContent, ContentError> {
        if self.ready {
            Ok(DigestContent {
                digest_date: date,
                content: "Today in the news...".to_string(),
            })
        } else {
            Err(ContentError::NotReady(date))
        }
    }
}

/// Submissions succeed with generated request ids unless the language is
/// listed as failing; polls always report pending.
struct ScriptedAudio {
    fail_languages: Vec<Language>,
    counter: AtomicUsize,
}

impl ScriptedAudio {
    fn new(fail_languages: Vec<Language>) -> Arc<Self> {
        Arc::new(Self {
            fail_languages,
            counter: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AudioJobClient for ScriptedAudio {
    async fn submit(
        &self,
        _content: &str,
        language: Language,
        _tier: DurationTier,
    ) -> Result<String, AudioApiError> {
        if self.fail_languages.contains(&language) {
            return Err(AudioApiError::Status {
                status: 400,
                message: "unsupported voice".to_string(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("req-{}-{}", language.code(), n))
    }

    async fn poll_status(&self, _request_id: &str) -> Result<SynthesisStatus, AudioApiError> {
        Ok(SynthesisStatus::Pending)
    }
}

fn build_dispatcher(
    pool: &SqlitePool,
    content: Arc<dyn ContentProvider>,
    audio: Arc<dyn AudioJobClient>,
) -> (Dispatcher, EventBus) {
    let event_bus = EventBus::new(64);
    let dispatcher = Dispatcher::new(
        pool.clone(),
        event_bus.clone(),
        content,
        audio,
        Arc::new(RwLock::new(test_params())),
        DateLocks::new(),
    );
    (dispatcher, event_bus)
}

fn drain_events(rx: &mut broadcast::Receiver<PolycastEvent>) -> Vec<PolycastEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Dispatch Tests (tc_i_dispatch_001-006)
// ============================================================================

#[tokio::test]
async fn test_fresh_dispatch_submits_all_languages() {
    // tc_i_dispatch_001: Fresh date fans out to every language
    let pool = test_pool().await;
    let (dispatcher, event_bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: true }),
        ScriptedAudio::new(vec![]),
    );
    let mut rx = event_bus.subscribe();

    // Step 1: dispatch a date with no history
    let report = dispatcher.ensure_generated(sample_date(), false).await.unwrap();

    assert_eq!(report.submitted.len(), 7);
    assert!(report.skipped.is_empty());
    assert!(report.failed.is_empty());

    // Step 2: every language has a SUBMITTED row with a request id
    for language in Language::all() {
        let job = jobs::get_current_job(&pool, sample_date(), language)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.audio_status, AudioStatus::Submitted);
        assert!(job.request_id.is_some());
        assert!(job.submitted_at.is_some());
    }

    // Step 3: event stream saw the pass start, each submission, and the summary
    let events = drain_events(&mut rx);
    assert!(matches!(events.first(), Some(PolycastEvent::DispatchStarted { .. })));
    let submitted_events = events
        .iter()
        .filter(|e| matches!(e, PolycastEvent::JobSubmitted { .. }))
        .count();
    assert_eq!(submitted_events, 7);
    match events.last() {
        Some(PolycastEvent::DispatchCompleted {
            submitted,
            skipped,
            failed,
            ..
        }) => {
            assert_eq!(*submitted, 7);
            assert_eq!(*skipped, 0);
            assert_eq!(*failed, 0);
        }
        other => panic!("expected DispatchCompleted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redispatch_skips_ready_and_inflight() {
    // tc_i_dispatch_002: Second pass retries failures, skips the rest
    let pool = test_pool().await;

    // Step 1: seed history - en ready, es in flight, fr failed
    let mut ready = GenerationJob::new(sample_date(), Language::En);
    ready.mark_submitted("req-en-0".to_string());
    ready.mark_ready("https://cdn.example.com/en.mp3".to_string(), 290.0);
    jobs::insert_job(&pool, &ready).await.unwrap();

    let mut inflight = GenerationJob::new(sample_date(), Language::Es);
    inflight.mark_submitted("req-es-0".to_string());
    jobs::insert_job(&pool, &inflight).await.unwrap();

    let mut failed = GenerationJob::new(sample_date(), Language::Fr);
    failed.mark_failed("first attempt failed");
    jobs::insert_job(&pool, &failed).await.unwrap();

    // Step 2: dispatch again
    let (dispatcher, _bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: true }),
        ScriptedAudio::new(vec![]),
    );
    let report = dispatcher.ensure_generated(sample_date(), false).await.unwrap();

    // fr is retried along with the four untouched languages
    assert_eq!(report.submitted.len(), 5);
    assert!(report.submitted.contains(&Language::Fr));
    assert!(!report.submitted.contains(&Language::En));
    assert!(!report.submitted.contains(&Language::Es));

    let en_skip = report
        .skipped
        .iter()
        .find(|s| s.language == Language::En)
        .unwrap();
    assert_eq!(en_skip.reason, SkipReason::AlreadyReady);

    let es_skip = report
        .skipped
        .iter()
        .find(|s| s.language == Language::Es)
        .unwrap();
    assert_eq!(es_skip.reason, SkipReason::InFlight);

    // Step 3: fr now has a fresh in-flight row; the ready row is untouched
    let fr = jobs::get_current_job(&pool, sample_date(), Language::Fr)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fr.audio_status, AudioStatus::Submitted);

    let en = jobs::get_current_job(&pool, sample_date(), Language::En)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(en.audio_status, AudioStatus::Ready);
}

#[tokio::test]
async fn test_unready_content_aborts_before_any_submission() {
    // tc_i_dispatch_003: No digest means no submissions at all
    let pool = test_pool().await;
    let (dispatcher, _bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: false }),
        ScriptedAudio::new(vec![]),
    );

    let result = dispatcher.ensure_generated(sample_date(), false).await;
    assert!(matches!(result, Err(DispatchError::ContentNotReady(d)) if d == sample_date()));

    // No job rows were created
    let rows = jobs::list_jobs_for_date(&pool, sample_date()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_submission_failure_is_isolated_and_retryable() {
    // tc_i_dispatch_004: One rejected language never blocks the others
    let pool = test_pool().await;

    // Step 1: the synthesis API rejects Japanese
    let (dispatcher, event_bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: true }),
        ScriptedAudio::new(vec![Language::Ja]),
    );
    let mut rx = event_bus.subscribe();

    let report = dispatcher.ensure_generated(sample_date(), false).await.unwrap();

    assert_eq!(report.submitted.len(), 6);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].language, Language::Ja);

    let ja = jobs::get_current_job(&pool, sample_date(), Language::Ja)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ja.audio_status, AudioStatus::Failed);
    assert!(ja.error_message.as_deref().unwrap().contains("unsupported voice"));

    let failure_events = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PolycastEvent::JobSubmissionFailed { .. }))
        .count();
    assert_eq!(failure_events, 1);

    // Step 2: a later dispatch with a healthy API retries only Japanese
    let (retry_dispatcher, _bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: true }),
        ScriptedAudio::new(vec![]),
    );
    let retry_report = retry_dispatcher
        .ensure_generated(sample_date(), false)
        .await
        .unwrap();

    assert_eq!(retry_report.submitted, vec![Language::Ja]);
    assert_eq!(retry_report.skipped.len(), 6);
    assert!(retry_report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::InFlight));
}

#[tokio::test]
async fn test_force_refresh_resubmits_base_language_only() {
    // tc_i_dispatch_005: Force refresh regenerates the base language only
    let pool = test_pool().await;

    // Step 1: every language already has ready audio
    for language in Language::all() {
        let mut job = GenerationJob::new(sample_date(), language);
        job.mark_submitted(format!("req-{}-0", language.code()));
        job.mark_ready(
            format!("https://cdn.example.com/{}.mp3", language.code()),
            300.0,
        );
        jobs::insert_job(&pool, &job).await.unwrap();
    }

    // Step 2: force refresh
    let (dispatcher, _bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: true }),
        ScriptedAudio::new(vec![]),
    );
    let report = dispatcher.ensure_generated(sample_date(), true).await.unwrap();

    assert_eq!(report.submitted, vec![Language::En]);
    assert_eq!(report.skipped.len(), 6);
    assert!(report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::AlreadyReady));

    // Step 3: the base language has a new in-flight row; translations are untouched
    let en = jobs::get_current_job(&pool, sample_date(), Language::En)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(en.audio_status, AudioStatus::Submitted);

    let en_rows: Vec<_> = jobs::list_jobs_for_date(&pool, sample_date())
        .await
        .unwrap()
        .into_iter()
        .filter(|j| j.language == Language::En)
        .collect();
    assert_eq!(en_rows.len(), 2);

    let ja = jobs::get_current_job(&pool, sample_date(), Language::Ja)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ja.audio_status, AudioStatus::Ready);
}

#[tokio::test]
async fn test_immediate_redispatch_submits_nothing() {
    // tc_i_dispatch_006: Dispatch is idempotent while jobs are in flight
    let pool = test_pool().await;
    let (dispatcher, _bus) = build_dispatcher(
        &pool,
        Arc::new(StaticContent { ready: true }),
        ScriptedAudio::new(vec![]),
    );

    let first = dispatcher.ensure_generated(sample_date(), false).await.unwrap();
    assert_eq!(first.submitted.len(), 7);

    let second = dispatcher.ensure_generated(sample_date(), false).await.unwrap();
    assert!(second.submitted.is_empty());
    assert!(second.failed.is_empty());
    assert_eq!(second.skipped.len(), 7);
    assert!(second
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::InFlight));

    // Still exactly one row per language
    let rows = jobs::list_jobs_for_date(&pool, sample_date()).await.unwrap();
    assert_eq!(rows.len(), 7);
}
