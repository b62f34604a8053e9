//! Event types for the Polycast event system
//!
//! Provides shared event definitions and EventBus for all Polycast services.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Polycast event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// All events use this central enum for type safety and exhaustive matching.
///
/// Payloads carry primitives (dates, UUIDs, language codes as strings) so that
/// this crate stays independent of service-local model types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolycastEvent {
    /// A dispatch pass started for a date
    ///
    /// Triggers:
    /// - SSE: Show dispatch-in-progress indicator
    DispatchStarted {
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Whether the digest was force-regenerated
        force_refresh: bool,
        /// When the pass started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A synthesis job was submitted to the external audio API
    ///
    /// Triggers:
    /// - SSE: Show per-language submission state
    JobSubmitted {
        /// Job row UUID
        job_id: Uuid,
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Language code ("en", "es", ...)
        language: String,
        /// External request identifier returned by the audio API
        request_id: String,
        /// When the submission succeeded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Submitting a synthesis job failed; the language is recorded as Failed
    ///
    /// Triggers:
    /// - SSE: Show per-language failure state
    /// - Operators: Eligible for manual re-dispatch
    JobSubmissionFailed {
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Language code
        language: String,
        /// Submission error message
        error: String,
        /// When the submission failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job reached Ready with a playable audio URL
    ///
    /// Triggers:
    /// - SSE: Update per-language status to ready
    JobReady {
        /// Job row UUID
        job_id: Uuid,
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Language code
        language: String,
        /// URL of the synthesized audio
        audio_url: String,
        /// Duration of the synthesized audio in seconds
        duration_seconds: f64,
        /// When the job completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job reached Failed (external API reported a terminal error)
    JobFailed {
        /// Job row UUID
        job_id: Uuid,
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Language code
        language: String,
        /// Error reported by the external API
        error: String,
        /// When the failure was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A job exhausted its poll-attempt budget without a terminal status
    JobTimedOut {
        /// Job row UUID
        job_id: Uuid,
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Language code
        language: String,
        /// Poll attempts consumed before giving up
        attempts: u32,
        /// When the timeout was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dispatch pass finished; summary counts per classification
    ///
    /// Triggers:
    /// - SSE: Refresh per-date status view
    DispatchCompleted {
        /// Date the digest covers
        digest_date: NaiveDate,
        /// Languages submitted this pass
        submitted: usize,
        /// Languages skipped (already ready or in flight)
        skipped: usize,
        /// Languages whose submission failed
        failed: usize,
        /// When the pass finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A reconciliation sweep finished for a date
    SweepCompleted {
        /// Date swept
        digest_date: NaiveDate,
        /// Stale in-flight jobs found
        stale_found: usize,
        /// Jobs moved to a terminal state by the sweep
        updated: usize,
        /// When the sweep finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Database error occurred
    ///
    /// Triggers:
    /// - Error logging
    /// - SSE: Show error notification
    DatabaseError {
        /// Database operation that failed
        operation: String,
        /// Error message
        error: String,
        /// Whether retry was attempted
        retry_attempted: bool,
        /// When error occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PolycastEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PolycastEvent::DispatchStarted { .. } => "DispatchStarted",
            PolycastEvent::JobSubmitted { .. } => "JobSubmitted",
            PolycastEvent::JobSubmissionFailed { .. } => "JobSubmissionFailed",
            PolycastEvent::JobReady { .. } => "JobReady",
            PolycastEvent::JobFailed { .. } => "JobFailed",
            PolycastEvent::JobTimedOut { .. } => "JobTimedOut",
            PolycastEvent::DispatchCompleted { .. } => "DispatchCompleted",
            PolycastEvent::SweepCompleted { .. } => "SweepCompleted",
            PolycastEvent::DatabaseError { .. } => "DatabaseError",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Capacity Recommendations
///
/// - Development/Desktop: 1000
/// - Constrained hosts: 500
/// - Testing: 10-100
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PolycastEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after subscription.
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PolycastEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PolycastEvent,
    ) -> Result<usize, broadcast::error::SendError<PolycastEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// This is useful for non-critical events where it's acceptable if
    /// no component is currently listening.
    pub fn emit_lossy(&self, event: PolycastEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
