//! Generation job model
//!
//! One row per audio synthesis attempt for a (digest date, language) pair.
//! Resubmission after a failure creates a new row; the newest row for a pair
//! is the current one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Languages the podcast is produced in
///
/// The first entry is the base language the digest is written in; the rest
/// are translation targets. Ordering is the stable presentation order used
/// by the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
    Fr,
    De,
    Pt,
    Ja,
    Ko,
}

impl Language {
    /// All supported languages in presentation order
    pub fn all() -> [Language; 7] {
        [
            Language::En,
            Language::Es,
            Language::Fr,
            Language::De,
            Language::Pt,
            Language::Ja,
            Language::Ko,
        ]
    }

    /// ISO 639-1 code used in API payloads and database rows
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::Pt => "pt",
            Language::Ja => "ja",
            Language::Ko => "ko",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        match code {
            "en" => Some(Language::En),
            "es" => Some(Language::Es),
            "fr" => Some(Language::Fr),
            "de" => Some(Language::De),
            "pt" => Some(Language::Pt),
            "ja" => Some(Language::Ja),
            "ko" => Some(Language::Ko),
            _ => None,
        }
    }

    /// The digest is authored in the base language; translations derive from it
    pub fn is_base(&self) -> bool {
        matches!(self, Language::En)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Whether digest text exists for the language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Missing,
    Ready,
}

/// Audio synthesis lifecycle state
///
/// Transitions are forward-only:
/// - `None` -> `Submitted` (job accepted by the synthesis API)
/// - `Submitted` -> `Polling` (first status poll issued)
/// - `Submitted`/`Polling` -> `Ready` | `Failed` | `TimedOut` (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioStatus {
    None,
    Submitted,
    Polling,
    Ready,
    Failed,
    TimedOut,
}

impl AudioStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AudioStatus::Ready | AudioStatus::Failed | AudioStatus::TimedOut
        )
    }

    /// In-flight states have a live synthesis request behind them
    pub fn is_in_flight(&self) -> bool {
        matches!(self, AudioStatus::Submitted | AudioStatus::Polling)
    }
}

/// One audio generation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_id: Uuid,
    pub digest_date: NaiveDate,
    pub language: Language,
    pub content_status: ContentStatus,
    pub audio_status: AudioStatus,
    /// Identifier assigned by the synthesis API on submission
    pub request_id: Option<String>,
    pub audio_url: Option<String>,
    pub audio_duration_seconds: Option<f64>,
    pub error_message: Option<String>,
    pub poll_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Create a new job for a date/language pair, not yet submitted
    pub fn new(digest_date: NaiveDate, language: Language) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            digest_date,
            language,
            content_status: ContentStatus::Ready,
            audio_status: AudioStatus::None,
            request_id: None,
            audio_url: None,
            audio_duration_seconds: None,
            error_message: None,
            poll_attempts: 0,
            created_at: Utc::now(),
            submitted_at: None,
            completed_at: None,
        }
    }

    pub fn mark_submitted(&mut self, request_id: String) {
        self.audio_status = AudioStatus::Submitted;
        self.request_id = Some(request_id);
        self.submitted_at = Some(Utc::now());
    }

    pub fn mark_polling(&mut self) {
        self.audio_status = AudioStatus::Polling;
    }

    pub fn mark_ready(&mut self, audio_url: String, duration_seconds: f64) {
        self.audio_status = AudioStatus::Ready;
        self.audio_url = Some(audio_url);
        self.audio_duration_seconds = Some(duration_seconds);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.audio_status = AudioStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_timed_out(&mut self) {
        self.audio_status = AudioStatus::TimedOut;
        self.completed_at = Some(Utc::now());
    }
}
