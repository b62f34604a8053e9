//! Shared application state

use crate::models::GenerationParameters;
use crate::services::audio_client::AudioJobClient;
use crate::services::content_client::ContentProvider;
use crate::services::dispatcher::Dispatcher;
use chrono::{DateTime, NaiveDate, Utc};
use polycast_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Per-date mutexes serializing dispatch and sweep for the same date
///
/// Entries are created on demand and kept for the process lifetime; the set
/// of touched dates stays small.
#[derive(Clone, Default)]
pub struct DateLocks {
    inner: Arc<RwLock<HashMap<NaiveDate, Arc<Mutex<()>>>>>,
}

impl DateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a date, waiting if another task holds it
    pub async fn acquire(&self, date: NaiveDate) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.write().await;
            map.entry(date)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}

/// State shared across API handlers and background services
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub content: Arc<dyn ContentProvider>,
    pub audio: Arc<dyn AudioJobClient>,
    pub params: Arc<RwLock<GenerationParameters>>,
    pub date_locks: DateLocks,
    pub dispatcher: Arc<Dispatcher>,
    pub startup_time: DateTime<Utc>,
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Remember the most recent operational error for the health report
    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}
