//! Shared database helpers
//!
//! Pool initialization and the lock-retry wrapper used by every module that
//! writes to a SQLite database.

pub mod init;
pub mod retry;

pub use init::{create_settings_table, open_database_pool};
pub use retry::retry_on_lock;
