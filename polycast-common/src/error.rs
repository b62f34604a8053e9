//! Error taxonomy shared by the Polycast service crates
//!
//! This is the error type the database and configuration helpers return and
//! the service crates convert into their HTTP envelopes. Failures specific
//! to one external collaborator (digest API, synthesis API) live in client
//! enums next to those clients, not here.

use thiserror::Error;

/// Result alias used by the shared helpers and the job store
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure surfaced through sqlx. The lock-retry helper matches
    /// on this variant to recognize "database is locked" contention.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure from code that propagates std::io errors directly
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// polycast.toml could not be loaded or written, or the data folder
    /// could not be created
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced job or setting does not exist; the API layer maps this
    /// to 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected request value; the API layer maps this to 400
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// State that should not occur, such as a stored row that fails to
    /// decode
    #[error("Internal error: {0}")]
    Internal(String),
}
