//! # Polycast Common Library
//!
//! Shared code for Polycast services including:
//! - Event types (PolycastEvent enum) and the EventBus
//! - Configuration loading and data folder resolution
//! - Database pool setup and lock-retry helpers
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
