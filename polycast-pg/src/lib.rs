//! # Polycast Podcast Generation Module
//!
//! Turns the daily news digest into per-language podcast audio by driving
//! an external asynchronous synthesis API:
//!
//! - **Dispatch**: fetch the digest for a date, submit one synthesis job per
//!   supported language, skip work that is done or in flight
//! - **Polling**: one background task per job polls the API until the job
//!   settles as ready, failed, or timed out
//! - **Reconciliation**: a periodic sweep re-checks jobs whose pollers died
//! - **Status**: a per-date, per-language report for operators
//!
//! State lives in SQLite; job status transitions are guarded in SQL so
//! concurrent writers cannot double-settle a job.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
