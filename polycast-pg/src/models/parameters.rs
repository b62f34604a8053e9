//! Runtime-tunable generation parameters
//!
//! Persisted in the settings table and adjustable over the HTTP API without
//! a restart. Pollers snapshot the values when they start; the sweep service
//! re-reads them each cycle.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Requested podcast length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationTier {
    Brief,
    Standard,
    Extended,
}

impl DurationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationTier::Brief => "brief",
            DurationTier::Standard => "standard",
            DurationTier::Extended => "extended",
        }
    }
}

impl std::fmt::Display for DurationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DurationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brief" => Ok(DurationTier::Brief),
            "standard" => Ok(DurationTier::Standard),
            "extended" => Ok(DurationTier::Extended),
            other => Err(format!("unknown duration tier: {}", other)),
        }
    }
}

/// Tunable knobs for dispatch, polling and the reconciliation sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Delay before the first status poll after submission
    pub poll_initial_delay_secs: u64,
    /// Delay between status polls
    pub poll_interval_secs: u64,
    /// Poll budget; exhausting it marks the job TIMED_OUT
    pub max_poll_attempts: u32,
    /// Consecutive transport failures tolerated before they cost a poll attempt
    pub transport_retry_limit: u32,
    /// Age in seconds after which an in-flight job counts as stale
    pub stale_after_secs: i64,
    /// Interval between background sweep cycles
    pub sweep_interval_secs: u64,
    /// Length tier passed to the synthesis API
    pub duration_tier: DurationTier,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            poll_initial_delay_secs: 5,
            poll_interval_secs: 10,
            max_poll_attempts: 90,
            transport_retry_limit: 3,
            stale_after_secs: 900,
            sweep_interval_secs: 300,
            duration_tier: DurationTier::Standard,
        }
    }
}
