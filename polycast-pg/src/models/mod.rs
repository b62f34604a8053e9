//! Data models for podcast generation

pub mod generation_job;
pub mod parameters;

pub use generation_job::{AudioStatus, ContentStatus, GenerationJob, Language};
pub use parameters::{DurationTier, GenerationParameters};
