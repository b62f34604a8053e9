//! Background services and external API clients

pub mod aggregator;
pub mod audio_client;
pub mod content_client;
pub mod dispatcher;
pub mod poller;
pub mod sweep;
