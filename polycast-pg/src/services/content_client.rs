//! Digest content API client
//!
//! The digest service owns the daily news digest text. Generation cannot
//! start until the digest for a date is ready; `force_refresh` asks the
//! digest service to regenerate before returning.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// No ready digest exists for the date
    #[error("No ready digest for {0}")]
    NotReady(NaiveDate),

    #[error("Content API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid content API response: {0}")]
    InvalidResponse(String),
}

/// Digest text ready for synthesis
#[derive(Debug, Clone)]
pub struct DigestContent {
    pub digest_date: NaiveDate,
    pub content: String,
}

/// Source of the daily news digest
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Fetch the digest for a date, optionally forcing regeneration first
    async fn get_digest(
        &self,
        date: NaiveDate,
        force_refresh: bool,
    ) -> Result<DigestContent, ContentError>;
}

#[derive(Debug, Deserialize)]
struct DigestResponse {
    ready: bool,
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpContentProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentProvider {
    pub fn new(base_url: String) -> Result<Self, ContentError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("polycast-pg/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentProvider for HttpContentProvider {
    async fn get_digest(
        &self,
        date: NaiveDate,
        force_refresh: bool,
    ) -> Result<DigestContent, ContentError> {
        let url = format!("{}/digest/{}", self.base_url, date);
        let response = self
            .client
            .get(&url)
            .query(&[("force_refresh", force_refresh)])
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                let body: DigestResponse = response
                    .json()
                    .await
                    .map_err(|e| ContentError::InvalidResponse(e.to_string()))?;

                if !body.ready {
                    return Err(ContentError::NotReady(date));
                }

                let content = body
                    .content
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        ContentError::InvalidResponse("ready digest with empty content".to_string())
                    })?;

                Ok(DigestContent {
                    digest_date: date,
                    content,
                })
            }
            404 => Err(ContentError::NotReady(date)),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ContentError::Status { status, message })
            }
        }
    }
}
