//! Audio synthesis API client
//!
//! Synthesis is asynchronous on the API side: a submission returns a request
//! id immediately and the caller polls for completion. The API reports
//! progress as a numeric status code:
//!
//! - `0` - queued, not started
//! - `5` - translation/synthesis in progress
//! - `100` - complete, audio available
//! - anything else - failed
//!
//! Requests are spaced out by a small rate limiter to stay inside the
//! provider quota; all pollers share one client instance.

use crate::models::{DurationTier, Language};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Minimum spacing between requests to the synthesis API
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum AudioApiError {
    #[error("Audio API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid audio API key")]
    InvalidApiKey,

    #[error("Audio API rate limit exceeded")]
    RateLimitExceeded,

    #[error("Audio API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid audio API response: {0}")]
    InvalidResponse(String),
}

impl AudioApiError {
    /// Transient errors worth retrying; everything else is definitive
    pub fn is_retryable(&self) -> bool {
        match self {
            AudioApiError::Transport(_) | AudioApiError::RateLimitExceeded => true,
            AudioApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Synthesis job progress as reported by the API
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisStatus {
    Pending,
    Processing,
    Complete {
        audio_url: String,
        duration_seconds: f64,
    },
    Error {
        message: String,
    },
}

/// Client for the asynchronous synthesis API
#[async_trait]
pub trait AudioJobClient: Send + Sync {
    /// Submit digest text for synthesis in a target language
    async fn submit(
        &self,
        content: &str,
        language: Language,
        tier: DurationTier,
    ) -> Result<String, AudioApiError>;

    /// Poll the status of a previously submitted request
    async fn poll_status(&self, request_id: &str) -> Result<SynthesisStatus, AudioApiError>;
}

/// Enforces minimum spacing between API requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: i64,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Map the numeric API status code onto a synthesis status
fn translate(response: StatusResponse) -> Result<SynthesisStatus, AudioApiError> {
    match response.status_code {
        0 => Ok(SynthesisStatus::Pending),
        5 => Ok(SynthesisStatus::Processing),
        100 => {
            let audio_url = response.audio_url.ok_or_else(|| {
                AudioApiError::InvalidResponse("complete status without audio_url".to_string())
            })?;
            Ok(SynthesisStatus::Complete {
                audio_url,
                duration_seconds: response.duration_seconds.unwrap_or(0.0),
            })
        }
        other => Ok(SynthesisStatus::Error {
            message: response
                .error_message
                .unwrap_or_else(|| format!("synthesis failed with status code {}", other)),
        }),
    }
}

pub struct HttpAudioJobClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: RateLimiter,
}

impl HttpAudioJobClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, AudioApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("polycast-pg/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl AudioJobClient for HttpAudioJobClient {
    async fn submit(
        &self,
        content: &str,
        language: Language,
        tier: DurationTier,
    ) -> Result<String, AudioApiError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/synthesize", self.base_url);
        let response = self
            .request(self.client.post(&url))
            .json(&json!({
                "content": content,
                "language": language.code(),
                "duration_tier": tier.as_str(),
            }))
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 | 202 => {
                let body: SubmitResponse = response
                    .json()
                    .await
                    .map_err(|e| AudioApiError::InvalidResponse(e.to_string()))?;
                Ok(body.request_id)
            }
            401 | 403 => Err(AudioApiError::InvalidApiKey),
            429 | 503 => Err(AudioApiError::RateLimitExceeded),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(AudioApiError::Status { status, message })
            }
        }
    }

    async fn poll_status(&self, request_id: &str) -> Result<SynthesisStatus, AudioApiError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/synthesize/{}", self.base_url, request_id);
        let response = self.request(self.client.get(&url)).send().await?;

        match response.status().as_u16() {
            200 => {
                let body: StatusResponse = response
                    .json()
                    .await
                    .map_err(|e| AudioApiError::InvalidResponse(e.to_string()))?;
                translate(body)
            }
            401 | 403 => Err(AudioApiError::InvalidApiKey),
            429 | 503 => Err(AudioApiError::RateLimitExceeded),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(AudioApiError::Status { status, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_translate_progress_codes() {
        let pending = StatusResponse {
            status_code: 0,
            audio_url: None,
            duration_seconds: None,
            error_message: None,
        };
        assert_eq!(translate(pending).unwrap(), SynthesisStatus::Pending);

        let processing = StatusResponse {
            status_code: 5,
            audio_url: None,
            duration_seconds: None,
            error_message: None,
        };
        assert_eq!(translate(processing).unwrap(), SynthesisStatus::Processing);
    }

    #[test]
    fn test_translate_complete() {
        let complete = StatusResponse {
            status_code: 100,
            audio_url: Some("https://cdn.example.com/es.mp3".to_string()),
            duration_seconds: Some(310.2),
            error_message: None,
        };
        assert_eq!(
            translate(complete).unwrap(),
            SynthesisStatus::Complete {
                audio_url: "https://cdn.example.com/es.mp3".to_string(),
                duration_seconds: 310.2,
            }
        );
    }

    #[test]
    fn test_translate_complete_without_url_is_invalid() {
        let broken = StatusResponse {
            status_code: 100,
            audio_url: None,
            duration_seconds: Some(310.2),
            error_message: None,
        };
        assert!(matches!(
            translate(broken),
            Err(AudioApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_translate_unknown_code_is_error() {
        let failed = StatusResponse {
            status_code: 47,
            audio_url: None,
            duration_seconds: None,
            error_message: Some("voice model unavailable".to_string()),
        };
        assert_eq!(
            translate(failed).unwrap(),
            SynthesisStatus::Error {
                message: "voice model unavailable".to_string(),
            }
        );

        // No message supplied: the code is still reported
        let bare = StatusResponse {
            status_code: 47,
            audio_url: None,
            duration_seconds: None,
            error_message: None,
        };
        match translate(bare).unwrap() {
            SynthesisStatus::Error { message } => assert!(message.contains("47")),
            other => panic!("expected error status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_sends_key_and_parses_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .and(header("x-api-key", "secret-key"))
            .and(body_partial_json(serde_json::json!({
                "language": "es",
                "duration_tier": "standard",
            })))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(serde_json::json!({ "request_id": "req-42" })),
            )
            .mount(&server)
            .await;

        let client =
            HttpAudioJobClient::new(server.uri(), Some("secret-key".to_string())).unwrap();
        let request_id = client
            .submit("Today in the news...", Language::Es, DurationTier::Standard)
            .await
            .unwrap();

        assert_eq!(request_id, "req-42");
    }

    #[tokio::test]
    async fn test_submit_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = HttpAudioJobClient::new(server.uri(), None).unwrap();
        let result = client
            .submit("text", Language::En, DurationTier::Brief)
            .await;

        assert!(matches!(result, Err(AudioApiError::InvalidApiKey)));
        assert!(!result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_poll_status_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/synthesize/req-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": 100,
                "audio_url": "https://cdn.example.com/es.mp3",
                "duration_seconds": 287.4,
            })))
            .mount(&server)
            .await;

        let client = HttpAudioJobClient::new(server.uri(), None).unwrap();
        let status = client.poll_status("req-42").await.unwrap();

        assert_eq!(
            status,
            SynthesisStatus::Complete {
                audio_url: "https://cdn.example.com/es.mp3".to_string(),
                duration_seconds: 287.4,
            }
        );
    }

    #[tokio::test]
    async fn test_poll_rate_limited_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/synthesize/req-42"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpAudioJobClient::new(server.uri(), None).unwrap();
        let error = client.poll_status("req-42").await.unwrap_err();

        assert!(matches!(error, AudioApiError::RateLimitExceeded));
        assert!(error.is_retryable());
    }
}
