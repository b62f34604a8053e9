//! Module configuration resolution
//!
//! The speech API key can live in three places. Resolution priority:
//! 1. Database settings table (editable at runtime)
//! 2. Environment variable
//! 3. TOML config file
//!
//! API base URLs resolve environment over TOML over compiled defaults.

use crate::db::settings::{self, keys};
use polycast_common::config::TomlConfig;
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Default base URL of the digest content API
pub const DEFAULT_CONTENT_API_URL: &str = "http://127.0.0.1:5770";

/// Default base URL of the audio synthesis API
pub const DEFAULT_SPEECH_API_URL: &str = "http://127.0.0.1:5772";

pub const SPEECH_API_KEY_ENV: &str = "POLYCAST_SPEECH_API_KEY";
pub const CONTENT_API_URL_ENV: &str = "POLYCAST_CONTENT_API_URL";
pub const SPEECH_API_URL_ENV: &str = "POLYCAST_SPEECH_API_URL";

/// Resolve an API base URL: environment > TOML > compiled default
pub fn resolve_api_url(env_var: &str, toml_value: Option<&String>, default: &str) -> String {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            debug!(env_var, url = %value, "API URL from environment");
            return value;
        }
    }
    if let Some(value) = toml_value {
        debug!(url = %value, "API URL from TOML config");
        return value.clone();
    }
    default.to_string()
}

/// Resolve the speech API key: database > environment > TOML
///
/// Warns when more than one source is set so a shadowed key is visible in
/// the logs.
pub async fn resolve_speech_api_key(pool: &SqlitePool, toml_config: &TomlConfig) -> Option<String> {
    let from_db: Option<String> = settings::get_setting(pool, keys::SPEECH_API_KEY)
        .await
        .ok()
        .flatten()
        .filter(|v: &String| !v.is_empty());
    let from_env = std::env::var(SPEECH_API_KEY_ENV)
        .ok()
        .filter(|v| !v.is_empty());
    let from_toml = toml_config.speech_api_key.clone().filter(|v| !v.is_empty());

    let sources = [from_db.is_some(), from_env.is_some(), from_toml.is_some()]
        .iter()
        .filter(|present| **present)
        .count();
    if sources > 1 {
        warn!("Speech API key set in multiple sources; database value takes precedence");
    }

    from_db.or(from_env).or(from_toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_api_url_env_beats_toml() {
        std::env::set_var("POLYCAST_TEST_API_URL", "http://from-env:1");
        let toml_value = "http://from-toml:2".to_string();

        let url = resolve_api_url("POLYCAST_TEST_API_URL", Some(&toml_value), "http://default:3");
        assert_eq!(url, "http://from-env:1");

        std::env::remove_var("POLYCAST_TEST_API_URL");
    }

    #[test]
    #[serial]
    fn test_api_url_falls_back_to_toml_then_default() {
        std::env::remove_var("POLYCAST_TEST_API_URL");
        let toml_value = "http://from-toml:2".to_string();

        assert_eq!(
            resolve_api_url("POLYCAST_TEST_API_URL", Some(&toml_value), "http://default:3"),
            "http://from-toml:2"
        );
        assert_eq!(
            resolve_api_url("POLYCAST_TEST_API_URL", None, "http://default:3"),
            "http://default:3"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_speech_api_key_database_wins() {
        std::env::remove_var(SPEECH_API_KEY_ENV);
        let pool = test_pool().await;
        settings::set_setting(&pool, keys::SPEECH_API_KEY, "db-key")
            .await
            .unwrap();

        let toml_config = TomlConfig {
            speech_api_key: Some("toml-key".to_string()),
            ..Default::default()
        };

        let key = resolve_speech_api_key(&pool, &toml_config).await;
        assert_eq!(key.as_deref(), Some("db-key"));
    }

    #[tokio::test]
    #[serial]
    async fn test_speech_api_key_toml_fallback() {
        std::env::remove_var(SPEECH_API_KEY_ENV);
        let pool = test_pool().await;

        let toml_config = TomlConfig {
            speech_api_key: Some("toml-key".to_string()),
            ..Default::default()
        };

        let key = resolve_speech_api_key(&pool, &toml_config).await;
        assert_eq!(key.as_deref(), Some("toml-key"));
    }
}
