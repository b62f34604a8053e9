//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of the optional `polycast.toml` configuration file
///
/// Every field is optional; the file only supplies values not already given
/// on the command line, in the environment, or in the database settings table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder holding the database (overridden by CLI/ENV)
    pub data_folder: Option<PathBuf>,
    /// Base URL of the digest content API
    pub content_api_url: Option<String>,
    /// Base URL of the audio synthesis API
    pub speech_api_url: Option<String>,
    /// API key for the audio synthesis API (database takes precedence)
    pub speech_api_key: Option<String>,
}

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        tracing::debug!(path = %path.display(), "Data folder from command line");
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        tracing::debug!(path = %path, "Data folder from environment");
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_config.and_then(|c| c.data_folder.as_ref()) {
        tracing::debug!(path = %path.display(), "Data folder from TOML config");
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    get_default_data_folder()
}

/// Get OS-dependent default data folder path
fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/polycast (or /var/lib/polycast for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("polycast"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/polycast"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/polycast
        dirs::data_dir()
            .map(|d| d.join("polycast"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/polycast"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\polycast
        dirs::data_local_dir()
            .map(|d| d.join("polycast"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\polycast"))
    } else {
        PathBuf::from("./polycast_data")
    }
}

/// Create the data folder if it does not exist yet
pub fn ensure_data_folder(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::Config(format!("Failed to create data folder {}: {}", path.display(), e)))
}

/// Path of the service database inside the data folder
pub fn database_path(data_folder: &Path) -> PathBuf {
    data_folder.join("polycast.db")
}

/// Default configuration file path for the platform
///
/// `~/.config/polycast/polycast.toml` on Linux/macOS conventions via `dirs`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("polycast").join("polycast.toml"))
}

/// Load the TOML configuration file
///
/// A missing file is not an error; it yields the all-defaults config so the
/// other resolution tiers still apply.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(TomlConfig::default()),
        },
    };

    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    tracing::debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Write the TOML configuration file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Create config directory failed: {}", e)))?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)
        .map_err(|e| Error::Config(format!("Write TOML failed: {}", e)))?;

    Ok(())
}
