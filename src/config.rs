//! Configuration file parser for ~/.config/taskdeck/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::theme::DEFAULT_ACCENT;

/// Environment variable that overrides `api_url`.
pub const API_URL_ENV: &str = "TASKDECK_API_URL";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the task API.
    pub api_url: String,

    /// Per-request timeout in seconds. 0 disables the timeout.
    pub request_timeout_secs: u64,

    /// Theme mode used until the user picks one ("dark" or "light").
    pub theme: String,

    /// Accent color used until the user picks one.
    pub accent_color: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
            theme: "dark".to_string(),
            accent_color: DEFAULT_ACCENT.to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] =
        ["api_url", "request_timeout_secs", "theme", "accent_color"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            api_url = %config.api_url,
            theme = %config.theme,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `TASKDECK_API_URL` if it is set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_api_url_override(std::env::var(API_URL_ENV).ok());
    }

    fn apply_api_url_override(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            tracing::debug!(api_url = %url, "API URL overridden by environment");
            self.api_url = url;
        }
    }

    /// Request timeout as a `Duration`, or `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("taskdeck_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://127.0.0.1:8000");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.theme, "dark");
        assert_eq!(config.accent_color, "#8A72FF");
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/taskdeck_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.theme, "dark");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let path = write_config("empty", "");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:8000");
        cleanup(&path);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.theme, "dark");
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "theme = \"light\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.theme, "light");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.accent_color, "#8A72FF");
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r##"
api_url = "https://tasks.example.com/api"
request_timeout_secs = 5
theme = "light"
accent_color = "#22c55e"
"##;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_url, "https://tasks.example.com/api");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.theme, "light");
        assert_eq!(config.accent_color, "#22c55e");
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "theme = \"dark\"\nrefresh_minutes = 5\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.theme, "dark");
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "request_timeout_secs = \"soon\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_api_url_override() {
        let mut config = Config::default();
        config.apply_api_url_override(Some("  ".to_string()));
        assert_eq!(config.api_url, "http://127.0.0.1:8000");

        config.apply_api_url_override(None);
        assert_eq!(config.api_url, "http://127.0.0.1:8000");

        config.apply_api_url_override(Some("http://10.0.0.2:9000".to_string()));
        assert_eq!(config.api_url, "http://10.0.0.2:9000");
    }
}
