//! Coordinator configuration
//!
//! Loaded from `<config dir>/trustmeter/config.toml` when present, then
//! overridden by `TRUSTMETER_*` environment variables.

use crate::util::errors::{TrustMeterError, TrustMeterResult};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_BACKEND_URL: &str = "TRUSTMETER_BACKEND_URL";
pub const ENV_LOG_LEVEL: &str = "TRUSTMETER_LOG_LEVEL";

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            user_agent: format!("TrustMeter-Coordinator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval of the orphaned-session sweep.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustMeterConfig {
    pub backend: BackendConfig,
    pub sessions: SessionConfig,
    pub logging: LoggingConfig,
}

impl TrustMeterConfig {
    /// Loads `path` (or the default location), falling back to defaults when the
    /// file does not exist, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> TrustMeterResult<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!("Config file not found, using defaults: path={}", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> TrustMeterResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TrustMeterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| TrustMeterError::Config(format!("{} ({})", e, path.display())))
    }

    pub fn from_toml(raw: &str) -> TrustMeterResult<Self> {
        toml::from_str(raw).map_err(|e| TrustMeterError::Config(format!("Invalid config: {}", e)))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
            self.backend.base_url = url.trim().to_string();
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_lowercase();
        }
    }

    pub fn validate(&self) -> TrustMeterResult<()> {
        let url = self.backend.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TrustMeterError::Config(format!(
                "backend.base_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(TrustMeterError::Config(
                "backend.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sessions.sweep_interval_secs == 0 {
            return Err(TrustMeterError::Config(
                "sessions.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("trustmeter").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = TrustMeterConfig::from_toml(
            r#"
            [backend]
            base_url = "https://backend.example"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.backend.base_url, "https://backend.example");
        assert_eq!(config.backend.request_timeout_ms, 120_000);
        assert_eq!(config.sessions.sweep_interval_secs, 300);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = TrustMeterConfig::default();
        config.apply_overrides(|key| match key {
            ENV_BACKEND_URL => Some(" https://override.example ".to_string()),
            ENV_LOG_LEVEL => Some("DEBUG".to_string()),
            _ => None,
        });

        assert_eq!(config.backend.base_url, "https://override.example");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_non_http_backend() {
        let mut config = TrustMeterConfig::default();
        config.backend.base_url = "ftp://backend".to_string();
        assert!(matches!(config.validate(), Err(TrustMeterError::Config(_))));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(TrustMeterConfig::from_toml("[backend\nbase_url = 1").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!(
            "trustmeter-missing-{}.toml",
            uuid::Uuid::new_v4()
        ));
        let config = TrustMeterConfig::load(Some(&path)).expect("defaults for missing file");
        assert_eq!(config.backend.request_timeout_ms, 120_000);
        assert_eq!(config.sessions.sweep_interval_secs, 300);
    }
}
