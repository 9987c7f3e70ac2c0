//! Client configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API server settings
    pub api: ApiConfig,

    /// Session handling settings
    pub session: SessionConfig,
}

/// API server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,

    /// Request timeout in seconds (0 disables it)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

/// Longest accepted refresh lead time (one year)
pub const MAX_REFRESH_BUFFER_SECS: u64 = 365 * 24 * 60 * 60;

/// Session handling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Refresh the access token this many seconds before it expires
    pub refresh_buffer_secs: u64,

    /// How often the watchdog checks for session expiry
    pub check_interval_secs: u64,

    /// Route the user is sent to on forced logout
    pub login_route: String,

    /// File holding the persisted session
    pub storage_path: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_secs: 30,
            user_agent: concat!("agentic/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: 60,
            check_interval_secs: 60,
            login_route: "/login".to_string(),
            storage_path: default_state_dir().join("state.json"),
        }
    }
}

/// Directory for persisted client state
pub fn default_state_dir() -> PathBuf {
    std::env::var("AGENTIC_STATE_DIR").map_or_else(
        |_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("agentic")
        },
        PathBuf::from,
    )
}

impl ApiConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl SessionConfig {
    /// Refresh lead time, saturating at the largest representable duration
    pub fn refresh_buffer(&self) -> chrono::Duration {
        i64::try_from(self.refresh_buffer_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl ClientConfig {
    /// Load configuration from file, with `AGENTIC_` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Self::with_defaults()?
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("AGENTIC").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed
    pub fn from_env() -> Result<Self> {
        let settings = Self::with_defaults()?
            .add_source(config::Environment::with_prefix("AGENTIC").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();
        Ok(config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default("api.user_agent", defaults.api.user_agent)?
            .set_default(
                "session.refresh_buffer_secs",
                defaults.session.refresh_buffer_secs,
            )?
            .set_default(
                "session.check_interval_secs",
                defaults.session.check_interval_secs,
            )?
            .set_default("session.login_route", defaults.session.login_route)?
            .set_default(
                "session.storage_path",
                defaults.session.storage_path.to_string_lossy().to_string(),
            )?)
    }

    /// Reject values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url)
            .map_err(|e| Error::Config(format!("api.base_url {:?}: {e}", self.api.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "api.base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.session.refresh_buffer_secs > MAX_REFRESH_BUFFER_SECS {
            return Err(Error::Config(format!(
                "session.refresh_buffer_secs must be at most {MAX_REFRESH_BUFFER_SECS}"
            )));
        }
        if self.session.check_interval_secs == 0 {
            return Err(Error::Config(
                "session.check_interval_secs must be positive".to_string(),
            ));
        }
        if !self.session.login_route.starts_with('/') {
            return Err(Error::Config(
                "session.login_route must be an absolute route".to_string(),
            ));
        }
        Ok(())
    }

    /// Write this configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.refresh_buffer_secs, 60);
        assert_eq!(config.session.login_route, "/login");
        assert_eq!(config.api.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://api.example.com\"\n\n[session]\nrefresh_buffer_secs = 15\n",
        )
        .unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.session.refresh_buffer_secs, 15);
        assert_eq!(config.session.check_interval_secs, 60);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        let mut config = ClientConfig::default();
        config.api.timeout_secs = 0;

        config.save(&path).unwrap();
        let loaded = ClientConfig::from_file(&path).unwrap();

        assert_eq!(loaded.api.timeout(), None);
        assert_eq!(loaded.session.storage_path, config.session.storage_path);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ClientConfig::default();
        config.session.login_route = "login".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.session.check_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.session.refresh_buffer_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert_eq!(config.session.refresh_buffer(), chrono::Duration::MAX);

        config.session.refresh_buffer_secs = MAX_REFRESH_BUFFER_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.session.refresh_buffer(),
            chrono::Duration::days(365)
        );
    }
}
