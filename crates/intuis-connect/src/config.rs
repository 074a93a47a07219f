//! YAML configuration of a standalone integration run
//!
//! ```yaml
//! username: me@example.com
//! password: hunter2
//! client_id: ...
//! client_secret: ...
//! options:
//!   update_interval: 90
//!   measure_scale: 1day
//! ```
//!
//! `INTUIS_USERNAME` and `INTUIS_PASSWORD` override the file values.

use std::path::{Path, PathBuf};

use intuis_api::ClientConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config_flow::UserInput;
use crate::entry::EntryOptions;

pub const USERNAME_ENV: &str = "INTUIS_USERNAME";
pub const PASSWORD_ENV: &str = "INTUIS_PASSWORD";

/// Shortest polling interval accepted
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Account, vendor application and options
#[derive(Deserialize)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(flatten)]
    pub client: ClientConfig,

    #[serde(default)]
    pub options: EntryOptions,
}

impl std::fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("username", &self.username)
            .field("password", &"**REDACTED**")
            .field("client", &self.client)
            .field("options", &self.options)
            .finish()
    }
}

impl IntegrationConfig {
    /// Read, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content).map_err(|source| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Replace credentials with the values `lookup` finds
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(USERNAME_ENV).filter(|v| !v.is_empty()) {
            self.username = username;
        }
        if let Some(password) = lookup(PASSWORD_ENV).filter(|v| !v.is_empty()) {
            self.password = password;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |key, message: &str| {
            Err(ConfigError::InvalidValue {
                key,
                message: message.to_string(),
            })
        };

        if self.username.trim().is_empty() {
            return invalid("username", "required (or set INTUIS_USERNAME)");
        }
        if self.password.is_empty() {
            return invalid("password", "required (or set INTUIS_PASSWORD)");
        }
        if self.client.client_id.is_empty() {
            return invalid("client_id", "required");
        }
        if self.client.client_secret.is_empty() {
            return invalid("client_secret", "required");
        }
        if self.options.update_interval < MIN_UPDATE_INTERVAL_SECS {
            return invalid("options.update_interval", "must be at least 10 seconds");
        }
        // Passed to gethomemeasure as is; the cloud accepts both `day` and `1day`
        if self.options.measure_scale.trim().is_empty() {
            return invalid("options.measure_scale", "required");
        }
        Ok(())
    }

    /// Config flow input for the configured account
    pub fn user_input(&self) -> UserInput {
        UserInput::new(&self.username, &self.password)
    }
}
