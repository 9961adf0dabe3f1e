//! CLI configuration
//!
//! Loaded from YAML or TOML (by file extension), then overridden by
//! `TURNLENS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use turnlens_core::{Error, Result};
use turnlens_observability::LoggingConfig;
use turnlens_session::ObserverConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub observer: ObserverConfig,
}

impl AppConfig {
    /// Load configuration from a YAML or TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        };

        Ok(config)
    }

    /// Load from an optional file, apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
                Self::from_file(expanded)?
            }
            None => Self::default(),
        };
        config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("TURNLENS_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("TURNLENS_LOG_JSON") {
            match val.parse::<bool>() {
                Ok(json) => self.logging.json = json,
                Err(_) => eprintln!("Warning: Invalid TURNLENS_LOG_JSON '{}', ignoring", val),
            }
        }

        if let Ok(val) = std::env::var("TURNLENS_GRACE_WINDOW_SECS") {
            match val.parse::<f64>() {
                Ok(secs) => self.observer.grace_window_secs = secs,
                Err(_) => eprintln!(
                    "Warning: Invalid TURNLENS_GRACE_WINDOW_SECS '{}', ignoring",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("TURNLENS_ACCEPT_UPSTREAM") {
            match val.parse::<bool>() {
                Ok(accept) => self.observer.accept_upstream = accept,
                Err(_) => eprintln!(
                    "Warning: Invalid TURNLENS_ACCEPT_UPSTREAM '{}', ignoring",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.observer.validate().map_err(Error::ConfigValidation)
    }
}
