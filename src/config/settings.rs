//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::onshape::Credentials;

/// Environment variable overriding `access_key`.
pub const ACCESS_KEY_ENV: &str = "ONSHAPE_ACCESS_KEY";
/// Environment variable overriding `secret_key`.
pub const SECRET_KEY_ENV: &str = "ONSHAPE_SECRET_KEY";
/// Environment variable overriding `base_url`.
pub const BASE_URL_ENV: &str = "ONSHAPE_BASE_URL";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Base URL of the REST API, including the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API access key.
    #[serde(default)]
    pub access_key: Option<String>,

    /// API secret key.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            base_url: default_base_url(),
            access_key: None,
            secret_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// Missing credentials are not a validation failure; see
    /// [`Config::credentials`].
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| ConfigError::ValidationError {
            message: format!("Invalid base_url '{}': {e}", self.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid base_url '{}'. Scheme must be http or https",
                    self.base_url
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "request_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Applies `ONSHAPE_*` environment overrides using `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(value) = non_empty(BASE_URL_ENV) {
            self.base_url = value;
        }
        if let Some(value) = non_empty(ACCESS_KEY_ENV) {
            self.access_key = Some(value);
        }
        if let Some(value) = non_empty(SECRET_KEY_ENV) {
            self.secret_key = Some(value);
        }
    }

    /// Returns the API key pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] for the first absent key.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        let access_key = present(&self.access_key).ok_or(ConfigError::MissingCredential {
            setting: "access_key",
            env_var: ACCESS_KEY_ENV,
        })?;
        let secret_key = present(&self.secret_key).ok_or(ConfigError::MissingCredential {
            setting: "secret_key",
            env_var: SECRET_KEY_ENV,
        })?;
        Ok(Credentials {
            access_key,
            secret_key,
        })
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://cad.onshape.com/api/v10".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, "https://cad.onshape.com/api/v10");
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "base_url": "https://company.onshape.com/api/v9",
            "access_key": "ak",
            "secret_key": "sk",
            "request_timeout_secs": 15,
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, "https://company.onshape.com/api/v9");
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.logging.level, "debug");

        let creds = config.credentials().unwrap();
        assert_eq!(creds.access_key, "ak");
        assert_eq!(creds.secret_key, "sk");
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_invalid_base_url() {
        let json = r#"{ "base_url": "ftp://cad.onshape.com" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{ "base_url": "not a url" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_timeout() {
        let json = r#"{ "request_timeout_secs": 0 }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn missing_secret_reported() {
        let json = r#"{ "access_key": "ak" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.credentials().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                setting: "secret_key",
                ..
            }
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config {
            access_key: Some("file-ak".to_string()),
            ..Config::default()
        };
        config.apply_env(|key| match key {
            ACCESS_KEY_ENV => Some("env-ak".to_string()),
            SECRET_KEY_ENV => Some("env-sk".to_string()),
            BASE_URL_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.access_key.as_deref(), Some("env-ak"));
        assert_eq!(config.secret_key.as_deref(), Some("env-sk"));
        assert_eq!(config.base_url, "https://cad.onshape.com/api/v10");
    }
}
