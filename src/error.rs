//! Error types for onshape-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Variants that relate to API keys name the missing setting, not its value.

use std::path::PathBuf;

use thiserror::Error;

use crate::onshape::{AddressError, ApiError, MutationError};

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },

    /// An API credential is not configured.
    #[error("missing credential: {setting} is not set (config file or {env_var})")]
    MissingCredential {
        /// Name of the config field.
        setting: &'static str,
        /// Environment variable that can supply it.
        env_var: &'static str,
    },
}

/// Errors raised while executing a tool or resource handler.
///
/// The dispatch registry turns every variant into an in-band error result.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Arguments do not match the declared input schema.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// The addressed resource is malformed.
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    /// A feature-list mutation was refused or failed.
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// The REST call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A result could not be rendered.
    #[error("failed to serialise result")]
    Serialise(#[from] serde_json::Error),
}
