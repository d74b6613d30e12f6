//! Configuration management for the Cognizance assistant
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (`COGNIZANCE__` prefix, `__` separator)
//! - Legacy `GOOGLE_*` variables for the provider key and model list
//!
//! Settings are loaded once at startup and handed to each component by
//! value. Nothing below the binary reads the environment after that.
//!
//! The static festival dataset that feeds the system prompt also lives here.

pub mod constants;
pub mod festival;
pub mod settings;

pub use festival::{festival_context, FestivalInfo};
pub use settings::{
    load_settings, load_settings_from, ClassificationConfig, ClassificationRule, LlmSettings,
    ObservabilityConfig, RateLimitConfig, RetrySettings, RuntimeEnvironment, ServerConfig,
    Settings, SummarySettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for cognizance_core::Error {
    fn from(err: ConfigError) -> Self {
        cognizance_core::Error::Config(err.to_string())
    }
}
