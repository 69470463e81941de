//! Configuration for the CodeTop practice backend.
//!
//! Two layers: `AppConfig` (infrastructure, from environment variables) and
//! `RecommendationConfig` (chains, routing, toggles, weights, quotas: the
//! process-wide tuning surface). Both are loaded once at startup; the
//! recommendation config is validated and then treated as immutable.

pub mod recs;

pub use recs::*;

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set (or blank)")]
    MissingEnv(&'static str),
    #[error("{name} has invalid value '{value}': {reason}")]
    BadValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read config file {0}: {1}")]
    Io(String, String),
    #[error("invalid recommendation config: {0}")]
    Validation(String),
}

/// Secrets shorter than this are refused at startup; an HS256 key this
/// small is guessable.
const MIN_JWT_SECRET_LEN: usize = 16;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// JWT secret for token signing
    pub jwt_secret: String,
    /// Address to bind the server to
    pub bind_address: String,
    /// Shared admin key for observability endpoints. Empty disables admin endpoints.
    pub admin_api_key: String,
    /// Optional path to a JSON recommendation config; built-in defaults otherwise.
    pub recommendation_config_path: Option<String>,
    /// Prompt version stamped into cache keys and request contexts.
    pub prompt_version: String,
}

impl AppConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// Blank values are treated as unset, so `BIND_ADDRESS=""` falls back
    /// to the default instead of failing the bind at serve time.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: require("DATABASE_URL")?,
            jwt_secret: require("JWT_SECRET")?,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            admin_api_key: lookup("ADMIN_API_KEY").unwrap_or_default(),
            recommendation_config_path: lookup("RECOMMENDATION_CONFIG_PATH"),
            prompt_version: lookup("PROMPT_VERSION").unwrap_or_else(|| "v3".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Startup checks on values the server would otherwise only trip over
    /// mid-request: the bind address must parse and the signing secret must
    /// have usable entropy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| ConfigError::BadValue {
                name: "BIND_ADDRESS",
                value: self.bind_address.clone(),
                reason: e.to_string(),
            })?;

        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::BadValue {
                name: "JWT_SECRET",
                value: "<redacted>".to_string(),
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
            });
        }

        if self.prompt_version.contains(':') {
            // The prompt version is a cache-key segment; a colon would
            // corrupt key parsing.
            return Err(ConfigError::BadValue {
                name: "PROMPT_VERSION",
                value: self.prompt_version.clone(),
                reason: "must not contain ':'".to_string(),
            });
        }

        Ok(())
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    lookup(name).ok_or(ConfigError::MissingEnv(name))
}

fn lookup(name: &'static str) -> Option<String> {
    env::var(name).ok().and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
