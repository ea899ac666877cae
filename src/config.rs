//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Hex SHA-256 digest of the accepted API key
    pub api_key_digest: String,

    /// Configured EUR -> HNL spot rate served by the static provider
    pub eur_hnl_rate: Decimal,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let api_key_digest = env::var("API_KEY_SHA256")
            .map_err(|_| ConfigError::MissingEnv("API_KEY_SHA256"))?
            .to_lowercase();
        if api_key_digest.len() != 64 || !api_key_digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidValue("API_KEY_SHA256"));
        }

        let eur_hnl_rate = Decimal::from_str(
            &env::var("EUR_HNL_RATE").unwrap_or_else(|_| "24.5".to_string()),
        )
        .map_err(|_| ConfigError::InvalidValue("EUR_HNL_RATE"))?;
        if eur_hnl_rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue("EUR_HNL_RATE"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            api_key_digest,
            eur_hnl_rate,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
