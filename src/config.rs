//! Configuration loader for the `rootsage` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Nothing else in the crate reads `env::var` for
//! service settings.
//!
use std::{env, path::PathBuf};

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite connection string, e.g. `sqlite://rootsage.db`.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Directory holding the `N.json`, `P.json` and `K.json` classifier artifacts.
    pub models_dir: PathBuf,

    /// Key expected in the `X-API-KEY` header of ingestion and admin requests.
    pub api_key: String,

    /// TCP port to listen on.
    pub port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – SQLite connection string
/// - `ROOTSAGE_API_KEY` – key for the ingestion API
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `MODELS_DIR` – classifier artifact directory (default: `models`)
/// - `PORT` – listen port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let api_key = require_env!("ROOTSAGE_API_KEY");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let models_dir = env::var("MODELS_DIR").unwrap_or_else(|_| "models".to_string());
    let port = parse_env_u32!("PORT", 8080);

    if api_key.is_empty() {
        return Err(anyhow!("ROOTSAGE_API_KEY must not be empty"));
    }
    let port = u16::try_from(port).map_err(|_| anyhow!("Invalid PORT: {} is out of range", port))?;

    Ok(Config {
        db_url,
        db_pool_max,
        models_dir: PathBuf::from(models_dir),
        api_key,
        port,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// The API key is masked; everything else is shown as loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL     : {}", self.db_url);
        tracing::info!("  ROOTSAGE_API_KEY : {}", mask(&self.api_key));
        tracing::info!("  DB_POOL_MAX      : {}", self.db_pool_max);
        tracing::info!("  MODELS_DIR       : {}", self.models_dir.display());
        tracing::info!("  PORT             : {}", self.port);
    }
}

/// Keep the first two characters of a secret, star out the rest.
fn mask(secret: &str) -> String {
    // ---
    let visible: String = secret.chars().take(2).collect();
    format!("{}{}", visible, "*".repeat(secret.chars().count().saturating_sub(2)))
}
