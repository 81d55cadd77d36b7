//! services/host/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub log_level: Level,
    /// Directory holding one stored session file per user.
    pub session_store_dir: PathBuf,
    pub allowed_origin: String,
    pub request_timeout: Duration,
    /// Fraction of the track after which the rating prompt appears.
    pub rating_threshold: f64,
    pub transition_delay: Duration,
    pub settle_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address = parse("BIND_ADDRESS", &or_default("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = or_default("ALLOWED_ORIGIN", "http://localhost:8081");
        let session_store_dir =
            PathBuf::from(or_default("SESSION_STORE_DIR", "./.unveil-sessions"));

        // --- Hosted Backend ---
        let supabase_url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;
        let request_timeout = Duration::from_secs(parse(
            "REQUEST_TIMEOUT_SECS",
            &or_default("REQUEST_TIMEOUT_SECS", "15"),
        )?);

        // --- Discovery Tuning ---
        let rating_threshold: f64 =
            parse("RATING_THRESHOLD", &or_default("RATING_THRESHOLD", "0.05"))?;
        if !(0.0..=1.0).contains(&rating_threshold) {
            return Err(ConfigError::InvalidValue(
                "RATING_THRESHOLD".to_string(),
                format!("{} is not between 0 and 1", rating_threshold),
            ));
        }
        let transition_delay = Duration::from_millis(parse(
            "TRANSITION_DELAY_MS",
            &or_default("TRANSITION_DELAY_MS", "2000"),
        )?);
        let settle_delay = Duration::from_millis(parse(
            "SETTLE_DELAY_MS",
            &or_default("SETTLE_DELAY_MS", "100"),
        )?);

        Ok(Self {
            bind_address,
            supabase_url,
            supabase_anon_key,
            log_level,
            session_store_dir,
            allowed_origin,
            request_timeout,
            rating_threshold,
            transition_delay,
            settle_delay,
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
