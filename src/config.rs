//! Configuration loader for the `trailsafe-safety` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, time::Duration};

use anyhow::{anyhow, Result};

use crate::analyzer::DEFAULT_TRIGGER_THRESHOLD;

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

/// Parse an optional float environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
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

/// Read an optional string environment variable, treating empty as unset.
fn optional_env(var_name: &str) -> Option<String> {
    env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP listen port.
    pub port: u16,

    /// Provider webhook for outgoing alerts. `None` logs alerts instead.
    pub notify_gateway_url: Option<String>,

    /// Bearer token for the provider webhook.
    pub notify_gateway_token: Option<String>,

    /// Sender id/number shown to contacts.
    pub notify_sms_from: String,

    /// Per-contact send timeout in milliseconds.
    pub notify_timeout_ms: u32,

    /// Score at which an analysis verdict triggers.
    pub trigger_threshold: f64,

    /// Minutes until the next expected check-in.
    pub checkin_interval_min: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `PORT` – listen port (default: 4000)
/// - `NOTIFY_GATEWAY_URL` – provider webhook (default: log only)
/// - `NOTIFY_GATEWAY_TOKEN` – provider bearer token
/// - `NOTIFY_SMS_FROM` – sender id (default: empty)
/// - `NOTIFY_TIMEOUT_MS` – per-contact send timeout (default: 5000)
/// - `ANOMALY_TRIGGER_THRESHOLD` – trigger score, 0..=1 (default: 0.5)
/// - `CHECKIN_INTERVAL_MIN` – check-in interval (default: 30)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let port = parse_env_u32!("PORT", 4000);
    let notify_timeout_ms = parse_env_u32!("NOTIFY_TIMEOUT_MS", 5000);
    let trigger_threshold = parse_env_f64!("ANOMALY_TRIGGER_THRESHOLD", DEFAULT_TRIGGER_THRESHOLD);
    let checkin_interval_min = parse_env_u32!("CHECKIN_INTERVAL_MIN", 30);

    let port = u16::try_from(port).map_err(|_| anyhow!("Invalid PORT: {}", port))?;

    if !(0.0..=1.0).contains(&trigger_threshold) {
        return Err(anyhow!(
            "Invalid ANOMALY_TRIGGER_THRESHOLD: {} (expected 0..=1)",
            trigger_threshold
        ));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        port,
        notify_gateway_url: optional_env("NOTIFY_GATEWAY_URL"),
        notify_gateway_token: optional_env("NOTIFY_GATEWAY_TOKEN"),
        notify_sms_from: env::var("NOTIFY_SMS_FROM").unwrap_or_default(),
        notify_timeout_ms,
        trigger_threshold,
        checkin_interval_min,
    })
}

impl Config {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.notify_timeout_ms))
    }

    pub fn checkin_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.checkin_interval_min))
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and gateway
    /// tokens while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let token = match self.notify_gateway_token {
            Some(_) => "****",
            None => "(unset)",
        };
        let gateway = self.notify_gateway_url.as_deref().unwrap_or("(log only)");

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL              : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX               : {}", self.db_pool_max);
        tracing::info!("  PORT                      : {}", self.port);
        tracing::info!("  NOTIFY_GATEWAY_URL        : {}", gateway);
        tracing::info!("  NOTIFY_GATEWAY_TOKEN      : {}", token);
        tracing::info!("  NOTIFY_SMS_FROM           : {}", self.notify_sms_from);
        tracing::info!("  NOTIFY_TIMEOUT_MS         : {}", self.notify_timeout_ms);
        tracing::info!("  ANOMALY_TRIGGER_THRESHOLD : {}", self.trigger_threshold);
        tracing::info!("  CHECKIN_INTERVAL_MIN      : {}", self.checkin_interval_min);
    }
}

/// Mask the password in a database URL.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // A colon right after the scheme means there is no password.
            if !db_url[..colon_pos].ends_with("postgres")
                && !db_url[..colon_pos].ends_with("postgresql")
            {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}
