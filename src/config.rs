//! Configuration loader for the `dewguard` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, Result};

use crate::risk::{DEFAULT_MARGIN_THRESHOLD_C, MAX_INTERVAL_MINUTES};
use crate::store::DEFAULT_POINTS_LIMIT;

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env_or {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable, treating blank as unset.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Pulse device API base URL.
    pub pulse_api_url: String,

    /// Default timeout for device API calls, in seconds.
    pub pulse_timeout_secs: u64,

    /// Maximum number of device API pages fetched per pull (safety limit).
    pub pulse_max_pages: u32,

    /// Hard cap on points returned by a window query.
    pub points_max_limit: usize,

    /// Default condensation margin threshold in °C.
    pub risk_margin_threshold_c: f64,

    /// Longest gap between readings credited to time at risk, in minutes.
    pub risk_max_interval_minutes: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: None,
            db_pool_max: 5,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            pulse_api_url: "https://api.pulsegrow.com".to_string(),
            pulse_timeout_secs: 15,
            pulse_max_pages: 100,
            points_max_limit: DEFAULT_POINTS_LIMIT,
            risk_margin_threshold_c: DEFAULT_MARGIN_THRESHOLD_C,
            risk_max_interval_minutes: MAX_INTERVAL_MINUTES,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (unset: in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: 0.0.0.0:8080)
/// - `PULSE_API_URL` – Pulse API base URL
/// - `PULSE_TIMEOUT_SECS` – device call timeout (default: 15)
/// - `PULSE_MAX_PAGES` – max device API pages per pull (default: 100)
/// - `POINTS_MAX_LIMIT` – window query cap (default: 5000)
/// - `RISK_MARGIN_THRESHOLD_C` – default margin threshold (default: 0.5)
/// - `RISK_MAX_INTERVAL_MINUTES` – gap cap for time at risk (default: 120)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let db_url = optional_env!("DATABASE_URL");
    let db_pool_max = parse_env_or!("DB_POOL_MAX", u32, defaults.db_pool_max);
    let bind_addr = parse_env_or!("BIND_ADDR", SocketAddr, defaults.bind_addr);
    let pulse_api_url = optional_env!("PULSE_API_URL").unwrap_or(defaults.pulse_api_url);
    let pulse_timeout_secs = parse_env_or!("PULSE_TIMEOUT_SECS", u64, defaults.pulse_timeout_secs);
    let pulse_max_pages = parse_env_or!("PULSE_MAX_PAGES", u32, defaults.pulse_max_pages);
    let points_max_limit = parse_env_or!("POINTS_MAX_LIMIT", usize, defaults.points_max_limit);
    let risk_margin_threshold_c = parse_env_or!(
        "RISK_MARGIN_THRESHOLD_C",
        f64,
        defaults.risk_margin_threshold_c
    );
    let risk_max_interval_minutes = parse_env_or!(
        "RISK_MAX_INTERVAL_MINUTES",
        f64,
        defaults.risk_max_interval_minutes
    );

    if points_max_limit == 0 {
        return Err(anyhow!("POINTS_MAX_LIMIT must be at least 1"));
    }
    if !risk_margin_threshold_c.is_finite() {
        return Err(anyhow!("RISK_MARGIN_THRESHOLD_C must be finite"));
    }
    if !risk_max_interval_minutes.is_finite() || risk_max_interval_minutes < 0.0 {
        return Err(anyhow!("RISK_MAX_INTERVAL_MINUTES must be a non-negative number"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        pulse_api_url: pulse_api_url.trim_end_matches('/').to_string(),
        pulse_timeout_secs,
        pulse_max_pages,
        points_max_limit,
        risk_margin_threshold_c,
        risk_max_interval_minutes,
    })
}

/// Mask the password component of a connection URL.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // `postgres://host` has its only colon before the slashes
            if !db_url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "<unset, using in-memory store>".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL              : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX               : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR                 : {}", self.bind_addr);
        tracing::info!("  PULSE_API_URL             : {}", self.pulse_api_url);
        tracing::info!("  PULSE_TIMEOUT_SECS        : {}", self.pulse_timeout_secs);
        tracing::info!("  PULSE_MAX_PAGES           : {}", self.pulse_max_pages);
        tracing::info!("  POINTS_MAX_LIMIT          : {}", self.points_max_limit);
        tracing::info!("  RISK_MARGIN_THRESHOLD_C   : {}", self.risk_margin_threshold_c);
        tracing::info!("  RISK_MAX_INTERVAL_MINUTES : {}", self.risk_max_interval_minutes);
    }
}
