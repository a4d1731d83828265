//! Environment-driven configuration.
//!
//! All keys are read from the process environment after an optional `.env`
//! file load. Malformed values fail construction with [`ConfigError`]
//! rather than falling back silently.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| invalid(key, &v, "expected an integer")),
    }
}

fn env_duration(key: &str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env_or(key, default);
    parse_duration(&raw)
        .ok_or_else(|| invalid(key, &raw, "expected a duration like \"20m\" or \"1d\""))
}

fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(v) => parse_bool(key, &v),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

fn split_job_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub worker: WorkerConfig,
    pub throttle: ThrottleConfig,
    pub cron: CronConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            worker: WorkerConfig::from_env()?,
            throttle: ThrottleConfig::from_env()?,
            cron: CronConfig::from_env()?,
        })
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  worker:    tick={}s", self.worker.tick.as_secs());
        tracing::info!(
            "  throttle:  daily_limit={}, dup_interval={}s",
            self.throttle.daily_request_limit,
            self.throttle.dup_interval.as_secs()
        );
        tracing::info!(
            "  cron:      default_lifetime={}s, randomize_starts={}, disabled_jobs={:?}",
            self.cron.default_lifetime.as_secs(),
            self.cron.randomize_system_starts,
            self.cron.disabled_system_jobs
        );
    }
}

// ── Worker ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Period between scheduler passes.
    pub tick: Duration,
}

impl WorkerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tick: Duration::from_secs(env_u64("DROVER_TICK_SECS", 60)?),
        })
    }
}

// ── Throttle ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Flow requests allowed per (agent, user) in a trailing 24h window.
    /// Zero disables the check.
    pub daily_request_limit: u64,
    /// Window in which an identical flow request counts as a duplicate.
    /// Zero disables the check.
    pub dup_interval: Duration,
}

impl ThrottleConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            daily_request_limit: env_u64("DROVER_DAILY_FLOW_LIMIT", 10)?,
            dup_interval: env_duration("DROVER_DUP_INTERVAL", "20m")?,
        })
    }
}

// ── Cron ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Lifetime applied to jobs created without an explicit one.
    pub default_lifetime: Duration,
    /// System job names to register disabled. Every name must match a
    /// known system job; an unknown name fails scheduling outright.
    pub disabled_system_jobs: Vec<String>,
    /// Spread system job start times over one frequency period.
    pub randomize_system_starts: bool,
}

impl CronConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            default_lifetime: env_duration("DROVER_DEFAULT_CRON_LIFETIME", "1d")?,
            disabled_system_jobs: split_job_list(&env_or("DROVER_DISABLED_SYSTEM_JOBS", "")),
            randomize_system_starts: env_bool("DROVER_RANDOMIZE_SYSTEM_STARTS", true)?,
        })
    }
}
