//! Application configuration
//!
//! Centralized configuration management using the `config` crate. Values come
//! from built-in defaults, optional `config/*` files and `RATER__*` environment
//! variables, in that order of precedence.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub rating: RatingConfig,
    pub scheduler: SchedulerConfig,
    pub log: LogConfig,
}

/// Which storage collaborator backs the engine
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

/// Storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StorageBackend,

    /// Redis connection URL, used when `backend = "redis"`
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Rating and debit behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct RatingConfig {
    /// How many fallback rating profiles are followed before giving up
    #[serde(default = "default_max_fallback_depth")]
    pub max_fallback_depth: usize,

    /// Candidate durations tried by the max-session-time search
    #[serde(default = "default_max_session_steps")]
    pub max_session_steps: u32,

    /// Charge the connect fee on the first loop of a session only
    #[serde(default = "default_connect_fee_on_first_loop")]
    pub connect_fee_on_first_loop: bool,
}

fn default_max_fallback_depth() -> usize {
    4
}

fn default_max_session_steps() -> u32 {
    10
}

fn default_connect_fee_on_first_loop() -> bool {
    true
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            max_fallback_depth: default_max_fallback_depth(),
            max_session_steps: default_max_session_steps(),
            connect_fee_on_first_loop: default_connect_fee_on_first_loop(),
        }
    }
}

/// Background scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Run the action timing scheduler
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,

    /// Delay applied to `*asap` timings at load time
    #[serde(default = "default_asap_delay")]
    pub asap_delay_secs: u64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_asap_delay() -> u64 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            asap_delay_secs: default_asap_delay(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("storage.backend", "memory")?
            .set_default("storage.redis_url", default_redis_url())?
            .set_default("rating.max_fallback_depth", 4)?
            .set_default("rating.max_session_steps", 10)?
            .set_default("rating.connect_fee_on_first_loop", true)?
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.asap_delay_secs", 1)?
            .set_default("log.level", "info")?
            .set_default("log.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("RATER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RATER").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
