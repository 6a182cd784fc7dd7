//! Storage adapters for the rating engine
//!
//! Provides the two `DataStorage` implementations shipped with the engine:
//!
//! - `MapStorage`: in-process copy-on-write maps, used by tests and the
//!   `memory` backend
//! - `RedisStorage`: Redis through a `ConnectionManager`
//!
//! Both store entities as JSON under the keys built in [`keys`].

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use memory::MapStorage;
pub use redis_store::RedisStorage;

use chrono::{DateTime, Utc};
use rater_core::models::{Action, ActionTiming, ActionTrigger};
use rater_core::{AppError, AppResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::error;

/// Action log entry for a fired trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTriggerLog {
    pub account_id: String,
    pub source: String,
    pub trigger: ActionTrigger,
    pub actions: Vec<Action>,
    pub logged_at: DateTime<Utc>,
}

/// Action log entry for an executed timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTimingLog {
    pub source: String,
    pub timing: ActionTiming,
    pub actions: Vec<Action>,
    pub logged_at: DateTime<Utc>,
}

pub(crate) fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|e| {
        error!("Failed to serialize value for key {}: {}", key, e);
        AppError::Serialization(format!("Serialization failed: {}", e))
    })
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, json: &str) -> AppResult<T> {
    serde_json::from_str(json).map_err(|e| {
        error!("Failed to deserialize value for key {}: {}", key, e);
        AppError::Serialization(format!("Deserialization failed: {}", e))
    })
}

pub(crate) fn validate_timings(timings: &[ActionTiming]) -> AppResult<()> {
    timings.iter().try_for_each(ActionTiming::validate)
}
