//! Redis storage
//!
//! Stores every entity as a JSON string under the keys from [`crate::keys`].
//! Connections are multiplexed through a `ConnectionManager`, which
//! reconnects on its own after transient failures.

use async_trait::async_trait;
use chrono::Utc;
use rater_core::models::{
    sort_actions, Account, Action, ActionTiming, ActionTrigger, CallCost, Destination,
    RatingProfile,
};
use rater_core::traits::DataStorage;
use rater_core::{AppError, AppResult};
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::keys;
use crate::{decode, encode, validate_timings, ActionTimingLog, ActionTriggerLog};

#[derive(Clone)]
pub struct RedisStorage {
    manager: ConnectionManager,
}

impl RedisStorage {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns `AppError::StorageConnection` if the URL is invalid or the
    /// server cannot be reached
    pub async fn new(url: &str) -> AppResult<Self> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::StorageConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::StorageConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established");
        Ok(Self { manager })
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    #[cfg(test)]
    async fn flush_db(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::StorageConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Storage(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Storage(err.to_string())
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();
        let result: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;
        result.map(|json| decode(key, &json)).transpose()
    }

    async fn set_json<T: Serialize + Sync + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        debug!("SET {}", key);
        let json = encode(key, value)?;
        let mut conn = self.manager.clone();
        let _: () = conn.set(key, json).await.map_err(Self::map_redis_error)?;
        Ok(())
    }
}

#[async_trait]
impl DataStorage for RedisStorage {
    async fn get_rating_profile(&self, key: &str) -> AppResult<Option<RatingProfile>> {
        self.get_json(&keys::rating_profile_key(key)).await
    }

    async fn set_rating_profile(&self, profile: &RatingProfile) -> AppResult<()> {
        profile.validate()?;
        self.set_json(&keys::rating_profile_key(&profile.id), profile).await
    }

    async fn get_destination(&self, id: &str) -> AppResult<Option<Destination>> {
        self.get_json(&keys::destination_key(id)).await
    }

    async fn set_destination(&self, destination: &Destination) -> AppResult<()> {
        self.set_json(&keys::destination_key(&destination.id), destination).await
    }

    async fn get_account(&self, id: &str) -> AppResult<Option<Account>> {
        self.get_json(&keys::account_key(id)).await
    }

    async fn set_account(&self, account: &Account) -> AppResult<()> {
        self.set_json(&keys::account_key(&account.id), account).await
    }

    async fn get_actions(&self, id: &str) -> AppResult<Option<Vec<Action>>> {
        let mut actions: Option<Vec<Action>> = self.get_json(&keys::actions_key(id)).await?;
        if let Some(actions) = actions.as_mut() {
            sort_actions(actions);
        }
        Ok(actions)
    }

    async fn set_actions(&self, id: &str, actions: &[Action]) -> AppResult<()> {
        self.set_json(&keys::actions_key(id), actions).await
    }

    async fn get_action_timings(&self, key: &str) -> AppResult<Option<Vec<ActionTiming>>> {
        self.get_json(&keys::action_timings_key(key)).await
    }

    async fn set_action_timings(&self, key: &str, timings: &[ActionTiming]) -> AppResult<()> {
        validate_timings(timings)?;
        let storage_key = keys::action_timings_key(key);
        if timings.is_empty() {
            debug!("DEL {}", storage_key);
            let mut conn = self.manager.clone();
            let _: i64 = conn.del(&storage_key).await.map_err(Self::map_redis_error)?;
            return Ok(());
        }
        self.set_json(&storage_key, timings).await
    }

    async fn get_all_action_timings(&self) -> AppResult<Vec<(String, Vec<ActionTiming>)>> {
        let mut conn = self.manager.clone();
        let mut plan_keys: Vec<String> = conn
            .keys(keys::pattern(keys::ACTION_TIMINGS_PREFIX))
            .await
            .map_err(Self::map_redis_error)?;
        plan_keys.sort();

        let mut plans = Vec::with_capacity(plan_keys.len());
        for key in plan_keys {
            let Some(plan) = key.strip_prefix(keys::ACTION_TIMINGS_PREFIX) else {
                continue;
            };
            // removed between KEYS and GET
            if let Some(timings) = self.get_json::<Vec<ActionTiming>>(&key).await? {
                plans.push((plan.to_string(), timings));
            }
        }
        Ok(plans)
    }

    async fn log_call_cost(&self, uuid: Uuid, source: &str, cost: &CallCost) -> AppResult<()> {
        self.set_json(&keys::call_cost_log_key(source, &uuid.to_string()), cost)
            .await
    }

    async fn log_action_trigger(
        &self,
        account_id: &str,
        source: &str,
        trigger: &ActionTrigger,
        actions: &[Action],
    ) -> AppResult<()> {
        let entry = ActionTriggerLog {
            account_id: account_id.to_string(),
            source: source.to_string(),
            trigger: trigger.clone(),
            actions: actions.to_vec(),
            logged_at: Utc::now(),
        };
        self.set_json(&keys::action_log_key(&Uuid::new_v4().to_string()), &entry)
            .await
    }

    async fn log_action_timing(
        &self,
        source: &str,
        timing: &ActionTiming,
        actions: &[Action],
    ) -> AppResult<()> {
        let entry = ActionTimingLog {
            source: source.to_string(),
            timing: timing.clone(),
            actions: actions.to_vec(),
            logged_at: Utc::now(),
        };
        self.set_json(&keys::action_log_key(&Uuid::new_v4().to_string()), &entry)
            .await
    }
}
