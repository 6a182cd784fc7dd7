//! In-memory storage
//!
//! Entities are kept as JSON strings in a single map. Writers clone the map
//! when readers still hold a snapshot, so a rating pass always sees one
//! consistent version of the tariff data.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rater_core::models::{
    sort_actions, Account, Action, ActionTiming, ActionTrigger, CallCost, Destination,
    RatingProfile,
};
use rater_core::traits::DataStorage;
use rater_core::AppResult;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::keys;
use crate::{decode, encode, validate_timings, ActionTimingLog, ActionTriggerLog};

#[derive(Debug, Default)]
pub struct MapStorage {
    data: RwLock<Arc<HashMap<String, String>>>,
}

impl MapStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of the whole map
    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.data.read().clone()
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let snapshot = self.snapshot();
        match snapshot.get(key) {
            Some(json) => decode(key, json).map(Some),
            None => {
                debug!("MISS {}", key);
                Ok(None)
            }
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        let json = encode(key, value)?;
        let mut data = self.data.write();
        Arc::make_mut(&mut data).insert(key.to_string(), json);
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut data = self.data.write();
        if data.contains_key(key) {
            Arc::make_mut(&mut data).remove(key);
        }
    }

    /// Decoded values of every key under `prefix`
    pub fn values_with_prefix<T: DeserializeOwned>(&self, prefix: &str) -> AppResult<Vec<T>> {
        let snapshot = self.snapshot();
        let mut entries: Vec<(&String, &String)> =
            snapshot.iter().filter(|(k, _)| k.starts_with(prefix)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(k, v)| decode(k, v)).collect()
    }

    pub fn call_cost_logs(&self) -> AppResult<Vec<CallCost>> {
        self.values_with_prefix(keys::CALL_COST_LOG_PREFIX)
    }

    pub fn action_trigger_logs(&self) -> AppResult<Vec<ActionTriggerLog>> {
        let snapshot = self.snapshot();
        Ok(snapshot
            .iter()
            .filter(|(k, _)| k.starts_with(keys::ACTION_LOG_PREFIX))
            .filter_map(|(_, v)| serde_json::from_str::<ActionTriggerLog>(v).ok())
            .collect())
    }

    pub fn action_timing_logs(&self) -> AppResult<Vec<ActionTimingLog>> {
        let snapshot = self.snapshot();
        Ok(snapshot
            .iter()
            .filter(|(k, _)| k.starts_with(keys::ACTION_LOG_PREFIX))
            .filter_map(|(_, v)| serde_json::from_str::<ActionTimingLog>(v).ok())
            .collect())
    }
}

#[async_trait]
impl DataStorage for MapStorage {
    async fn get_rating_profile(&self, key: &str) -> AppResult<Option<RatingProfile>> {
        self.get_json(&keys::rating_profile_key(key))
    }

    async fn set_rating_profile(&self, profile: &RatingProfile) -> AppResult<()> {
        profile.validate()?;
        self.set_json(&keys::rating_profile_key(&profile.id), profile)
    }

    async fn get_destination(&self, id: &str) -> AppResult<Option<Destination>> {
        self.get_json(&keys::destination_key(id))
    }

    async fn set_destination(&self, destination: &Destination) -> AppResult<()> {
        self.set_json(&keys::destination_key(&destination.id), destination)
    }

    async fn get_account(&self, id: &str) -> AppResult<Option<Account>> {
        self.get_json(&keys::account_key(id))
    }

    async fn set_account(&self, account: &Account) -> AppResult<()> {
        self.set_json(&keys::account_key(&account.id), account)
    }

    async fn get_actions(&self, id: &str) -> AppResult<Option<Vec<Action>>> {
        let mut actions: Option<Vec<Action>> = self.get_json(&keys::actions_key(id))?;
        if let Some(actions) = actions.as_mut() {
            sort_actions(actions);
        }
        Ok(actions)
    }

    async fn set_actions(&self, id: &str, actions: &[Action]) -> AppResult<()> {
        self.set_json(&keys::actions_key(id), actions)
    }

    async fn get_action_timings(&self, key: &str) -> AppResult<Option<Vec<ActionTiming>>> {
        self.get_json(&keys::action_timings_key(key))
    }

    async fn set_action_timings(&self, key: &str, timings: &[ActionTiming]) -> AppResult<()> {
        validate_timings(timings)?;
        let storage_key = keys::action_timings_key(key);
        if timings.is_empty() {
            self.remove(&storage_key);
            return Ok(());
        }
        self.set_json(&storage_key, timings)
    }

    async fn get_all_action_timings(&self) -> AppResult<Vec<(String, Vec<ActionTiming>)>> {
        let snapshot = self.snapshot();
        let mut plans = Vec::new();
        for (key, json) in snapshot.iter() {
            if let Some(plan) = key.strip_prefix(keys::ACTION_TIMINGS_PREFIX) {
                plans.push((plan.to_string(), decode(key, json)?));
            }
        }
        plans.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(plans)
    }

    async fn log_call_cost(&self, uuid: Uuid, source: &str, cost: &CallCost) -> AppResult<()> {
        self.set_json(&keys::call_cost_log_key(source, &uuid.to_string()), cost)
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
    }
}
