//! Storage collaborator trait
//!
//! The engine and scheduler reach tariff data, accounts and the audit logs
//! only through `DataStorage`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Account, Action, ActionTiming, ActionTrigger, CallCost, Destination, RatingProfile,
};
use crate::AppResult;

/// Tariff, account and log storage
///
/// Getters return `Ok(None)` for missing entities; callers map that to the
/// not-found error that fits their context.
#[async_trait]
pub trait DataStorage: Send + Sync {
    async fn get_rating_profile(&self, key: &str) -> AppResult<Option<RatingProfile>>;

    /// Validates the profile before storing it
    async fn set_rating_profile(&self, profile: &RatingProfile) -> AppResult<()>;

    async fn get_destination(&self, id: &str) -> AppResult<Option<Destination>>;

    async fn set_destination(&self, destination: &Destination) -> AppResult<()>;

    async fn get_account(&self, id: &str) -> AppResult<Option<Account>>;

    async fn set_account(&self, account: &Account) -> AppResult<()>;

    /// Actions of a bundle, sorted by ascending weight
    async fn get_actions(&self, id: &str) -> AppResult<Option<Vec<Action>>>;

    async fn set_actions(&self, id: &str, actions: &[Action]) -> AppResult<()>;

    async fn get_action_timings(&self, key: &str) -> AppResult<Option<Vec<ActionTiming>>>;

    /// Validates every timing; an empty list removes the key
    async fn set_action_timings(&self, key: &str, timings: &[ActionTiming]) -> AppResult<()>;

    /// Every stored timing list, keyed by plan key
    async fn get_all_action_timings(&self) -> AppResult<Vec<(String, Vec<ActionTiming>)>>;

    async fn log_call_cost(&self, uuid: Uuid, source: &str, cost: &CallCost) -> AppResult<()>;

    async fn log_action_trigger(
        &self,
        account_id: &str,
        source: &str,
        trigger: &ActionTrigger,
        actions: &[Action],
    ) -> AppResult<()>;

    async fn log_action_timing(
        &self,
        source: &str,
        timing: &ActionTiming,
        actions: &[Action],
    ) -> AppResult<()>;
}
