//! Account balance state
//!
//! An account owns its balances, bonus minute buckets, usage counters and
//! action triggers. All mutations go through the methods below and are
//! expected to run while the caller holds the account's guard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::action::{sort_actions, sort_triggers, Action, ActionTrigger, UnitCounter};
use super::balance::{balance_key, AccountType, BalanceKind, Direction};
use super::bucket::{compare_buckets, sort_buckets, MinuteBucket};
use super::destination::{Destination, DestinationIndex};
use crate::actions;
use crate::error::AppError;
use crate::AppResult;

/// Lookups preloaded for one guarded account operation
///
/// Holds the destinations referenced by buckets and triggers and the action
/// bundles referenced by triggers, so the state machine itself never touches
/// storage.
#[derive(Debug, Clone, Default)]
pub struct AccountContext {
    pub destinations: DestinationIndex,
    pub action_bundles: HashMap<String, Vec<Action>>,
}

impl AccountContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destinations.insert(destination.id.clone(), destination);
        self
    }

    pub fn with_actions(mut self, id: &str, actions: Vec<Action>) -> Self {
        self.action_bundles.insert(id.to_string(), actions);
        self
    }

    /// Prefix match length of `number` against a destination, 0 if unknown
    pub fn precision(&self, destination_id: &str, number: &str) -> usize {
        self.destinations
            .get(destination_id)
            .map_or(0, |d| d.contains_prefix(number))
    }

    pub fn actions(&self, id: &str) -> Option<&[Action]> {
        self.action_bundles.get(id).map(Vec::as_slice)
    }
}

/// Trigger firing waiting to be written to the action log
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTrigger {
    pub trigger: ActionTrigger,
    pub actions: Vec<Action>,
}

/// Customer balance account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// `tenant:subject`
    pub id: String,

    #[serde(default)]
    pub account_type: AccountType,

    /// Amounts keyed by `balance_key`
    #[serde(default)]
    pub balance_map: BTreeMap<String, Decimal>,

    #[serde(default)]
    pub minute_buckets: Vec<MinuteBucket>,

    #[serde(default)]
    pub unit_counters: Vec<UnitCounter>,

    #[serde(default)]
    pub action_triggers: Vec<ActionTrigger>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(skip)]
    fired_triggers: Vec<FiredTrigger>,
}

impl Account {
    pub fn new(id: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: id.into(),
            account_type,
            balance_map: BTreeMap::new(),
            minute_buckets: Vec::new(),
            unit_counters: Vec::new(),
            action_triggers: Vec::new(),
            disabled: false,
            fired_triggers: Vec::new(),
        }
    }

    /// Builds the account id
    pub fn key(tenant: &str, subject: &str) -> String {
        format!("{}:{}", tenant, subject)
    }

    pub fn is_prepaid(&self) -> bool {
        self.account_type == AccountType::Prepaid
    }

    pub fn balance(&self, kind: BalanceKind, direction: Direction) -> Decimal {
        self.balance_map
            .get(&balance_key(kind, direction))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_balance(&mut self, kind: BalanceKind, direction: Direction, value: Decimal) {
        self.balance_map.insert(balance_key(kind, direction), value);
    }

    /// Subtracts `amount` from a balance and returns the new value.
    ///
    /// Money may go below zero. With `count`, the amount is first fed to the
    /// unit counters, so triggers fire before the debit lands.
    pub fn debit_balance(
        &mut self,
        kind: BalanceKind,
        direction: Direction,
        amount: Decimal,
        count: bool,
        ctx: &AccountContext,
    ) -> Decimal {
        if count {
            self.count_units(kind, direction, amount, "", ctx);
        }
        let entry = self
            .balance_map
            .entry(balance_key(kind, direction))
            .or_insert(Decimal::ZERO);
        *entry -= amount;
        *entry
    }

    /// Indices of live buckets usable for `number`, in consumption order
    fn matching_buckets(&mut self, number: &str, ctx: &AccountContext, at: DateTime<Utc>) -> Vec<usize> {
        let mut indices = Vec::new();
        for (i, bucket) in self.minute_buckets.iter_mut().enumerate() {
            if bucket.destination_id.is_empty() || bucket.is_expired_at(at) {
                continue;
            }
            bucket.precision = ctx.precision(&bucket.destination_id, number);
            if bucket.precision > 0 && bucket.seconds > Decimal::ZERO {
                indices.push(i);
            }
        }
        let buckets = &self.minute_buckets;
        indices.sort_by(|a, b| compare_buckets(&buckets[*a], &buckets[*b]));
        indices
    }

    /// Copies of the buckets usable for `number` at `at`, in consumption order
    pub fn buckets_for_prefix(
        &mut self,
        number: &str,
        ctx: &AccountContext,
        at: DateTime<Utc>,
    ) -> Vec<MinuteBucket> {
        self.matching_buckets(number, ctx, at)
            .into_iter()
            .map(|i| self.minute_buckets[i].clone())
            .collect()
    }

    /// Bonus seconds available for `number`, limited by money for priced
    /// buckets
    pub fn seconds_for_prefix(
        &mut self,
        number: &str,
        direction: Direction,
        ctx: &AccountContext,
    ) -> Decimal {
        let order = self.matching_buckets(number, ctx, Utc::now());
        self.available_seconds(&order, direction)
    }

    fn available_seconds(&self, order: &[usize], direction: Direction) -> Decimal {
        let mut credit = self.balance(BalanceKind::Monetary, direction);
        let mut seconds = Decimal::ZERO;
        for &i in order {
            let bucket = &self.minute_buckets[i];
            let s = bucket.seconds_for_credit(credit);
            credit -= s * bucket.price;
            seconds += s;
        }
        seconds
    }

    /// Drains `amount` bonus seconds for calls to `number`.
    ///
    /// Nothing is touched unless both the buckets and, for priced buckets,
    /// the money balance can cover the whole amount. A negative amount is
    /// refunded into the first matching bucket.
    pub fn debit_minutes(
        &mut self,
        amount: Decimal,
        number: &str,
        direction: Direction,
        count: bool,
        ctx: &AccountContext,
    ) -> AppResult<()> {
        let order = self.matching_buckets(number, ctx, Utc::now());
        let available = self.available_seconds(&order, direction);
        if available < amount {
            return Err(AppError::AmountTooBig {
                requested: amount.to_string(),
                available: available.to_string(),
            });
        }

        let credit = self.balance(BalanceKind::Monetary, direction);
        let mut credit_left = credit;
        let mut remaining = amount;
        let mut money = Decimal::ZERO;
        let mut plan = Vec::with_capacity(order.len());
        for &i in &order {
            if remaining.is_zero() {
                break;
            }
            let bucket = &self.minute_buckets[i];
            // priced buckets only give what the money left can pay for
            let take = if remaining < Decimal::ZERO {
                remaining
            } else {
                bucket.seconds_for_credit(credit_left).min(remaining)
            };
            if take.is_zero() {
                continue;
            }
            money += take * bucket.price;
            credit_left -= take * bucket.price;
            plan.push((i, take));
            remaining -= take;
        }

        if money > Decimal::ZERO && credit - money < Decimal::ZERO {
            return Err(AppError::AmountTooBig {
                requested: money.to_string(),
                available: credit.to_string(),
            });
        }

        for (i, take) in plan {
            self.minute_buckets[i].seconds -= take;
        }
        if !money.is_zero() {
            self.set_balance(BalanceKind::Monetary, direction, credit - money);
        }
        debug!(account = %self.id, %amount, %money, "Debited minutes for {}", number);

        if count {
            self.count_units(BalanceKind::Minutes, direction, amount, number, ctx);
        }
        Ok(())
    }

    /// Feeds usage into the matching counter and re-evaluates triggers
    pub fn count_units(
        &mut self,
        kind: BalanceKind,
        direction: Direction,
        amount: Decimal,
        number: &str,
        ctx: &AccountContext,
    ) {
        let idx = match self
            .unit_counters
            .iter()
            .position(|c| c.matches(kind, direction))
        {
            Some(idx) => idx,
            None => {
                let mut counter = UnitCounter::new(kind, direction);
                if kind == BalanceKind::Minutes {
                    counter.minute_buckets = self.counter_buckets_from_triggers(ctx);
                }
                self.unit_counters.push(counter);
                self.unit_counters.len() - 1
            }
        };

        let seed_destination = if kind == BalanceKind::Minutes && !number.is_empty() {
            self.action_triggers
                .iter()
                .filter(|t| t.balance_kind == BalanceKind::Minutes && t.direction == direction)
                .find(|t| ctx.precision(&t.destination_id, number) > 0)
                .map(|t| t.destination_id.clone())
        } else {
            None
        };

        let counter = &mut self.unit_counters[idx];
        counter.units += amount;
        if kind == BalanceKind::Minutes && !number.is_empty() {
            for bucket in counter.minute_buckets.iter_mut() {
                bucket.precision = ctx.precision(&bucket.destination_id, number);
            }
            sort_buckets(&mut counter.minute_buckets);
            match counter.minute_buckets.iter_mut().find(|b| b.precision > 0) {
                Some(bucket) => bucket.seconds += amount,
                None => {
                    if let Some(destination_id) = seed_destination {
                        counter.minute_buckets.push(MinuteBucket::new(
                            amount,
                            0.0,
                            Decimal::ZERO,
                            &destination_id,
                        ));
                    }
                }
            }
        }

        self.execute_action_triggers(ctx);
    }

    /// Empty per-destination buckets taken from the triggers' bundles
    fn counter_buckets_from_triggers(&self, ctx: &AccountContext) -> Vec<MinuteBucket> {
        let mut buckets: Vec<MinuteBucket> = Vec::new();
        for trigger in &self.action_triggers {
            let Some(actions) = ctx.actions(&trigger.actions_id) else {
                continue;
            };
            for bucket in actions.iter().filter_map(|a| a.minute_bucket.as_ref()) {
                if !buckets.iter().any(|b| b.equal(bucket)) {
                    buckets.push(bucket.emptied());
                }
            }
        }
        sort_buckets(&mut buckets);
        buckets
    }

    fn trigger_reached(&self, trigger: &ActionTrigger) -> bool {
        self.unit_counters
            .iter()
            .filter(|c| c.matches(trigger.balance_kind, trigger.direction))
            .any(|c| {
                if trigger.balance_kind == BalanceKind::Minutes && !trigger.destination_id.is_empty() {
                    c.minute_buckets.iter().any(|b| {
                        b.destination_id == trigger.destination_id
                            && b.seconds >= trigger.threshold_value
                    })
                } else {
                    c.units >= trigger.threshold_value
                }
            })
    }

    /// Runs every armed trigger whose counter reached its threshold
    pub fn execute_action_triggers(&mut self, ctx: &AccountContext) {
        sort_triggers(&mut self.action_triggers);
        for i in 0..self.action_triggers.len() {
            let trigger = self.action_triggers[i].clone();
            if trigger.executed || !self.trigger_reached(&trigger) {
                continue;
            }
            let Some(bundle) = ctx.actions(&trigger.actions_id) else {
                warn!(account = %self.id, trigger = %trigger.id, "Actions {} not loaded", trigger.actions_id);
                continue;
            };
            let mut actions = bundle.to_vec();
            sort_actions(&mut actions);

            if let Err(e) = self.run_actions(&actions, ctx) {
                warn!(account = %self.id, trigger = %trigger.id, "Trigger actions aborted: {}", e);
                continue;
            }
            if !trigger.recurrent {
                self.action_triggers[i].executed = true;
            }
            info!(account = %self.id, trigger = %trigger.id, "Executed action trigger");
            self.fired_triggers.push(FiredTrigger { trigger, actions });
        }
    }

    /// Re-arms one-shot triggers
    pub fn reset_action_triggers(&mut self) {
        for trigger in self.action_triggers.iter_mut() {
            trigger.executed = false;
        }
    }

    /// Applies actions in order. When one fails the account is left exactly
    /// as it was before the first action.
    pub fn run_actions(&mut self, actions: &[Action], ctx: &AccountContext) -> AppResult<()> {
        let mut staged = self.clone();
        for action in actions {
            let handler = actions::handler(&action.action_type)
                .ok_or_else(|| AppError::UnsupportedAction(action.action_type.to_string()))?;
            handler(&mut staged, action, ctx)?;
        }
        *self = staged;
        Ok(())
    }

    /// Adds seconds to an equal bucket or appends a copy
    pub fn add_minute_bucket(&mut self, bucket: &MinuteBucket) {
        match self.minute_buckets.iter_mut().find(|b| b.equal(bucket)) {
            Some(existing) => existing.seconds += bucket.seconds,
            None => self.minute_buckets.push(bucket.clone()),
        }
    }

    /// Removes seconds from an equal bucket, returning false if none exists
    pub fn debit_minute_bucket(&mut self, bucket: &MinuteBucket) -> bool {
        match self.minute_buckets.iter_mut().find(|b| b.equal(bucket)) {
            Some(existing) => {
                existing.seconds -= bucket.seconds;
                true
            }
            None => false,
        }
    }

    /// Zeroes one counter, creating it when missing
    pub fn reset_counter(&mut self, kind: BalanceKind, direction: Direction, ctx: &AccountContext) {
        if !self.unit_counters.iter().any(|c| c.matches(kind, direction)) {
            self.unit_counters.push(UnitCounter::new(kind, direction));
        }
        let buckets = self.counter_buckets_from_triggers(ctx);
        for counter in self
            .unit_counters
            .iter_mut()
            .filter(|c| c.matches(kind, direction))
        {
            reset_unit_counter(counter, &buckets);
        }
    }

    /// Zeroes every counter
    pub fn reset_all_counters(&mut self, ctx: &AccountContext) {
        let buckets = self.counter_buckets_from_triggers(ctx);
        for counter in self.unit_counters.iter_mut() {
            reset_unit_counter(counter, &buckets);
        }
    }

    /// Wipes balances, buckets and counters and re-arms triggers
    pub fn reset(&mut self, account_type: AccountType) {
        self.account_type = account_type;
        self.balance_map.clear();
        self.minute_buckets.clear();
        self.unit_counters.clear();
        self.reset_action_triggers();
    }

    /// Drops expired and empty buckets
    pub fn clean_expired_buckets(&mut self, now: DateTime<Utc>) {
        self.minute_buckets
            .retain(|b| !b.is_expired_at(now) && !b.seconds.is_zero());
    }

    /// Destination ids referenced by buckets, counters and triggers
    pub fn referenced_destinations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .minute_buckets
            .iter()
            .chain(self.unit_counters.iter().flat_map(|c| c.minute_buckets.iter()))
            .map(|b| b.destination_id.clone())
            .chain(self.action_triggers.iter().map(|t| t.destination_id.clone()))
            .filter(|id| !id.is_empty())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Action bundle ids referenced by triggers
    pub fn referenced_action_bundles(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .action_triggers
            .iter()
            .map(|t| t.actions_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Hands over trigger firings recorded since the last call
    pub fn take_fired_triggers(&mut self) -> Vec<FiredTrigger> {
        std::mem::take(&mut self.fired_triggers)
    }
}

fn reset_unit_counter(counter: &mut UnitCounter, buckets: &[MinuteBucket]) {
    counter.units = Decimal::ZERO;
    counter.minute_buckets = if counter.balance_kind == BalanceKind::Minutes {
        buckets.to_vec()
    } else {
        Vec::new()
    };
}
