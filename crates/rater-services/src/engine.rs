//! Cost engine
//!
//! Prices call descriptors against rating profiles and applies the results
//! to accounts. Read-only operations run without locks; every account
//! mutation holds the account's guard from load to persist.
//!
//! # Flow
//!
//! 1. Resolve the activation periods for the call destination, following
//!    profile fallbacks
//! 2. Load the account and what its buckets and triggers reference
//! 3. Split the call window and price every span
//! 4. Drain bonus seconds and money, letting triggers fire
//! 5. Persist the account and log the call cost

use chrono::Utc;
use rater_core::{
    config::RatingConfig,
    models::{
        secs_duration, Account, AccountContext, ActivationPeriod, Action, BalanceKind, CallCost,
        CallDescriptor, DestinationIndex, Direction, MaxSessionTime, MinuteBucket,
    },
    traits::DataStorage,
    AppError, AppResult,
};
use rater_store::keys;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::RATER_SOURCE;
use crate::guard::KeyedGuard;
use crate::splitter;

/// Rating and debit service
pub struct Engine<S: DataStorage> {
    storage: Arc<S>,
    guard: Arc<KeyedGuard>,
    config: RatingConfig,
}

impl<S: DataStorage + 'static> Engine<S> {
    pub fn new(storage: Arc<S>, guard: Arc<KeyedGuard>, config: RatingConfig) -> Self {
        Self {
            storage,
            guard,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn guard(&self) -> &Arc<KeyedGuard> {
        &self.guard
    }

    /// Resolves the matched prefix and activation periods for the call,
    /// walking the fallback chain
    async fn rating_periods(&self, cd: &CallDescriptor) -> AppResult<(String, Vec<ActivationPeriod>)> {
        let mut key = cd.profile_key();

        for depth in 0..=self.config.max_fallback_depth {
            let profile = self
                .storage
                .get_rating_profile(&key)
                .await?
                .ok_or_else(|| AppError::RatingProfileNotFound(key.clone()))?;

            let mut destinations = DestinationIndex::new();
            for id in profile.destination_ids() {
                match self.storage.get_destination(id).await? {
                    Some(destination) => {
                        destinations.insert(id.clone(), destination);
                    }
                    None => warn!(profile = %profile.id, "Destination {} not found", id),
                }
            }

            if let Some((prefix, periods)) =
                profile.activation_periods_for_prefix(&cd.destination, &destinations)
            {
                debug!(profile = %profile.id, depth, "Matched prefix {}", prefix);
                return Ok((prefix, periods.to_vec()));
            }

            match profile.fallback_key {
                Some(fallback) => key = fallback,
                None => break,
            }
        }

        Err(AppError::RatingProfileNotFound(format!(
            "{} for destination {}",
            cd.profile_key(),
            cd.destination
        )))
    }

    /// Preloads destinations and bundles referenced by the account and by
    /// `actions`
    async fn load_context(&self, account: &Account, actions: &[Action]) -> AppResult<AccountContext> {
        let mut ctx = AccountContext::new();

        for id in account.referenced_action_bundles() {
            match self.storage.get_actions(&id).await? {
                Some(bundle) => {
                    ctx.action_bundles.insert(id, bundle);
                }
                None => warn!(account = %account.id, "Actions {} not found", id),
            }
        }

        let mut destination_ids = account.referenced_destinations();
        destination_ids.extend(
            ctx.action_bundles
                .values()
                .flatten()
                .chain(actions.iter())
                .filter_map(|a| a.minute_bucket.as_ref())
                .map(|b| b.destination_id.clone())
                .filter(|id| !id.is_empty()),
        );
        destination_ids.sort();
        destination_ids.dedup();

        for id in destination_ids {
            match self.storage.get_destination(&id).await? {
                Some(destination) => {
                    ctx.destinations.insert(id, destination);
                }
                None => warn!(account = %account.id, "Destination {} not found", id),
            }
        }
        Ok(ctx)
    }

    async fn load_account(&self, id: &str) -> AppResult<Account> {
        self.storage
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    /// Account ready for mutation: present, enabled and without stale
    /// buckets
    async fn load_active_account(&self, id: &str) -> AppResult<Account> {
        let mut account = self.load_account(id).await?;
        if account.disabled {
            return Err(AppError::AccountDisabled(id.to_string()));
        }
        account.clean_expired_buckets(Utc::now());
        Ok(account)
    }

    /// Buckets usable for the call, priced ones limited by the money left
    fn bonus_buckets(account: &mut Account, cd: &CallDescriptor, ctx: &AccountContext) -> Vec<MinuteBucket> {
        let mut buckets = account.buckets_for_prefix(&cd.destination, ctx, cd.time_start);
        let mut credit = account.balance(BalanceKind::Monetary, cd.direction);
        for bucket in buckets.iter_mut() {
            let seconds = bucket.seconds_for_credit(credit);
            credit -= seconds * bucket.price;
            bucket.seconds = seconds;
        }
        buckets
    }

    fn price(
        &self,
        cd: &CallDescriptor,
        prefix: &str,
        periods: &[ActivationPeriod],
        buckets: &[MinuteBucket],
    ) -> CallCost {
        let spans = splitter::split(cd.time_start, cd.time_end, cd.call_duration, periods, buckets);
        let mut cost = CallCost::new(cd, prefix, spans);

        if cd.loop_index == 0 || !self.config.connect_fee_on_first_loop {
            if let Some(first) = cost.timespans.first().filter(|ts| !ts.is_bonus()) {
                cost.connect_fee = first
                    .interval
                    .as_ref()
                    .map_or(Decimal::ZERO, |i| i.connect_fee);
            }
        }
        debug!(
            cost = %cost.cost,
            connect_fee = %cost.connect_fee,
            spans = cost.timespans.len(),
            "Priced call to {}",
            cd.destination
        );
        cost
    }

    /// Writes the account and hands its trigger firings to the action log
    async fn persist(&self, account: &mut Account) -> AppResult<()> {
        let fired = account.take_fired_triggers();
        self.storage.set_account(account).await.map_err(|e| {
            error!(account = %account.id, "Failed to persist account: {}", e);
            e
        })?;

        for firing in fired {
            let storage = self.storage.clone();
            let account_id = account.id.clone();
            tokio::spawn(async move {
                if let Err(e) = storage
                    .log_action_trigger(&account_id, RATER_SOURCE, &firing.trigger, &firing.actions)
                    .await
                {
                    warn!(account = %account_id, "Failed to log action trigger: {}", e);
                }
            });
        }
        Ok(())
    }

    /// Cost of the call without touching the account
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn get_cost(&self, cd: &CallDescriptor) -> AppResult<CallCost> {
        let (prefix, periods) = self.rating_periods(cd).await?;

        let buckets = match self.storage.get_account(&cd.account_key()).await? {
            Some(mut account) => {
                let ctx = self.load_context(&account, &[]).await?;
                Self::bonus_buckets(&mut account, cd, &ctx)
            }
            None => Vec::new(),
        };

        Ok(self.price(cd, &prefix, &periods, &buckets))
    }

    /// Longest part of the requested duration the account can pay for
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn get_max_session_time(&self, cd: &CallDescriptor) -> AppResult<MaxSessionTime> {
        let mut account = self.load_account(&cd.account_key()).await?;
        if !account.is_prepaid() {
            return Ok(MaxSessionTime::Unlimited);
        }

        let ctx = self.load_context(&account, &[]).await?;
        let requested = cd.requested_secs();
        let bonus = account
            .seconds_for_prefix(&cd.destination, cd.direction, &ctx)
            .min(requested);
        let money = account.balance(BalanceKind::Monetary, cd.direction);
        if money <= Decimal::ZERO {
            debug!(%bonus, "No money left, bonus seconds only");
            return Ok(MaxSessionTime::Seconds(bonus));
        }

        let (prefix, periods) = self.rating_periods(cd).await?;
        let buckets = Self::bonus_buckets(&mut account, cd, &ctx);
        let steps = Decimal::from(self.config.max_session_steps.max(1));

        let mut step = steps;
        while step > Decimal::ZERO {
            let candidate = requested * step / steps;
            let mut probe = cd.clone();
            probe.time_end = probe.time_start + secs_duration(candidate);

            let cost = self.price(&probe, &prefix, &periods, &buckets);
            if cost.total() <= money {
                debug!(%candidate, total = %cost.total(), "Affordable duration found");
                return Ok(MaxSessionTime::Seconds(candidate));
            }
            step -= Decimal::ONE;
        }

        Ok(MaxSessionTime::Seconds(bonus))
    }

    /// Prices the call and charges it to the account
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn debit(&self, cd: &CallDescriptor) -> AppResult<CallCost> {
        let account_id = cd.account_key();
        let _ticket = self.guard.lock(&keys::account_key(&account_id)).await;
        self.debit_locked(cd).await
    }

    async fn debit_locked(&self, cd: &CallDescriptor) -> AppResult<CallCost> {
        let account_id = cd.account_key();
        let mut account = self.load_active_account(&account_id).await?;
        let ctx = self.load_context(&account, &[]).await?;

        let (prefix, periods) = self.rating_periods(cd).await?;
        let buckets = Self::bonus_buckets(&mut account, cd, &ctx);
        let cost = self.price(cd, &prefix, &periods, &buckets);

        for span in cost.bonus_spans() {
            account.debit_minutes(span.duration_secs(), &cd.destination, cd.direction, true, &ctx)?;
        }
        let money = cost.money_cost();
        let balance = account.debit_balance(BalanceKind::Monetary, cd.direction, money, true, &ctx);

        self.persist(&mut account).await?;
        info!(
            account = %account_id,
            cost = %cost.total(),
            %balance,
            "Debited call to {}",
            cd.destination
        );

        if let Err(e) = self
            .storage
            .log_call_cost(Uuid::new_v4(), RATER_SOURCE, &cost)
            .await
        {
            warn!(account = %account_id, "Failed to log call cost: {}", e);
        }
        Ok(cost)
    }

    /// Debits as much of the call as the account can afford
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn max_debit(&self, cd: &CallDescriptor) -> AppResult<CallCost> {
        let account_id = cd.account_key();
        let _ticket = self.guard.lock(&keys::account_key(&account_id)).await;

        let allowance = self.get_max_session_time(cd).await?;
        if allowance.is_zero() {
            info!(account = %account_id, "No credit for call to {}", cd.destination);
            return Err(AppError::NoCredit(account_id));
        }

        let mut clamped = cd.clone();
        let seconds = allowance.capped(cd.window_secs());
        if seconds < cd.window_secs() {
            clamped.time_end = cd.time_start + secs_duration(seconds);
            debug!(%seconds, "Clamped call window");
        }
        self.debit_locked(&clamped).await
    }

    /// Debits SMS, data or money units, returning the new balance
    #[instrument(skip(self, cd), fields(account = %cd.account_key()))]
    pub async fn debit_units(
        &self,
        cd: &CallDescriptor,
        kind: BalanceKind,
        amount: Decimal,
    ) -> AppResult<Decimal> {
        let account_id = cd.account_key();
        let _ticket = self.guard.lock(&keys::account_key(&account_id)).await;

        let mut account = self.load_active_account(&account_id).await?;
        let ctx = self.load_context(&account, &[]).await?;
        let balance = account.debit_balance(kind, cd.direction, amount, true, &ctx);
        self.persist(&mut account).await?;

        info!(account = %account_id, %amount, %balance, "Debited {} units", kind);
        Ok(balance)
    }

    /// Drains the requested seconds from the account's bonus buckets
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn debit_seconds(&self, cd: &CallDescriptor) -> AppResult<()> {
        let account_id = cd.account_key();
        let _ticket = self.guard.lock(&keys::account_key(&account_id)).await;

        let mut account = self.load_active_account(&account_id).await?;
        let ctx = self.load_context(&account, &[]).await?;
        let seconds = cd.requested_secs();
        account.debit_minutes(seconds, &cd.destination, cd.direction, true, &ctx)?;
        self.persist(&mut account).await?;

        info!(account = %account_id, %seconds, "Debited bonus seconds");
        Ok(())
    }

    /// Counts an inbound call's seconds towards the account's triggers
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub async fn add_received_call_seconds(&self, cd: &CallDescriptor) -> AppResult<()> {
        let account_id = cd.account_key();
        let _ticket = self.guard.lock(&keys::account_key(&account_id)).await;

        let mut account = self.load_active_account(&account_id).await?;
        let ctx = self.load_context(&account, &[]).await?;
        account.count_units(
            BalanceKind::Minutes,
            Direction::In,
            cd.requested_secs(),
            &cd.destination,
            &ctx,
        );
        self.persist(&mut account).await
    }

    /// Runs a stored bundle against one account
    #[instrument(skip(self))]
    pub async fn execute_actions(&self, account_id: &str, actions_id: &str) -> AppResult<()> {
        let actions = self
            .storage
            .get_actions(actions_id)
            .await?
            .ok_or_else(|| AppError::ActionsNotFound(actions_id.to_string()))?;
        self.apply_actions(account_id, &actions).await
    }

    /// Runs `actions` in order under the account's guard. Nothing is stored
    /// when one of them fails.
    pub async fn apply_actions(&self, account_id: &str, actions: &[Action]) -> AppResult<()> {
        let _ticket = self.guard.lock(&keys::account_key(account_id)).await;

        let mut account = self.load_account(account_id).await?;
        account.clean_expired_buckets(Utc::now());
        let ctx = self.load_context(&account, actions).await?;

        account.run_actions(actions, &ctx).map_err(|e| {
            warn!(account = %account_id, "Actions aborted: {}", e);
            e
        })?;
        self.persist(&mut account).await?;

        info!(account = %account_id, actions = actions.len(), "Executed actions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};
    use rater_core::models::{
        AccountType, ActionKind, ActionTrigger, CalendarTiming, Destination, Interval, Price,
        RatingProfile,
    };
    use rater_store::MapStorage;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 5, 10, 10, 0, 0).unwrap()
    }

    async fn engine() -> Engine<MapStorage> {
        let storage = Arc::new(MapStorage::new());
        storage
            .set_destination(&Destination::new("NAT", &["0256", "0257"]))
            .await
            .unwrap();

        let mut period = ActivationPeriod::new(Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap());
        period.add_interval(
            Interval::new(CalendarTiming::default(), 0.0, Price::new(dec!(0.6), 60, 1))
                .with_connect_fee(dec!(0.1)),
        );
        let mut profile = RatingProfile::new("*out:vdf:call:rif");
        profile.add_activation_period("NAT", period);
        storage.set_rating_profile(&profile).await.unwrap();

        Engine::new(storage, Arc::new(KeyedGuard::new()), RatingConfig::default())
    }

    fn cd(seconds: i64) -> CallDescriptor {
        CallDescriptor::new("vdf", "rif", "0256123", start(), start() + Duration::seconds(seconds))
    }

    async fn add_account(engine: &Engine<MapStorage>, money: Decimal) -> Account {
        let mut account = Account::new("vdf:rif", AccountType::Prepaid);
        account.set_balance(BalanceKind::Monetary, Direction::Out, money);
        engine.storage().set_account(&account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_connect_fee_only_on_first_loop() {
        let engine = engine().await;
        let first = engine.get_cost(&cd(60)).await.unwrap();
        assert_eq!(first.cost, dec!(0.6));
        assert_eq!(first.connect_fee, dec!(0.1));

        let mut later = cd(60);
        later.loop_index = 1;
        let second = engine.get_cost(&later).await.unwrap();
        assert_eq!(second.connect_fee, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_destination_is_not_found() {
        let engine = engine().await;
        let mut call = cd(60);
        call.destination = "0040".to_string();
        let err = engine.get_cost(&call).await.unwrap_err();
        assert!(matches!(err, AppError::RatingProfileNotFound(_)));
    }

    #[tokio::test]
    async fn test_max_session_time_steps_down() {
        let engine = engine().await;
        // 0.1 connect fee + 0.01/s
        add_account(&engine, dec!(0.5)).await;

        let allowance = engine.get_max_session_time(&cd(100)).await.unwrap();
        assert_eq!(allowance, MaxSessionTime::Seconds(dec!(40)));
    }

    #[tokio::test]
    async fn test_debit_refuses_disabled_account() {
        let engine = engine().await;
        let mut account = add_account(&engine, dec!(10)).await;
        account.disabled = true;
        engine.storage().set_account(&account).await.unwrap();

        let err = engine.debit(&cd(60)).await.unwrap_err();
        assert!(matches!(err, AppError::AccountDisabled(_)));
        let stored = engine.storage().get_account("vdf:rif").await.unwrap().unwrap();
        assert_eq!(stored.balance(BalanceKind::Monetary, Direction::Out), dec!(10));
    }

    #[tokio::test]
    async fn test_unsupported_action_leaves_account_untouched() {
        let engine = engine().await;
        add_account(&engine, dec!(10)).await;
        let actions = vec![
            Action::new("t", ActionKind::Topup, BalanceKind::Monetary, dec!(5)),
            Action::new("x", ActionKind::Unsupported("*call_url".to_string()), BalanceKind::Monetary, dec!(0)),
        ];

        let err = engine.apply_actions("vdf:rif", &actions).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedAction(_)));
        let stored = engine.storage().get_account("vdf:rif").await.unwrap().unwrap();
        assert_eq!(stored.balance(BalanceKind::Monetary, Direction::Out), dec!(10));
    }

    #[tokio::test]
    async fn test_trigger_firing_is_logged() {
        let engine = engine().await;
        let mut account = add_account(&engine, dec!(10)).await;
        account.action_triggers.push(ActionTrigger::new("low", BalanceKind::Monetary, dec!(1), "LOG"));
        engine.storage().set_account(&account).await.unwrap();
        engine
            .storage()
            .set_actions("LOG", &[Action::new("l", ActionKind::Log, BalanceKind::Monetary, dec!(0))])
            .await
            .unwrap();

        engine.debit(&cd(120)).await.unwrap();
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if !engine.storage().action_trigger_logs().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let logs = engine.storage().action_trigger_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trigger.id, "low");
        let stored = engine.storage().get_account("vdf:rif").await.unwrap().unwrap();
        assert!(stored.action_triggers[0].executed);
    }
}
