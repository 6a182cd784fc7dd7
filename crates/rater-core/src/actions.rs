//! Action handlers
//!
//! Every action kind maps to one plain function over the account. The table
//! is an exhaustive match so a new kind cannot be added without a handler.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::models::{Account, AccountContext, AccountType, Action, ActionKind, BalanceKind};
use crate::AppResult;

/// Signature shared by all action handlers
pub type ActionHandler = fn(&mut Account, &Action, &AccountContext) -> AppResult<()>;

/// Looks up the handler for an action kind; `None` for unsupported kinds
pub fn handler(kind: &ActionKind) -> Option<ActionHandler> {
    let f: ActionHandler = match kind {
        ActionKind::Log => log_action,
        ActionKind::Topup => topup,
        ActionKind::TopupReset => topup_reset,
        ActionKind::Debit => debit,
        ActionKind::SetPrepaid => set_prepaid,
        ActionKind::SetPostpaid => set_postpaid,
        ActionKind::ResetPrepaid => reset_prepaid,
        ActionKind::ResetPostpaid => reset_postpaid,
        ActionKind::ResetCounter => reset_counter,
        ActionKind::ResetCounters => reset_counters,
        ActionKind::ResetTriggers => reset_triggers,
        ActionKind::EnableAccount => enable_account,
        ActionKind::DisableAccount => disable_account,
        ActionKind::Unsupported(_) => return None,
    };
    Some(f)
}

fn log_action(account: &mut Account, action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    info!(
        account = %account.id,
        action = %action.id,
        kind = %action.balance_kind,
        units = %action.units,
        "Log action"
    );
    Ok(())
}

fn topup(account: &mut Account, action: &Action, ctx: &AccountContext) -> AppResult<()> {
    if action.balance_kind == BalanceKind::Minutes {
        if let Some(bucket) = &action.minute_bucket {
            account.add_minute_bucket(bucket);
        }
        return Ok(());
    }
    account.debit_balance(action.balance_kind, action.direction, -action.units, false, ctx);
    Ok(())
}

fn topup_reset(account: &mut Account, action: &Action, ctx: &AccountContext) -> AppResult<()> {
    if action.balance_kind == BalanceKind::Minutes {
        account.minute_buckets.clear();
    } else {
        account.set_balance(action.balance_kind, action.direction, Decimal::ZERO);
    }
    topup(account, action, ctx)
}

fn debit(account: &mut Account, action: &Action, ctx: &AccountContext) -> AppResult<()> {
    if action.balance_kind == BalanceKind::Minutes {
        if let Some(bucket) = &action.minute_bucket {
            if !account.debit_minute_bucket(bucket) {
                warn!(account = %account.id, action = %action.id, "No bucket matches minute debit");
            }
        }
        return Ok(());
    }
    account.debit_balance(action.balance_kind, action.direction, action.units, false, ctx);
    Ok(())
}

fn set_prepaid(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.account_type = AccountType::Prepaid;
    Ok(())
}

fn set_postpaid(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.account_type = AccountType::Postpaid;
    Ok(())
}

fn reset_prepaid(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.reset(AccountType::Prepaid);
    Ok(())
}

fn reset_postpaid(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.reset(AccountType::Postpaid);
    Ok(())
}

fn reset_counter(account: &mut Account, action: &Action, ctx: &AccountContext) -> AppResult<()> {
    account.reset_counter(action.balance_kind, action.direction, ctx);
    Ok(())
}

fn reset_counters(account: &mut Account, _action: &Action, ctx: &AccountContext) -> AppResult<()> {
    account.reset_all_counters(ctx);
    Ok(())
}

fn reset_triggers(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.reset_action_triggers();
    Ok(())
}

fn enable_account(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.disabled = false;
    Ok(())
}

fn disable_account(account: &mut Account, _action: &Action, _ctx: &AccountContext) -> AppResult<()> {
    account.disabled = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionTrigger, Destination, Direction, MinuteBucket, UnitCounter};
    use crate::AppError;
    use rust_decimal_macros::dec;

    fn nat_bucket(seconds: Decimal) -> MinuteBucket {
        MinuteBucket::new(seconds, 20.0, dec!(1), "NAT")
    }

    fn ctx() -> AccountContext {
        AccountContext::new()
            .with_destination(Destination::new("NAT", &["0256", "0257", "0723"]))
            .with_actions(
                "TEST_ACTIONS",
                vec![Action::minutes("MIN", ActionKind::Topup, nat_bucket(dec!(10)))],
            )
    }

    fn account() -> Account {
        let mut acc = Account::new("vdf:minu", AccountType::Prepaid);
        acc.set_balance(BalanceKind::Monetary, Direction::Out, dec!(100));
        acc.minute_buckets = vec![
            nat_bucket(dec!(10)),
            MinuteBucket::new(dec!(10), 20.0, dec!(1), "RET"),
        ];
        acc.unit_counters = vec![UnitCounter {
            units: dec!(1),
            ..UnitCounter::new(BalanceKind::Monetary, Direction::Out)
        }];
        acc.action_triggers = vec![
            ActionTrigger {
                executed: true,
                ..ActionTrigger::new("t1", BalanceKind::Monetary, dec!(2), "TEST_ACTIONS")
            },
            ActionTrigger {
                executed: true,
                ..ActionTrigger::new("t2", BalanceKind::Monetary, dec!(2), "TEST_ACTIONS")
            },
        ];
        acc
    }

    fn run(acc: &mut Account, action: Action) -> AppResult<()> {
        acc.run_actions(&[action], &ctx())
    }

    fn credit(acc: &Account) -> Decimal {
        acc.balance(BalanceKind::Monetary, Direction::Out)
    }

    #[test]
    fn test_handler_table_rejects_unsupported() {
        assert!(handler(&ActionKind::Topup).is_some());
        assert!(handler(&ActionKind::Unsupported("*call_url".to_string())).is_none());

        let mut acc = account();
        let err = run(
            &mut acc,
            Action::new("x", ActionKind::Unsupported("*call_url".to_string()), BalanceKind::Monetary, dec!(0)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedAction(_)));
    }

    #[test]
    fn test_unsupported_rolls_back_whole_batch() {
        let mut acc = account();
        let actions = vec![
            Action::new("a", ActionKind::Topup, BalanceKind::Monetary, dec!(5)),
            Action::new("b", ActionKind::Unsupported("*mail".to_string()), BalanceKind::Monetary, dec!(0)),
            Action::new("c", ActionKind::Topup, BalanceKind::Monetary, dec!(5)),
        ];
        assert!(acc.run_actions(&actions, &ctx()).is_err());
        assert_eq!(credit(&acc), dec!(100));
    }

    #[test]
    fn test_reset_triggers() {
        let mut acc = account();
        run(&mut acc, Action::new("r", ActionKind::ResetTriggers, BalanceKind::Monetary, dec!(0))).unwrap();
        assert!(acc.action_triggers.iter().all(|t| !t.executed));
        assert_eq!(credit(&acc), dec!(100));
    }

    #[test]
    fn test_set_postpaid_and_back() {
        let mut acc = account();
        run(&mut acc, Action::new("p", ActionKind::SetPostpaid, BalanceKind::Monetary, dec!(0))).unwrap();
        assert_eq!(acc.account_type, AccountType::Postpaid);
        assert_eq!(credit(&acc), dec!(100));

        run(&mut acc, Action::new("p", ActionKind::SetPrepaid, BalanceKind::Monetary, dec!(0))).unwrap();
        assert_eq!(acc.account_type, AccountType::Prepaid);
        assert_eq!(acc.minute_buckets.len(), 2);
    }

    #[test]
    fn test_reset_postpaid_wipes_state() {
        let mut acc = account();
        run(&mut acc, Action::new("r", ActionKind::ResetPostpaid, BalanceKind::Monetary, dec!(0))).unwrap();
        assert_eq!(acc.account_type, AccountType::Postpaid);
        assert_eq!(credit(&acc), dec!(0));
        assert!(acc.unit_counters.is_empty());
        assert!(acc.minute_buckets.is_empty());
        assert!(acc.action_triggers.iter().all(|t| !t.executed));
    }

    #[test]
    fn test_reset_prepaid_wipes_state() {
        let mut acc = account();
        acc.account_type = AccountType::Postpaid;
        run(&mut acc, Action::new("r", ActionKind::ResetPrepaid, BalanceKind::Monetary, dec!(0))).unwrap();
        assert_eq!(acc.account_type, AccountType::Prepaid);
        assert!(acc.balance_map.is_empty());
    }

    #[test]
    fn test_topup_reset_credit() {
        let mut acc = account();
        run(&mut acc, Action::new("t", ActionKind::TopupReset, BalanceKind::Monetary, dec!(10))).unwrap();
        assert_eq!(credit(&acc), dec!(10));
        assert_eq!(acc.minute_buckets.len(), 2);
        assert_eq!(acc.unit_counters[0].units, dec!(1));
    }

    #[test]
    fn test_topup_reset_minutes() {
        let mut acc = account();
        run(&mut acc, Action::minutes("t", ActionKind::TopupReset, nat_bucket(dec!(5)))).unwrap();
        assert_eq!(acc.minute_buckets.len(), 1);
        assert_eq!(acc.minute_buckets[0].seconds, dec!(5));
        assert_eq!(credit(&acc), dec!(100));
    }

    #[test]
    fn test_topup_credit() {
        let mut acc = account();
        run(&mut acc, Action::new("t", ActionKind::Topup, BalanceKind::Monetary, dec!(10))).unwrap();
        assert_eq!(credit(&acc), dec!(110));
    }

    #[test]
    fn test_topup_minutes_merges_equal_bucket() {
        let mut acc = account();
        run(&mut acc, Action::minutes("t", ActionKind::Topup, nat_bucket(dec!(5)))).unwrap();
        assert_eq!(acc.minute_buckets.len(), 2);
        assert_eq!(acc.minute_buckets[0].seconds, dec!(15));
    }

    #[test]
    fn test_debit_credit() {
        let mut acc = account();
        run(&mut acc, Action::new("d", ActionKind::Debit, BalanceKind::Monetary, dec!(10))).unwrap();
        assert_eq!(credit(&acc), dec!(90));
    }

    #[test]
    fn test_debit_minutes_from_equal_bucket() {
        let mut acc = account();
        run(&mut acc, Action::minutes("d", ActionKind::Debit, nat_bucket(dec!(5)))).unwrap();
        assert_eq!(acc.minute_buckets[0].seconds, dec!(5));
        assert_eq!(credit(&acc), dec!(100));
    }

    #[test]
    fn test_topup_sms() {
        let mut acc = account();
        let mut action = Action::new("s", ActionKind::Topup, BalanceKind::Sms, dec!(50));
        action.direction = Direction::In;
        run(&mut acc, action).unwrap();
        assert_eq!(acc.balance(BalanceKind::Sms, Direction::In), dec!(50));
        assert_eq!(credit(&acc), dec!(100));
    }

    #[test]
    fn test_reset_all_counters() {
        let mut acc = account();
        acc.unit_counters.push(UnitCounter {
            units: dec!(30),
            minute_buckets: vec![nat_bucket(dec!(30))],
            ..UnitCounter::new(BalanceKind::Minutes, Direction::Out)
        });

        run(&mut acc, Action::new("r", ActionKind::ResetCounters, BalanceKind::Monetary, dec!(0))).unwrap();
        assert_eq!(acc.unit_counters.len(), 2);
        assert_eq!(acc.unit_counters[0].units, dec!(0));
        assert!(acc.unit_counters[0].minute_buckets.is_empty());

        let minutes = &acc.unit_counters[1];
        assert_eq!(minutes.units, dec!(0));
        assert_eq!(minutes.minute_buckets.len(), 1);
        assert_eq!(minutes.minute_buckets[0].destination_id, "NAT");
        assert_eq!(minutes.minute_buckets[0].seconds, dec!(0));
    }

    #[test]
    fn test_reset_counter_creates_minute_counter() {
        let mut acc = account();
        run(&mut acc, Action::new("r", ActionKind::ResetCounter, BalanceKind::Minutes, dec!(0))).unwrap();
        assert_eq!(acc.unit_counters.len(), 2);
        assert_eq!(acc.unit_counters[0].units, dec!(1));
        assert_eq!(acc.unit_counters[1].balance_kind, BalanceKind::Minutes);
        assert_eq!(acc.unit_counters[1].minute_buckets.len(), 1);
    }

    #[test]
    fn test_disable_and_enable() {
        let mut acc = account();
        run(&mut acc, Action::new("d", ActionKind::DisableAccount, BalanceKind::Monetary, dec!(0))).unwrap();
        assert!(acc.disabled);
        run(&mut acc, Action::new("e", ActionKind::EnableAccount, BalanceKind::Monetary, dec!(0))).unwrap();
        assert!(!acc.disabled);
    }
}
