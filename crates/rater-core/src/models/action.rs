//! Actions, action triggers and unit counters
//!
//! Actions are named balance mutations grouped in bundles. Triggers run a
//! bundle once a unit counter crosses a threshold.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::balance::{BalanceKind, Direction};
use super::bucket::MinuteBucket;

/// Closed set of action types
///
/// Unknown type strings are kept as `Unsupported` so the handler table can
/// reject them when the bundle runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Log,
    Topup,
    TopupReset,
    Debit,
    SetPrepaid,
    SetPostpaid,
    ResetPrepaid,
    ResetPostpaid,
    ResetCounter,
    ResetCounters,
    ResetTriggers,
    EnableAccount,
    DisableAccount,
    Unsupported(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Log => "*log",
            ActionKind::Topup => "*topup",
            ActionKind::TopupReset => "*topup_reset",
            ActionKind::Debit => "*debit",
            ActionKind::SetPrepaid => "*set_prepaid",
            ActionKind::SetPostpaid => "*set_postpaid",
            ActionKind::ResetPrepaid => "*reset_prepaid",
            ActionKind::ResetPostpaid => "*reset_postpaid",
            ActionKind::ResetCounter => "*reset_counter",
            ActionKind::ResetCounters => "*reset_counters",
            ActionKind::ResetTriggers => "*reset_triggers",
            ActionKind::EnableAccount => "*enable_account",
            ActionKind::DisableAccount => "*disable_account",
            ActionKind::Unsupported(name) => name,
        }
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "*log" => ActionKind::Log,
            "*topup" => ActionKind::Topup,
            "*topup_reset" => ActionKind::TopupReset,
            "*debit" => ActionKind::Debit,
            "*set_prepaid" => ActionKind::SetPrepaid,
            "*set_postpaid" => ActionKind::SetPostpaid,
            "*reset_prepaid" => ActionKind::ResetPrepaid,
            "*reset_postpaid" => ActionKind::ResetPostpaid,
            "*reset_counter" => ActionKind::ResetCounter,
            "*reset_counters" => ActionKind::ResetCounters,
            "*reset_triggers" => ActionKind::ResetTriggers,
            "*enable_account" => ActionKind::EnableAccount,
            "*disable_account" => ActionKind::DisableAccount,
            _ => ActionKind::Unsupported(s),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single balance mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,

    pub action_type: ActionKind,

    #[serde(default)]
    pub balance_kind: BalanceKind,

    #[serde(default)]
    pub direction: Direction,

    #[serde(default)]
    pub units: Decimal,

    /// Lower weights run first within a bundle
    #[serde(default)]
    pub weight: f64,

    /// Bucket carried by minute top-ups and debits
    #[serde(default)]
    pub minute_bucket: Option<MinuteBucket>,
}

impl Action {
    pub fn new(id: &str, action_type: ActionKind, balance_kind: BalanceKind, units: Decimal) -> Self {
        Self {
            id: id.to_string(),
            action_type,
            balance_kind,
            direction: Direction::Out,
            units,
            weight: 0.0,
            minute_bucket: None,
        }
    }

    /// Minute-kind action carrying a bucket
    pub fn minutes(id: &str, action_type: ActionKind, bucket: MinuteBucket) -> Self {
        Self {
            minute_bucket: Some(bucket),
            ..Self::new(id, action_type, BalanceKind::Minutes, Decimal::ZERO)
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Stable sort, lowest weight first
pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(|a, b| a.weight.total_cmp(&b.weight));
}

/// Threshold rule over a unit counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTrigger {
    pub id: String,

    #[serde(default)]
    pub group_id: String,

    pub balance_kind: BalanceKind,

    #[serde(default)]
    pub direction: Direction,

    pub threshold_value: Decimal,

    /// Recurrent triggers are never marked executed
    #[serde(default)]
    pub recurrent: bool,

    #[serde(default)]
    pub executed: bool,

    /// Destination filter for minute counters
    #[serde(default)]
    pub destination_id: String,

    pub actions_id: String,

    #[serde(default)]
    pub weight: f64,
}

impl ActionTrigger {
    pub fn new(id: &str, balance_kind: BalanceKind, threshold_value: Decimal, actions_id: &str) -> Self {
        Self {
            id: id.to_string(),
            group_id: String::new(),
            balance_kind,
            direction: Direction::Out,
            threshold_value,
            recurrent: false,
            executed: false,
            destination_id: String::new(),
            actions_id: actions_id.to_string(),
            weight: 0.0,
        }
    }
}

/// Stable sort, highest weight first
pub fn sort_triggers(triggers: &mut [ActionTrigger]) {
    triggers.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}

/// Usage accumulated towards triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCounter {
    pub balance_kind: BalanceKind,

    #[serde(default)]
    pub direction: Direction,

    #[serde(default)]
    pub units: Decimal,

    /// Per destination usage for minute counters
    #[serde(default)]
    pub minute_buckets: Vec<MinuteBucket>,
}

impl UnitCounter {
    pub fn new(balance_kind: BalanceKind, direction: Direction) -> Self {
        Self {
            balance_kind,
            direction,
            units: Decimal::ZERO,
            minute_buckets: Vec::new(),
        }
    }

    pub fn matches(&self, balance_kind: BalanceKind, direction: Direction) -> bool {
        self.balance_kind == balance_kind && self.direction == direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_action_kind_round_trip() {
        let json = serde_json::to_string(&ActionKind::TopupReset).unwrap();
        assert_eq!(json, "\"*topup_reset\"");
        let kind: ActionKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, ActionKind::TopupReset);
    }

    #[test]
    fn test_unknown_action_kind_is_kept() {
        let kind: ActionKind = serde_json::from_str("\"*call_url\"").unwrap();
        assert_eq!(kind, ActionKind::Unsupported("*call_url".to_string()));
        assert_eq!(kind.to_string(), "*call_url");
    }

    #[test]
    fn test_actions_sorted_lowest_weight_first() {
        let mut actions = vec![
            Action::new("a", ActionKind::Topup, BalanceKind::Monetary, dec!(1)).with_weight(20.0),
            Action::new("b", ActionKind::Log, BalanceKind::Monetary, dec!(0)).with_weight(10.0),
            Action::new("c", ActionKind::Debit, BalanceKind::Monetary, dec!(1)).with_weight(20.0),
        ];
        sort_actions(&mut actions);
        let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_triggers_sorted_highest_weight_first() {
        let mut triggers = vec![
            ActionTrigger { weight: 10.0, ..ActionTrigger::new("t1", BalanceKind::Monetary, dec!(1), "A") },
            ActionTrigger { weight: 30.0, ..ActionTrigger::new("t2", BalanceKind::Monetary, dec!(1), "A") },
            ActionTrigger { weight: 10.0, ..ActionTrigger::new("t3", BalanceKind::Monetary, dec!(1), "A") },
        ];
        sort_triggers(&mut triggers);
        let ids: Vec<&str> = triggers.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1", "t3"]);
    }

    #[test]
    fn test_action_deserializes_with_defaults() {
        let action: Action =
            serde_json::from_str(r#"{"id":"TOPUP10","action_type":"*topup","units":"10"}"#).unwrap();
        assert_eq!(action.balance_kind, BalanceKind::Monetary);
        assert_eq!(action.direction, Direction::Out);
        assert_eq!(action.units, dec!(10));
        assert!(action.minute_bucket.is_none());
    }
}
