//! Balance kinds, traffic direction and account type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[serde(rename = "*in")]
    In,
    #[default]
    #[serde(rename = "*out")]
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "*in"),
            Direction::Out => write!(f, "*out"),
        }
    }
}

impl Direction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "*in" => Some(Direction::In),
            "*out" => Some(Direction::Out),
            _ => None,
        }
    }
}

/// Kind of balance an amount is kept in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BalanceKind {
    #[default]
    #[serde(rename = "*monetary")]
    Monetary,
    #[serde(rename = "*sms")]
    Sms,
    #[serde(rename = "*internet")]
    Internet,
    #[serde(rename = "*internet_time")]
    InternetTime,
    /// Bonus seconds, kept in minute buckets rather than the balance map
    #[serde(rename = "*minutes")]
    Minutes,
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BalanceKind::Monetary => "*monetary",
            BalanceKind::Sms => "*sms",
            BalanceKind::Internet => "*internet",
            BalanceKind::InternetTime => "*internet_time",
            BalanceKind::Minutes => "*minutes",
        };
        f.write_str(s)
    }
}

impl BalanceKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "*monetary" => Some(BalanceKind::Monetary),
            "*sms" => Some(BalanceKind::Sms),
            "*internet" => Some(BalanceKind::Internet),
            "*internet_time" => Some(BalanceKind::InternetTime),
            "*minutes" => Some(BalanceKind::Minutes),
            _ => None,
        }
    }
}

/// Balance map key, e.g. `*monetary*out`
pub fn balance_key(kind: BalanceKind, direction: Direction) -> String {
    format!("{}{}", kind, direction)
}

/// Account type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Calls are limited by the available balance
    #[default]
    Prepaid,
    /// Calls are not limited; the balance may run negative
    Postpaid,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Prepaid => write!(f, "PREPAID"),
            AccountType::Postpaid => write!(f, "POSTPAID"),
        }
    }
}

impl AccountType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prepaid" => Some(AccountType::Prepaid),
            "postpaid" => Some(AccountType::Postpaid),
            _ => None,
        }
    }
}
