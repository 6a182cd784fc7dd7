//! Rating results

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance::Direction;
use super::call_descriptor::CallDescriptor;
use super::timespan::TimeSpan;

/// Priced call window, written to the call-cost log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCost {
    pub direction: Direction,
    pub tenant: String,
    pub category: String,
    pub subject: String,
    pub account: String,

    /// Matched destination prefix
    pub destination: String,

    pub cost: Decimal,

    #[serde(default)]
    pub connect_fee: Decimal,

    pub timespans: Vec<TimeSpan>,
}

impl CallCost {
    pub fn new(cd: &CallDescriptor, destination: &str, timespans: Vec<TimeSpan>) -> Self {
        let cost = timespans.iter().map(|ts| ts.cost).sum();
        Self {
            direction: cd.direction,
            tenant: cd.tenant.clone(),
            category: cd.category.clone(),
            subject: cd.subject.clone(),
            account: cd.account_subject().to_string(),
            destination: destination.to_string(),
            cost,
            connect_fee: Decimal::ZERO,
            timespans,
        }
    }

    pub fn total(&self) -> Decimal {
        self.cost + self.connect_fee
    }

    /// Cost of the spans paid from money rather than bonus buckets
    pub fn money_cost(&self) -> Decimal {
        self.timespans
            .iter()
            .filter(|ts| !ts.is_bonus())
            .map(|ts| ts.cost)
            .sum::<Decimal>()
            + self.connect_fee
    }

    pub fn bonus_spans(&self) -> impl Iterator<Item = &TimeSpan> {
        self.timespans.iter().filter(|ts| ts.is_bonus())
    }
}

/// Allowance returned by the max session time search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxSessionTime {
    /// Postpaid accounts are never cut
    Unlimited,
    Seconds(Decimal),
}

impl MaxSessionTime {
    pub fn is_zero(&self) -> bool {
        matches!(self, MaxSessionTime::Seconds(s) if s.is_zero())
    }

    /// Seconds granted, `requested` when unlimited
    pub fn capped(&self, requested: Decimal) -> Decimal {
        match self {
            MaxSessionTime::Unlimited => requested,
            MaxSessionTime::Seconds(s) => (*s).min(requested),
        }
    }
}
