//! Tariff interval model
//!
//! An interval is a calendar pattern with the prices that apply while it
//! matches. Intervals are grouped under an activation period.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::timing::CalendarTiming;
use crate::error::AppError;
use crate::AppResult;

/// Rounding applied to a computed span cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMethod {
    /// Always away from zero
    Up,
    /// Half away from zero
    #[default]
    Middle,
    /// Truncate
    Down,
}

impl fmt::Display for RoundingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMethod::Up => write!(f, "*up"),
            RoundingMethod::Middle => write!(f, "*middle"),
            RoundingMethod::Down => write!(f, "*down"),
        }
    }
}

impl RoundingMethod {
    /// Parse from string, with or without the leading `*`
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_start_matches('*').to_lowercase().as_str() {
            "up" => Some(RoundingMethod::Up),
            "middle" => Some(RoundingMethod::Middle),
            "down" => Some(RoundingMethod::Down),
            _ => None,
        }
    }

    pub fn round(&self, value: Decimal, decimals: u32) -> Decimal {
        let strategy = match self {
            RoundingMethod::Up => RoundingStrategy::AwayFromZero,
            RoundingMethod::Middle => RoundingStrategy::MidpointAwayFromZero,
            RoundingMethod::Down => RoundingStrategy::ToZero,
        };
        value.round_dp_with_strategy(decimals, strategy)
    }
}

/// One step of an interval's price list
///
/// The step applies once the call has lasted `group_start_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub group_start_secs: i64,

    /// Price charged per `priced_units_secs`
    pub value: Decimal,

    pub priced_units_secs: i64,

    /// Billing increment; durations are rounded up to a multiple of it
    pub rate_increment_secs: i64,
}

impl Price {
    pub fn new(value: Decimal, priced_units_secs: i64, rate_increment_secs: i64) -> Self {
        Self {
            group_start_secs: 0,
            value,
            priced_units_secs,
            rate_increment_secs,
        }
    }

    /// Price of one second
    pub fn unit_price(&self) -> Decimal {
        if self.priced_units_secs <= 0 {
            return self.value;
        }
        self.value / Decimal::from(self.priced_units_secs)
    }
}

fn default_rounding_decimals() -> u32 {
    4
}

/// Tariff interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    #[serde(flatten)]
    pub timing: CalendarTiming,

    #[serde(default)]
    pub weight: f64,

    #[serde(default)]
    pub connect_fee: Decimal,

    /// Sorted by `group_start_secs`
    pub prices: Vec<Price>,

    #[serde(default)]
    pub rounding_method: RoundingMethod,

    #[serde(default = "default_rounding_decimals")]
    pub rounding_decimals: u32,
}

impl Interval {
    /// Interval with a single price step
    pub fn new(timing: CalendarTiming, weight: f64, price: Price) -> Self {
        Self {
            timing,
            weight,
            connect_fee: Decimal::ZERO,
            prices: vec![price],
            rounding_method: RoundingMethod::default(),
            rounding_decimals: default_rounding_decimals(),
        }
    }

    pub fn with_connect_fee(mut self, fee: Decimal) -> Self {
        self.connect_fee = fee;
        self
    }

    /// Structural equality over the calendar fields; prices are ignored
    pub fn equal(&self, other: &Interval) -> bool {
        self.timing == other.timing
    }

    pub fn contains(&self, t: DateTime<Utc>, is_end: bool) -> bool {
        self.timing.contains(t, is_end)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.timing.validate(false)?;
        if self.prices.is_empty() {
            return Err(AppError::malformed("prices", "empty price list"));
        }
        if let Some(p) = self
            .prices
            .iter()
            .find(|p| p.rate_increment_secs <= 0 || p.priced_units_secs <= 0)
        {
            return Err(AppError::malformed(
                "prices",
                format!("units {} / increment {}", p.priced_units_secs, p.rate_increment_secs),
            ));
        }
        Ok(())
    }

    /// Appends prices from an equal interval, skipping steps already present
    pub fn merge_prices(&mut self, prices: &[Price]) {
        for price in prices {
            if !self.prices.contains(price) {
                self.prices.push(price.clone());
            }
        }
        self.prices.sort_by_key(|p| p.group_start_secs);
    }

    /// Price step in effect after `call_duration_secs` of call
    pub fn price_at(&self, call_duration_secs: Decimal) -> Option<&Price> {
        self.prices
            .iter()
            .rev()
            .find(|p| Decimal::from(p.group_start_secs) <= call_duration_secs)
            .or_else(|| self.prices.first())
    }

    /// Per-second price of the first step, used to break weight ties
    pub fn base_unit_price(&self) -> Decimal {
        self.prices.first().map(Price::unit_price).unwrap_or(Decimal::ZERO)
    }

    /// Cost of `duration_secs` of call starting `call_duration_secs` into it
    pub fn cost(&self, duration_secs: Decimal, call_duration_secs: Decimal) -> Decimal {
        let Some(price) = self.price_at(call_duration_secs) else {
            return Decimal::ZERO;
        };
        let increment = Decimal::from(price.rate_increment_secs.max(1));
        let billed = (duration_secs / increment).ceil() * increment;
        self.rounding_method
            .round(billed * price.unit_price(), self.rounding_decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn flat(value: Decimal, units: i64, increment: i64) -> Interval {
        Interval::new(CalendarTiming::default(), 0.0, Price::new(value, units, increment))
    }

    #[test]
    fn test_flat_rate_cost() {
        let interval = flat(dec!(0.2), 60, 1);
        assert_eq!(interval.cost(dec!(61), Decimal::ZERO), dec!(0.2033));
    }

    #[test]
    fn test_rate_increment_rounds_up() {
        let interval = flat(dec!(1), 60, 60);
        assert_eq!(interval.cost(dec!(61), Decimal::ZERO), dec!(2));
        assert_eq!(interval.cost(dec!(60), Decimal::ZERO), dec!(1));
    }

    #[test]
    fn test_rounding_methods() {
        assert_eq!(RoundingMethod::Middle.round(dec!(0.12345), 4), dec!(0.1235));
        assert_eq!(RoundingMethod::Up.round(dec!(0.12341), 4), dec!(0.1235));
        assert_eq!(RoundingMethod::Down.round(dec!(0.12349), 4), dec!(0.1234));
        assert_eq!(RoundingMethod::from_str("*middle"), Some(RoundingMethod::Middle));
        assert_eq!(RoundingMethod::from_str("sideways"), None);
    }

    #[test]
    fn test_price_groups() {
        let mut interval = flat(dec!(0.6), 60, 1);
        interval.merge_prices(&[Price {
            group_start_secs: 60,
            value: dec!(0.3),
            priced_units_secs: 60,
            rate_increment_secs: 1,
        }]);

        assert_eq!(interval.price_at(dec!(0)).unwrap().value, dec!(0.6));
        assert_eq!(interval.price_at(dec!(59)).unwrap().value, dec!(0.6));
        assert_eq!(interval.price_at(dec!(60)).unwrap().value, dec!(0.3));
        assert_eq!(interval.cost(dec!(60), dec!(60)), dec!(0.3));
    }

    #[test]
    fn test_merge_prices_skips_duplicates() {
        let mut interval = flat(dec!(1), 60, 1);
        let again = interval.prices.clone();
        interval.merge_prices(&again);
        assert_eq!(interval.prices.len(), 1);
    }

    #[test]
    fn test_equal_ignores_prices() {
        let a = flat(dec!(1), 60, 1);
        let b = flat(dec!(2), 60, 1);
        assert!(a.equal(&b));

        let c = Interval::new(
            CalendarTiming::daily("08:00:00", ""),
            0.0,
            Price::new(dec!(1), 60, 1),
        );
        assert!(!a.equal(&c));
    }

    #[test]
    fn test_validate_prices() {
        assert!(flat(dec!(1), 60, 1).validate().is_ok());
        assert!(flat(dec!(1), 60, 0).validate().is_err());

        let mut empty = flat(dec!(1), 60, 1);
        empty.prices.clear();
        assert!(empty.validate().is_err());
    }
}
