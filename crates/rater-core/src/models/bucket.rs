//! Bonus minute buckets
//!
//! A bucket holds free or discounted seconds usable for calls towards one
//! destination. The same ordering is used when an account drains its
//! buckets and when a unit counter accounts usage per destination.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteBucket {
    /// Remaining seconds
    pub seconds: Decimal,

    #[serde(default)]
    pub weight: f64,

    /// Money charged per second consumed, zero for free minutes
    #[serde(default)]
    pub price: Decimal,

    /// Discount percentage, carried for tariff bookkeeping
    #[serde(default)]
    pub percent: Decimal,

    #[serde(default)]
    pub destination_id: String,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Prefix match length against the current call destination
    #[serde(skip)]
    pub precision: usize,
}

impl MinuteBucket {
    pub fn new(seconds: Decimal, weight: f64, price: Decimal, destination_id: &str) -> Self {
        Self {
            seconds,
            weight,
            price,
            percent: Decimal::ZERO,
            destination_id: destination_id.to_string(),
            expires_at: None,
            precision: 0,
        }
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    /// Buckets are merged on top-up when everything but the seconds matches
    pub fn equal(&self, other: &MinuteBucket) -> bool {
        self.destination_id == other.destination_id
            && self.weight == other.weight
            && self.price == other.price
            && self.expires_at == other.expires_at
    }

    /// Seconds the bucket can deliver when each one costs `price` of `credit`
    pub fn seconds_for_credit(&self, credit: Decimal) -> Decimal {
        if self.price > Decimal::ZERO {
            (credit / self.price).max(Decimal::ZERO).min(self.seconds)
        } else {
            self.seconds
        }
    }

    /// Copy with no seconds, used to seed unit counters
    pub fn emptied(&self) -> Self {
        Self {
            seconds: Decimal::ZERO,
            ..self.clone()
        }
    }
}

/// Consumption order: higher precision, then higher weight, then cheaper
pub fn compare_buckets(a: &MinuteBucket, b: &MinuteBucket) -> Ordering {
    b.precision
        .cmp(&a.precision)
        .then_with(|| b.weight.total_cmp(&a.weight))
        .then_with(|| a.price.cmp(&b.price))
}

/// Stable sort in consumption order
pub fn sort_buckets(buckets: &mut [MinuteBucket]) {
    buckets.sort_by(compare_buckets);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sort_by_weight_then_price() {
        let mut buckets = vec![
            MinuteBucket::new(dec!(100), 10.0, dec!(10), "NAT"),
            MinuteBucket::new(dec!(10), 20.0, dec!(1), "NAT"),
            MinuteBucket::new(dec!(10), 20.0, dec!(0), "NAT"),
        ];
        sort_buckets(&mut buckets);

        assert_eq!(buckets[0].price, dec!(0));
        assert_eq!(buckets[1].price, dec!(1));
        assert_eq!(buckets[2].weight, 10.0);
    }

    #[test]
    fn test_precision_outranks_weight() {
        let mut general = MinuteBucket::new(dec!(10), 50.0, dec!(0), "NAT");
        general.precision = 2;
        let mut specific = MinuteBucket::new(dec!(10), 10.0, dec!(0), "RET");
        specific.precision = 4;

        let mut buckets = vec![general, specific];
        sort_buckets(&mut buckets);
        assert_eq!(buckets[0].destination_id, "RET");
    }

    #[test]
    fn test_seconds_for_credit() {
        let priced = MinuteBucket::new(dec!(100), 20.0, dec!(1), "RET");
        assert_eq!(priced.seconds_for_credit(dec!(21)), dec!(21));
        assert_eq!(priced.seconds_for_credit(dec!(500)), dec!(100));
        assert_eq!(priced.seconds_for_credit(dec!(-3)), dec!(0));

        let free = MinuteBucket::new(dec!(10), 10.0, dec!(0), "NAT");
        assert_eq!(free.seconds_for_credit(dec!(0)), dec!(10));
    }

    #[test]
    fn test_equal_and_expiry() {
        let at = Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap();
        let a = MinuteBucket::new(dec!(10), 20.0, dec!(1), "NAT");
        let b = MinuteBucket::new(dec!(5), 20.0, dec!(1), "NAT");
        assert!(a.equal(&b));
        assert!(!a.equal(&b.clone().expiring_at(at)));

        let expiring = a.expiring_at(at);
        assert!(expiring.is_expired_at(at));
        assert!(!expiring.is_expired_at(at - chrono::Duration::seconds(1)));
        assert_eq!(expiring.emptied().seconds, dec!(0));
    }
}
