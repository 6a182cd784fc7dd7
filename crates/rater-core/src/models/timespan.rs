//! Time span model
//!
//! A time span is a cost-homogeneous piece of a call window: one tariff
//! interval or one bonus bucket applies to all of it.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::activation_period::ActivationPeriod;
use super::interval::Interval;

/// Converts a duration to seconds with millisecond precision
pub fn duration_secs(d: Duration) -> Decimal {
    Decimal::new(d.num_milliseconds(), 3)
}

/// Converts seconds to a duration, rounded to the millisecond
pub fn secs_duration(secs: Decimal) -> Duration {
    Duration::milliseconds((secs * Decimal::ONE_THOUSAND).round().to_i64().unwrap_or(i64::MAX))
}

/// Bonus bucket usage carried by a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusInfo {
    pub destination_id: String,
    pub seconds: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,

    #[serde(default)]
    pub cost: Decimal,

    /// Activation time of the owning period
    #[serde(default)]
    pub activation_time: Option<DateTime<Utc>>,

    /// Index of the owning period in the list being split
    #[serde(skip)]
    pub period_index: Option<usize>,

    #[serde(default)]
    pub interval: Option<Interval>,

    #[serde(default)]
    pub bonus: Option<BonusInfo>,

    /// Seconds of call elapsed at `time_start`
    #[serde(default)]
    pub call_duration: Decimal,
}

impl TimeSpan {
    pub fn new(time_start: DateTime<Utc>, time_end: DateTime<Utc>) -> Self {
        Self {
            time_start,
            time_end,
            cost: Decimal::ZERO,
            activation_time: None,
            period_index: None,
            interval: None,
            bonus: None,
            call_duration: Decimal::ZERO,
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    pub fn duration_secs(&self) -> Decimal {
        duration_secs(self.duration())
    }

    pub fn is_bonus(&self) -> bool {
        self.bonus.is_some()
    }

    /// Strictly inside the span, excluding both ends
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.time_start < t && t < self.time_end
    }

    pub fn set_period(&mut self, index: usize, period: &ActivationPeriod) {
        self.period_index = Some(index);
        self.activation_time = Some(period.activation_time);
    }

    /// Keeps the better interval: higher weight, then lower unit price
    pub fn set_interval(&mut self, candidate: &Interval) {
        let better = match &self.interval {
            None => true,
            Some(current) if current.weight < candidate.weight => true,
            Some(current) if current.weight > candidate.weight => false,
            Some(current) => current.base_unit_price() > candidate.base_unit_price(),
        };
        if better {
            self.interval = Some(candidate.clone());
        }
    }

    /// Cuts the span at `t`, returning `[t, end)`. The new span keeps the
    /// owning period but no interval.
    pub fn split_at(&mut self, t: DateTime<Utc>) -> TimeSpan {
        let tail = TimeSpan {
            activation_time: self.activation_time,
            period_index: self.period_index,
            call_duration: self.call_duration + duration_secs(t - self.time_start),
            ..TimeSpan::new(t, self.time_end)
        };
        self.time_end = t;
        tail
    }

    /// Splits where a later activation period starts inside the span
    pub fn split_by_activation_period(
        &mut self,
        index: usize,
        period: &ActivationPeriod,
    ) -> Option<TimeSpan> {
        if !self.contains(period.activation_time) {
            return None;
        }
        let mut tail = self.split_at(period.activation_time);
        tail.set_period(index, period);
        Some(tail)
    }

    /// Splits at the first midnight inside the span
    pub fn split_by_day(&mut self) -> Option<TimeSpan> {
        let next_day = self.time_start.date_naive().succ_opt()?;
        let midnight = Utc.from_utc_datetime(&next_day.and_time(NaiveTime::MIN));
        if !self.contains(midnight) {
            return None;
        }
        Some(self.split_at(midnight))
    }

    /// Matches the span against one interval, splitting off the part on the
    /// other side of the interval's boundary when only one end is inside.
    pub fn split_by_interval(&mut self, interval: &Interval) -> Option<TimeSpan> {
        let start_in = interval.contains(self.time_start, false);
        let end_in = interval.contains(self.time_end, true);

        match (start_in, end_in) {
            (true, true) => {
                self.set_interval(interval);
                None
            }
            (true, false) => {
                let split = interval.timing.right_margin(self.time_start);
                self.set_interval(interval);
                if !self.contains(split) {
                    return None;
                }
                Some(self.split_at(split))
            }
            (false, true) => {
                let split = interval.timing.left_margin(self.time_end);
                if !self.contains(split) {
                    return None;
                }
                let mut tail = self.split_at(split);
                tail.set_interval(interval);
                Some(tail)
            }
            (false, false) => {
                // the interval may still lie wholly inside the span
                let split = interval.timing.left_margin(self.time_start + Duration::seconds(1));
                if self.contains(split) && interval.contains(split, false) {
                    return Some(self.split_at(split));
                }
                None
            }
        }
    }

    /// Splits where the interval's next price step begins
    pub fn split_by_price_group(&mut self) -> Option<TimeSpan> {
        let interval = self.interval.as_ref()?;
        let end = self.call_duration + self.duration_secs();
        let boundary = interval
            .prices
            .iter()
            .map(|p| Decimal::from(p.group_start_secs))
            .find(|g| *g > self.call_duration && *g < end)?;

        let at = self.time_start + secs_duration(boundary - self.call_duration);
        let mut tail = self.split_at(at);
        tail.interval = self.interval.clone();
        Some(tail)
    }

    /// Computes and stores the span's cost
    pub fn compute_cost(&mut self) -> Decimal {
        self.cost = match (&self.bonus, &self.interval) {
            (Some(bonus), _) => self.duration_secs() * bonus.price,
            (None, Some(interval)) => interval.cost(self.duration_secs(), self.call_duration),
            (None, None) => Decimal::ZERO,
        };
        self.cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalendarTiming, Price};
    use rust_decimal_macros::dec;

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 2, d, h, m, s).unwrap()
    }

    fn daily(start: &str, end: &str, weight: f64, value: Decimal) -> Interval {
        Interval::new(CalendarTiming::daily(start, end), weight, Price::new(value, 60, 1))
    }

    #[test]
    fn test_duration_conversions() {
        assert_eq!(duration_secs(Duration::milliseconds(1500)), dec!(1.5));
        assert_eq!(secs_duration(dec!(2.25)), Duration::milliseconds(2250));
    }

    #[test]
    fn test_interval_enclosing_span() {
        let mut ts = TimeSpan::new(at(2, 10, 0, 0), at(2, 11, 0, 0));
        assert!(ts.split_by_interval(&daily("08:00:00", "18:00:00", 0.0, dec!(1))).is_none());
        assert!(ts.interval.is_some());
    }

    #[test]
    fn test_split_right_of_interval() {
        let mut ts = TimeSpan::new(at(2, 17, 0, 0), at(2, 19, 0, 0));
        let tail = ts.split_by_interval(&daily("08:00:00", "18:00:00", 0.0, dec!(1))).unwrap();
        assert_eq!(ts.time_end, at(2, 18, 0, 0));
        assert!(ts.interval.is_some());
        assert_eq!(tail.time_start, at(2, 18, 0, 0));
        assert!(tail.interval.is_none());
    }

    #[test]
    fn test_split_left_of_interval() {
        let mut ts = TimeSpan::new(at(2, 17, 0, 0), at(2, 19, 0, 0));
        let tail = ts.split_by_interval(&daily("18:00:00", "", 0.0, dec!(1))).unwrap();
        assert_eq!(ts.time_end, at(2, 18, 0, 0));
        assert!(ts.interval.is_none());
        assert_eq!(tail.time_start, at(2, 18, 0, 0));
        assert!(tail.interval.is_some());
    }

    #[test]
    fn test_split_interval_inside_span() {
        let mut ts = TimeSpan::new(at(2, 10, 0, 0), at(2, 20, 0, 0));
        let tail = ts.split_by_interval(&daily("12:00:00", "14:00:00", 0.0, dec!(1))).unwrap();
        assert_eq!(ts.time_end, at(2, 12, 0, 0));
        assert_eq!(tail.time_start, at(2, 12, 0, 0));
        assert!(ts.interval.is_none());
    }

    #[test]
    fn test_span_touching_boundary_is_not_matched() {
        let mut ts = TimeSpan::new(at(2, 18, 0, 0), at(2, 19, 0, 0));
        assert!(ts.split_by_interval(&daily("08:00:00", "18:00:00", 0.0, dec!(1))).is_none());
        assert!(ts.interval.is_none());
    }

    #[test]
    fn test_set_interval_prefers_weight_then_price() {
        let mut ts = TimeSpan::new(at(2, 10, 0, 0), at(2, 11, 0, 0));
        ts.set_interval(&daily("", "", 10.0, dec!(2)));
        ts.set_interval(&daily("", "", 5.0, dec!(1)));
        assert_eq!(ts.interval.as_ref().unwrap().weight, 10.0);

        ts.set_interval(&daily("", "", 10.0, dec!(1)));
        assert_eq!(ts.interval.as_ref().unwrap().prices[0].value, dec!(1));
    }

    #[test]
    fn test_split_by_day() {
        let mut ts = TimeSpan::new(at(2, 23, 0, 0), at(3, 1, 0, 0));
        let tail = ts.split_by_day().unwrap();
        assert_eq!(ts.time_end, at(3, 0, 0, 0));
        assert_eq!(tail.time_end, at(3, 1, 0, 0));

        let mut whole_day = TimeSpan::new(at(2, 0, 0, 0), at(3, 0, 0, 0));
        assert!(whole_day.split_by_day().is_none());
    }

    #[test]
    fn test_split_by_price_group() {
        let mut interval = daily("", "", 0.0, dec!(0.6));
        interval.merge_prices(&[Price {
            group_start_secs: 60,
            value: dec!(0.3),
            priced_units_secs: 60,
            rate_increment_secs: 1,
        }]);
        let mut ts = TimeSpan::new(at(2, 10, 0, 0), at(2, 10, 2, 0));
        ts.interval = Some(interval);

        let mut tail = ts.split_by_price_group().unwrap();
        assert_eq!(ts.time_end, at(2, 10, 1, 0));
        assert_eq!(tail.call_duration, dec!(60));
        assert_eq!(ts.compute_cost(), dec!(0.6));
        assert_eq!(tail.compute_cost(), dec!(0.3));
    }

    #[test]
    fn test_bonus_cost() {
        let mut ts = TimeSpan::new(at(2, 10, 0, 0), at(2, 10, 0, 10));
        ts.bonus = Some(BonusInfo {
            destination_id: "NAT".to_string(),
            seconds: dec!(10),
            price: dec!(0.5),
        });
        assert_eq!(ts.compute_cost(), dec!(5));
    }
}
