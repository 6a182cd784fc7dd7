//! Activation period model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interval::Interval;
use crate::AppResult;

/// Set of intervals that became effective at `activation_time`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationPeriod {
    pub activation_time: DateTime<Utc>,

    #[serde(default)]
    pub intervals: Vec<Interval>,
}

impl ActivationPeriod {
    pub fn new(activation_time: DateTime<Utc>) -> Self {
        Self {
            activation_time,
            intervals: Vec::new(),
        }
    }

    /// Adds an interval, merging prices into an equal one if present
    pub fn add_interval(&mut self, interval: Interval) {
        match self.intervals.iter_mut().find(|i| i.equal(&interval)) {
            Some(existing) => existing.merge_prices(&interval.prices),
            None => self.intervals.push(interval),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        self.intervals.iter().try_for_each(Interval::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalendarTiming, Price};
    use chrono::{TimeZone, Weekday};
    use rust_decimal_macros::dec;

    fn weekday_interval(price: Price) -> Interval {
        Interval::new(
            CalendarTiming {
                week_days: vec![Weekday::Mon, Weekday::Tue],
                start_time: "08:00:00".to_string(),
                ..Default::default()
            },
            10.0,
            price,
        )
    }

    #[test]
    fn test_equal_intervals_merge_prices() {
        let mut ap = ActivationPeriod::new(Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap());
        ap.add_interval(weekday_interval(Price::new(dec!(1), 60, 1)));
        ap.add_interval(weekday_interval(Price {
            group_start_secs: 60,
            value: dec!(0.5),
            priced_units_secs: 60,
            rate_increment_secs: 1,
        }));

        assert_eq!(ap.intervals.len(), 1);
        assert_eq!(ap.intervals[0].prices.len(), 2);

        let other = Interval::new(
            CalendarTiming::daily("18:00:00", ""),
            10.0,
            Price::new(dec!(0.5), 60, 1),
        );
        ap.add_interval(other);
        assert_eq!(ap.intervals.len(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let mut ap = ActivationPeriod::new(Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap());
        ap.add_interval(weekday_interval(Price::new(dec!(0.1), 60, 1)).with_connect_fee(dec!(0.5)));

        let json = serde_json::to_string(&ap).unwrap();
        let back: ActivationPeriod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ap);
    }
}
