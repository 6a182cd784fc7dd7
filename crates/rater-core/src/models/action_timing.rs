//! Scheduled action bundles
//!
//! An action timing runs an action bundle against a list of accounts on a
//! calendar recurrence, or once when its start time is `*asap`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::timing::CalendarTiming;
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTiming {
    pub id: String,

    pub timing: CalendarTiming,

    #[serde(default)]
    pub weight: f64,

    /// Target account ids
    #[serde(default)]
    pub account_ids: Vec<String>,

    /// Bundle resolved from storage on every run
    pub actions_id: String,
}

impl ActionTiming {
    pub fn new(id: &str, timing: CalendarTiming, actions_id: &str, account_ids: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            timing,
            weight: 0.0,
            account_ids: account_ids.iter().map(|a| a.to_string()).collect(),
            actions_id: actions_id.to_string(),
        }
    }

    pub fn is_asap(&self) -> bool {
        self.timing.is_asap()
    }

    /// Timings without calendar sets run once
    pub fn is_one_time_run(&self) -> bool {
        self.timing.has_no_recurrence()
    }

    pub fn next_start_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_asap() {
            return None;
        }
        self.timing.next_start_time(now)
    }

    /// When a freshly loaded timing is due.
    ///
    /// `*asap` and one-time timings whose start already passed run after
    /// `asap_delay`; everything else waits for the calendar.
    pub fn first_run(&self, now: DateTime<Utc>, asap_delay: Duration) -> Option<DateTime<Utc>> {
        if self.is_asap() {
            return Some(now + asap_delay);
        }
        if self.is_one_time_run() {
            let today = self.timing.start().map(|t| Utc.from_utc_datetime(&now.date_naive().and_time(t)));
            return match today {
                Some(at) if at >= now => Some(at),
                _ => Some(now + asap_delay),
            };
        }
        self.next_start_time(now)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.timing.validate(true)
    }
}

/// Queue order: earlier start first, then lower weight
pub fn compare_timings(
    a: (&DateTime<Utc>, &ActionTiming),
    b: (&DateTime<Utc>, &ActionTiming),
) -> Ordering {
    a.0.cmp(b.0).then_with(|| a.1.weight.total_cmp(&b.1.weight))
}
