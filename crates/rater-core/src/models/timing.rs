//! Calendar recurrence pattern
//!
//! Shared by tariff intervals and scheduled action timings. Empty sets mean
//! "any"; empty start/end times mean the day is unbounded on that side.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppResult;

/// Start time marker for action timings that run once, as soon as loaded
pub const ASAP: &str = "*asap";

/// Seconds in a day, used as the open end of a time-of-day range
const DAY_SECONDS: u32 = 86_400;

/// How far ahead the next start time search looks
const SEARCH_DAYS: u32 = 366 * 5;

/// Recurring calendar pattern
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarTiming {
    #[serde(default)]
    pub years: Vec<i32>,

    /// Months, 1 to 12
    #[serde(default)]
    pub months: Vec<u32>,

    /// Days of month, 1 to 31
    #[serde(default)]
    pub month_days: Vec<u32>,

    #[serde(default)]
    pub week_days: Vec<Weekday>,

    /// `HH:MM:SS`, empty for start of day, or `*asap` on action timings
    #[serde(default)]
    pub start_time: String,

    /// `HH:MM:SS`, empty for end of day
    #[serde(default)]
    pub end_time: String,
}

fn parse_time(field: &str, value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S").map_err(|_| AppError::malformed(field, value))
}

impl CalendarTiming {
    /// Timing that only fixes the time of day
    pub fn daily(start_time: &str, end_time: &str) -> Self {
        Self {
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            ..Default::default()
        }
    }

    pub fn is_asap(&self) -> bool {
        self.start_time == ASAP
    }

    /// True when no calendar set is populated
    pub fn has_no_recurrence(&self) -> bool {
        self.years.is_empty()
            && self.months.is_empty()
            && self.month_days.is_empty()
            && self.week_days.is_empty()
    }

    pub fn start(&self) -> Option<NaiveTime> {
        if self.start_time.is_empty() || self.is_asap() {
            return None;
        }
        NaiveTime::parse_from_str(&self.start_time, "%H:%M:%S").ok()
    }

    pub fn end(&self) -> Option<NaiveTime> {
        if self.end_time.is_empty() {
            return None;
        }
        NaiveTime::parse_from_str(&self.end_time, "%H:%M:%S").ok()
    }

    /// Checks every field, rejecting patterns that could never be matched
    /// reliably. `allow_asap` is set for action timings only.
    pub fn validate(&self, allow_asap: bool) -> AppResult<()> {
        if let Some(month) = self.months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(AppError::malformed("months", month));
        }
        if let Some(day) = self.month_days.iter().find(|d| !(1..=31).contains(*d)) {
            return Err(AppError::malformed("month_days", day));
        }

        let start = if self.start_time.is_empty() {
            None
        } else if self.is_asap() {
            if !allow_asap {
                return Err(AppError::malformed("start_time", ASAP));
            }
            None
        } else {
            Some(parse_time("start_time", &self.start_time)?)
        };

        if !self.end_time.is_empty() {
            let end = parse_time("end_time", &self.end_time)?;
            if let Some(start) = start {
                if end < start {
                    return Err(AppError::malformed(
                        "end_time",
                        format!("{} is before start {}", self.end_time, self.start_time),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Day-level match against the calendar sets
    pub fn matches_date(&self, date: NaiveDate) -> bool {
        (self.years.is_empty() || self.years.contains(&date.year()))
            && (self.months.is_empty() || self.months.contains(&date.month()))
            && (self.month_days.is_empty() || self.month_days.contains(&date.day()))
            && (self.week_days.is_empty() || self.week_days.contains(&date.weekday()))
    }

    fn start_secs(&self) -> u32 {
        self.start().map(|t| t.num_seconds_from_midnight()).unwrap_or(0)
    }

    /// End of the time-of-day range. An end before the start is treated as
    /// unbounded here; such patterns are rejected by `validate`.
    fn end_secs(&self) -> u32 {
        let start = self.start_secs();
        match self.end() {
            Some(end) if end.num_seconds_from_midnight() >= start => end.num_seconds_from_midnight(),
            _ => DAY_SECONDS,
        }
    }

    /// Reports whether the instant falls inside the pattern.
    ///
    /// A span start matches `[start, end)`; a span end (`is_end`) matches
    /// `(start, end]`, and an end exactly at midnight belongs to the previous
    /// day.
    pub fn contains(&self, t: DateTime<Utc>, is_end: bool) -> bool {
        let (date, tod) = if is_end && t.num_seconds_from_midnight() == 0 {
            ((t - Duration::seconds(1)).date_naive(), DAY_SECONDS)
        } else {
            (t.date_naive(), t.num_seconds_from_midnight())
        };

        if !self.matches_date(date) {
            return false;
        }

        let (start, end) = (self.start_secs(), self.end_secs());
        if is_end {
            start < tod && tod <= end
        } else {
            start <= tod && tod < end
        }
    }

    /// Where the pattern stops on the day of `t`
    pub fn right_margin(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        match self.end() {
            Some(end) if end.num_seconds_from_midnight() >= self.start_secs() => {
                Utc.from_utc_datetime(&date.and_time(end))
            }
            _ => Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)) + Duration::days(1),
        }
    }

    /// Where the pattern starts on the day that `t` closes
    pub fn left_margin(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = if t.num_seconds_from_midnight() == 0 {
            (t - Duration::seconds(1)).date_naive()
        } else {
            t.date_naive()
        };
        Utc.from_utc_datetime(&date.and_time(self.start().unwrap_or(NaiveTime::MIN)))
    }

    /// First matching day at the start time that is not before `now`
    pub fn next_start_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let at = self.start().unwrap_or(NaiveTime::MIN);
        let mut day = now.date_naive();
        for _ in 0..SEARCH_DAYS {
            if self.matches_date(day) {
                let candidate = Utc.from_utc_datetime(&day.and_time(at));
                if candidate >= now {
                    return Some(candidate);
                }
            }
            day = day.succ_opt()?;
        }
        None
    }
}
