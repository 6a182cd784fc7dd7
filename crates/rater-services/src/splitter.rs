//! Time span splitter
//!
//! Cuts a call window into spans that each have exactly one price: either a
//! bonus bucket or a single tariff interval. Passes run in a fixed order:
//!
//! 1. bonus buckets carve the head of the window
//! 2. the rest is assigned activation periods and split where a later
//!    period starts
//! 3. spans are split at midnight
//! 4. spans are matched against the period's intervals and split at
//!    interval boundaries
//! 5. spans are split where the interval's next price step begins
//!
//! Every span's cost is computed before the list is returned.

use chrono::{DateTime, Utc};
use rater_core::models::{
    duration_secs, secs_duration, ActivationPeriod, BonusInfo, MinuteBucket, TimeSpan,
};
use rust_decimal::Decimal;
use tracing::debug;

/// Splits `[time_start, time_end)` and prices every span.
///
/// `call_duration` is the call time already elapsed at `time_start`;
/// `buckets` must be in consumption order and are only read.
pub fn split(
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    call_duration: Decimal,
    periods: &[ActivationPeriod],
    buckets: &[MinuteBucket],
) -> Vec<TimeSpan> {
    let mut head = TimeSpan::new(time_start, time_end);
    head.call_duration = call_duration;

    let mut spans = split_by_buckets(head, buckets);
    if spans.last().map_or(false, TimeSpan::is_bonus) {
        return finish(spans);
    }

    assign_periods(&mut spans, periods);
    spans = refine(spans, periods);
    finish(spans)
}

/// Runs the tariff passes again over already split spans
pub fn resplit(spans: &[TimeSpan], periods: &[ActivationPeriod]) -> Vec<TimeSpan> {
    let mut spans = spans.to_vec();
    assign_periods(&mut spans, periods);
    finish(refine(spans, periods))
}

fn finish(mut spans: Vec<TimeSpan>) -> Vec<TimeSpan> {
    spans.sort_by_key(|ts| ts.time_start);
    for ts in spans.iter_mut() {
        ts.compute_cost();
    }
    debug!("Split into {} spans", spans.len());
    spans
}

fn split_by_buckets(head: TimeSpan, buckets: &[MinuteBucket]) -> Vec<TimeSpan> {
    let mut spans = Vec::new();
    let mut rest = head;

    for bucket in buckets {
        if bucket.seconds <= Decimal::ZERO || bucket.is_expired_at(rest.time_start) {
            continue;
        }

        let mut seconds = bucket.seconds.min(rest.duration_secs());
        if let Some(expires_at) = bucket.expires_at {
            if expires_at < rest.time_end {
                let until_expiry = duration_secs(expires_at - rest.time_start);
                seconds = seconds.min(until_expiry);
            }
        }
        if seconds <= Decimal::ZERO {
            continue;
        }

        let at = rest.time_start + secs_duration(seconds);
        if rest.contains(at) {
            let tail = rest.split_at(at);
            rest.bonus = Some(bonus_info(bucket, rest.duration_secs()));
            spans.push(std::mem::replace(&mut rest, tail));
        } else {
            rest.bonus = Some(bonus_info(bucket, rest.duration_secs()));
            break;
        }
    }

    spans.push(rest);
    spans
}

fn bonus_info(bucket: &MinuteBucket, seconds: Decimal) -> BonusInfo {
    BonusInfo {
        destination_id: bucket.destination_id.clone(),
        seconds,
        price: bucket.price,
    }
}

/// Index of the period in effect at `t`: the latest one already active, or
/// the first one when none is
fn period_at(periods: &[ActivationPeriod], t: DateTime<Utc>) -> Option<usize> {
    if periods.is_empty() {
        return None;
    }
    Some(
        periods
            .iter()
            .rposition(|p| p.activation_time <= t)
            .unwrap_or(0),
    )
}

fn assign_periods(spans: &mut [TimeSpan], periods: &[ActivationPeriod]) {
    for ts in spans.iter_mut().filter(|ts| !ts.is_bonus()) {
        if let Some(i) = period_at(periods, ts.time_start) {
            ts.set_period(i, &periods[i]);
        }
    }
}

fn refine(spans: Vec<TimeSpan>, periods: &[ActivationPeriod]) -> Vec<TimeSpan> {
    let (bonus, tariff): (Vec<TimeSpan>, Vec<TimeSpan>) =
        spans.into_iter().partition(TimeSpan::is_bonus);

    let tariff = split_each(tariff, |ts| {
        let current = ts.period_index?;
        (current + 1..periods.len()).find_map(|i| ts.split_by_activation_period(i, &periods[i]))
    });
    let tariff = split_each(tariff, TimeSpan::split_by_day);
    let tariff = split_each(tariff, |ts| {
        let period = &periods[ts.period_index?];
        period.intervals.iter().find_map(|interval| ts.split_by_interval(interval))
    });
    let tariff = split_each(tariff, TimeSpan::split_by_price_group);

    let mut spans = bonus;
    spans.extend(tariff);
    spans
}

/// Applies `cut` to every span until it stops producing tails. Tails are
/// queued and cut in turn.
fn split_each<F>(spans: Vec<TimeSpan>, mut cut: F) -> Vec<TimeSpan>
where
    F: FnMut(&mut TimeSpan) -> Option<TimeSpan>,
{
    let mut queue = spans;
    let mut done = Vec::with_capacity(queue.len());
    while let Some(mut ts) = queue.pop() {
        while let Some(tail) = cut(&mut ts) {
            queue.push(tail);
        }
        done.push(ts);
    }
    done
}
