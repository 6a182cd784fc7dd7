//! Domain models for the rating engine
//!
//! Tariff data (intervals, activation periods, rating profiles,
//! destinations), account state, actions and the rating request and
//! result types.

pub mod account;
pub mod action;
pub mod action_timing;
pub mod activation_period;
pub mod balance;
pub mod bucket;
pub mod call_cost;
pub mod call_descriptor;
pub mod destination;
pub mod interval;
pub mod rating_profile;
pub mod timespan;
pub mod timing;

pub use account::{Account, AccountContext, FiredTrigger};
pub use action::{sort_actions, sort_triggers, Action, ActionKind, ActionTrigger, UnitCounter};
pub use action_timing::{compare_timings, ActionTiming};
pub use activation_period::ActivationPeriod;
pub use balance::{balance_key, AccountType, BalanceKind, Direction};
pub use bucket::{compare_buckets, sort_buckets, MinuteBucket};
pub use call_cost::{CallCost, MaxSessionTime};
pub use call_descriptor::CallDescriptor;
pub use destination::{Destination, DestinationIndex};
pub use interval::{Interval, Price, RoundingMethod};
pub use rating_profile::RatingProfile;
pub use timespan::{duration_secs, secs_duration, BonusInfo, TimeSpan};
pub use timing::{CalendarTiming, ASAP};
