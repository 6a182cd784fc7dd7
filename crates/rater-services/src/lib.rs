//! Rating and balance services
//!
//! This crate orchestrates the engine's operations on top of a
//! `DataStorage` collaborator.
//!
//! # Services
//!
//! - `KeyedGuard` - Per-key async mutex registry serializing account and plan
//!   mutations
//! - `splitter` - Cuts a call window into cost-homogeneous time spans
//! - `Engine` - Cost calculation, max session time and the debit family
//! - `Scheduler` - Runs action timings on their calendar
//!
//! Services share their storage and guard through `Arc` and are safe to use
//! from concurrent tasks.

pub mod engine;
pub mod guard;
pub mod scheduler;
pub mod splitter;

pub use engine::Engine;
pub use guard::KeyedGuard;
pub use scheduler::Scheduler;

/// Engine constants
pub mod constants {
    /// Source tag of call costs written by the engine
    pub const RATER_SOURCE: &str = "rater";

    /// Source tag of action runs started by the scheduler
    pub const SCHEDULER_SOURCE: &str = "scheduler";
}
