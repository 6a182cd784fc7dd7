//! Rating engine core library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the rating engine. It includes:
//!
//! - Domain models (tariffs, accounts, actions, call descriptors)
//! - The account balance state machine and the action handler table
//! - The `DataStorage` collaborator trait
//! - Unified error handling and application configuration

pub mod actions;
pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
