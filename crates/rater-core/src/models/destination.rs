//! Destination model
//!
//! A destination is a named set of number prefixes. Rating profiles, bonus
//! buckets and triggers refer to destinations by id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub prefixes: Vec<String>,
}

impl Destination {
    pub fn new(id: &str, prefixes: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Length of the longest prefix that starts `number`, 0 when none does
    pub fn contains_prefix(&self, number: &str) -> usize {
        self.prefixes
            .iter()
            .filter(|p| !p.is_empty() && number.starts_with(p.as_str()))
            .map(|p| p.len())
            .max()
            .unwrap_or(0)
    }
}

/// Destinations resolved ahead of a rating or balance operation
pub type DestinationIndex = HashMap<String, Destination>;
