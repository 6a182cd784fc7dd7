//! Rating profile model
//!
//! Maps a subject key to the activation periods of each destination it can
//! call. Profiles may chain to a fallback profile for destinations they do
//! not price themselves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::activation_period::ActivationPeriod;
use super::balance::Direction;
use super::destination::DestinationIndex;
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingProfile {
    /// `direction:tenant:category:subject`
    pub id: String,

    /// Profile consulted when this one has no match
    #[serde(default)]
    pub fallback_key: Option<String>,

    /// Destination id to activation periods, ordered by activation time
    #[serde(default)]
    pub destination_map: BTreeMap<String, Vec<ActivationPeriod>>,
}

impl RatingProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fallback_key: None,
            destination_map: BTreeMap::new(),
        }
    }

    /// Builds the storage key of a profile
    pub fn key(direction: Direction, tenant: &str, category: &str, subject: &str) -> String {
        format!("{}:{}:{}:{}", direction, tenant, category, subject)
    }

    /// Adds a period for a destination, merging intervals into a period with
    /// the same activation time
    pub fn add_activation_period(&mut self, destination_id: &str, period: ActivationPeriod) {
        let periods = self
            .destination_map
            .entry(destination_id.to_string())
            .or_default();
        match periods
            .iter_mut()
            .find(|p| p.activation_time == period.activation_time)
        {
            Some(existing) => {
                for interval in period.intervals {
                    existing.add_interval(interval);
                }
            }
            None => {
                periods.push(period);
                periods.sort_by_key(|p| p.activation_time);
            }
        }
    }

    pub fn destination_ids(&self) -> impl Iterator<Item = &String> {
        self.destination_map.keys()
    }

    /// Finds the periods of the destination with the longest prefix match.
    ///
    /// Equal-length matches resolve to the lexicographically smallest
    /// destination id. Returns the matched prefix with the periods.
    pub fn activation_periods_for_prefix(
        &self,
        number: &str,
        destinations: &DestinationIndex,
    ) -> Option<(String, &[ActivationPeriod])> {
        let mut best: Option<(usize, &Vec<ActivationPeriod>)> = None;
        for (dest_id, periods) in &self.destination_map {
            let Some(destination) = destinations.get(dest_id) else {
                continue;
            };
            let precision = destination.contains_prefix(number);
            if precision > 0 && best.map_or(true, |(len, _)| precision > len) {
                best = Some((precision, periods));
            }
        }
        best.map(|(len, periods)| (number[..len].to_string(), periods.as_slice()))
    }

    pub fn validate(&self) -> AppResult<()> {
        self.destination_map
            .values()
            .flatten()
            .try_for_each(ActivationPeriod::validate)
    }
}
