//! Storage key constants and builders
//!
//! Every stored entity lives under a short type prefix followed by its id.
//! The same keys name the guard entries of accounts and action plans, so the
//! plan prefix must sort before the account prefix.
//!
//! # Key Patterns
//!
//! - `rpf_{direction:tenant:category:subject}` - Rating profiles
//! - `dst_{id}` - Destinations
//! - `ubl_{tenant:subject}` - Accounts
//! - `act_{id}` - Action bundles
//! - `apl_{plan}` - Action timing lists
//! - `cco_{source}_{uuid}` - Call cost log
//! - `alg_{uuid}` - Action log (trigger and timing runs)

/// Prefix for rating profiles
pub const RATING_PROFILE_PREFIX: &str = "rpf_";

/// Prefix for destinations
pub const DESTINATION_PREFIX: &str = "dst_";

/// Prefix for accounts
pub const ACCOUNT_PREFIX: &str = "ubl_";

/// Prefix for action bundles
pub const ACTIONS_PREFIX: &str = "act_";

/// Prefix for action timing lists
pub const ACTION_TIMINGS_PREFIX: &str = "apl_";

/// Prefix for logged call costs
pub const CALL_COST_LOG_PREFIX: &str = "cco_";

/// Prefix for logged action runs
pub const ACTION_LOG_PREFIX: &str = "alg_";

pub fn rating_profile_key(id: &str) -> String {
    format!("{}{}", RATING_PROFILE_PREFIX, id)
}

pub fn destination_key(id: &str) -> String {
    format!("{}{}", DESTINATION_PREFIX, id)
}

/// Storage and guard key of an account
///
/// # Example
///
/// ```
/// use rater_store::keys::account_key;
///
/// assert_eq!(account_key("vdf:rif"), "ubl_vdf:rif");
/// ```
pub fn account_key(id: &str) -> String {
    format!("{}{}", ACCOUNT_PREFIX, id)
}

pub fn actions_key(id: &str) -> String {
    format!("{}{}", ACTIONS_PREFIX, id)
}

/// Storage and guard key of an action plan
pub fn action_timings_key(plan: &str) -> String {
    format!("{}{}", ACTION_TIMINGS_PREFIX, plan)
}

pub fn call_cost_log_key(source: &str, uuid: &str) -> String {
    format!("{}{}_{}", CALL_COST_LOG_PREFIX, source, uuid)
}

pub fn action_log_key(uuid: &str) -> String {
    format!("{}{}", ACTION_LOG_PREFIX, uuid)
}

/// Wildcard pattern for a prefix
pub fn pattern(prefix: &str) -> String {
    format!("{}*", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_keys() {
        assert_eq!(rating_profile_key("*out:vdf:call:rif"), "rpf_*out:vdf:call:rif");
        assert_eq!(destination_key("NAT"), "dst_NAT");
        assert_eq!(account_key("vdf:rif"), "ubl_vdf:rif");
        assert_eq!(actions_key("TOPUP10"), "act_TOPUP10");
        assert_eq!(action_timings_key("STANDARD"), "apl_STANDARD");
    }

    #[test]
    fn test_log_keys() {
        assert_eq!(call_cost_log_key("rater", "abc"), "cco_rater_abc");
        assert_eq!(action_log_key("abc"), "alg_abc");
        assert_eq!(pattern(ACTION_TIMINGS_PREFIX), "apl_*");
    }

    #[test]
    fn test_plan_keys_sort_before_account_keys() {
        assert!(action_timings_key("ZZZ") < account_key("aaa:aaa"));
    }

    #[test]
    fn test_key_uniqueness() {
        let keys = vec![
            rating_profile_key("123"),
            destination_key("123"),
            account_key("123"),
            actions_key("123"),
            action_timings_key("123"),
        ];
        let unique_count = keys.iter().collect::<std::collections::HashSet<_>>().len();
        assert_eq!(unique_count, keys.len());
    }
}
