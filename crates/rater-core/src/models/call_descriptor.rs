use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::Account;
use super::balance::Direction;
use super::rating_profile::RatingProfile;
use super::timespan::duration_secs;

fn default_category() -> String {
    "call".to_string()
}

/// Rating request for one call window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    #[serde(default)]
    pub direction: Direction,

    pub tenant: String,

    #[serde(default = "default_category")]
    pub category: String,

    pub subject: String,

    /// Account subject, the rating subject when empty
    #[serde(default)]
    pub account: Option<String>,

    /// Dialed number
    pub destination: String,

    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,

    /// Debit loop counter; the connect fee applies on loop 0 only
    #[serde(default)]
    pub loop_index: u32,

    /// Seconds of call elapsed before `time_start`
    #[serde(default)]
    pub call_duration: Decimal,

    /// Requested seconds, 0 means the whole window
    #[serde(default)]
    pub amount: Decimal,
}

impl CallDescriptor {
    pub fn new(
        tenant: &str,
        subject: &str,
        destination: &str,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        Self {
            direction: Direction::Out,
            tenant: tenant.to_string(),
            category: default_category(),
            subject: subject.to_string(),
            account: None,
            destination: destination.to_string(),
            time_start,
            time_end,
            loop_index: 0,
            call_duration: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }

    pub fn with_account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    pub fn account_subject(&self) -> &str {
        match self.account.as_deref() {
            Some(a) if !a.is_empty() => a,
            _ => &self.subject,
        }
    }

    pub fn account_key(&self) -> String {
        Account::key(&self.tenant, self.account_subject())
    }

    pub fn profile_key(&self) -> String {
        RatingProfile::key(self.direction, &self.tenant, &self.category, &self.subject)
    }

    pub fn window_secs(&self) -> Decimal {
        duration_secs(self.time_end - self.time_start)
    }

    pub fn requested_secs(&self) -> Decimal {
        if self.amount > Decimal::ZERO {
            self.amount
        } else {
            self.window_secs()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn cd() -> CallDescriptor {
        let start = Utc.with_ymd_and_hms(2013, 5, 10, 10, 0, 0).unwrap();
        CallDescriptor::new("vdf", "rif", "0723045326", start, start + chrono::Duration::seconds(90))
    }

    #[test]
    fn test_keys() {
        let cd = cd();
        assert_eq!(cd.profile_key(), "*out:vdf:call:rif");
        assert_eq!(cd.account_key(), "vdf:rif");
        assert_eq!(cd.with_account("minu").account_key(), "vdf:minu");
    }

    #[test]
    fn test_requested_secs() {
        let mut cd = cd();
        assert_eq!(cd.requested_secs(), dec!(90));
        cd.amount = dec!(30);
        assert_eq!(cd.requested_secs(), dec!(30));
    }

    #[test]
    fn test_deserialize_defaults() {
        let cd: CallDescriptor = serde_json::from_str(
            r#"{"tenant":"vdf","subject":"rif","destination":"0256",
                "time_start":"2013-05-10T10:00:00Z","time_end":"2013-05-10T10:01:00Z"}"#,
        )
        .unwrap();
        assert_eq!(cd.category, "call");
        assert_eq!(cd.direction, Direction::Out);
        assert_eq!(cd.loop_index, 0);
        assert_eq!(cd.account_subject(), "rif");
    }
}
