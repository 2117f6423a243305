//! Entities shared by the console and the checker application.
//!
//! These are storage-agnostic; the Mongo adapter owns the document shapes and converts.

use chrono::{DateTime, Duration, Utc};

use crate::duration::BlockType;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Expired,
    #[default]
    None,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::None => "none",
        }
    }

    /// Unknown or missing values are treated as `None`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "expired" => Self::Expired,
            _ => Self::None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subscription {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub days_validity: Option<f64>,
    pub status: SubscriptionStatus,
}

impl Subscription {
    /// Whole days left until `end_date` (rounded up, never negative).
    pub fn remaining_days(&self, now: DateTime<Utc>) -> i64 {
        self.end_date.map(|end| ceil_days(end - now)).unwrap_or(0)
    }
}

/// Suspension status of an account.
///
/// When `is_blocked` is false every other field is `None`. Use [`crate::block::evaluate`]
/// rather than reading `is_blocked`: an expired block stays set until it is evaluated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockState {
    pub is_blocked: bool,
    pub reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_type: Option<BlockType>,
}

impl BlockState {
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_cleared(&self) -> bool {
        *self == Self::cleared()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Account {
    pub username: String,
    /// Value reference to the `AccessKey.key` that activated this account.
    pub access_key: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub subscription: Subscription,
    pub block_state: BlockState,
    /// Tells the checker application to close the user's running session.
    pub force_close: bool,
}

impl Account {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_login_at.or(self.created_at)
    }
}

/// Admin who issued a key. Metadata only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyIssuer {
    pub admin_id: String,
    pub admin_username: Option<String>,
    pub admin_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccessKey {
    pub key: String,
    /// Fractional when the key was issued in hours.
    pub days_validity: f64,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by: Option<KeyIssuer>,
}

impl AccessKey {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }

    pub fn remaining_days(&self, now: DateTime<Utc>) -> i64 {
        ceil_days(self.expires_at - now)
    }
}

/// Whether any account references a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyUsage {
    Available,
    UsedBy(String),
}

impl KeyUsage {
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Available => "Disponible",
            Self::UsedBy(_) => "Utilizada",
        }
    }

    pub fn used_by_label(&self) -> &str {
        match self {
            Self::Available => "N/A",
            Self::UsedBy(username) => username,
        }
    }
}

/// A key joined with the account that references it.
#[derive(Clone, Debug, PartialEq)]
pub struct DecoratedKey {
    pub key: AccessKey,
    pub usage: KeyUsage,
}

/// Point-in-time process sample.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ServerStatus {
    pub memory_bytes: u64,
    pub cpu_load: f64,
    pub uptime_seconds: u64,
}

/// Monotonic counters reported by the checker application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsCounters {
    pub total_checks: u64,
    pub lives_found: u64,
}

/// The single aggregate stats document.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsSnapshot {
    pub active_usernames: Vec<String>,
    pub counters: StatsCounters,
    pub last_updated_at: DateTime<Utc>,
    pub server_status: ServerStatus,
}

/// Append-only record of a rejected command attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityLogEntry {
    pub username: Option<String>,
    pub user_id: i64,
    pub command_text: String,
    pub timestamp: DateTime<Utc>,
}

fn ceil_days(d: Duration) -> i64 {
    let secs = d.num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 86_399) / 86_400
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn key(used: bool) -> AccessKey {
        AccessKey {
            key: "AB".to_string(),
            days_validity: 30.0,
            used,
            created_at: t0(),
            expires_at: t0() + Duration::days(30),
            created_by: None,
        }
    }

    #[test]
    fn key_validity_requires_unused_and_unexpired() {
        assert!(key(false).is_valid(t0() + Duration::days(29)));
        assert!(!key(true).is_valid(t0()));
        assert!(!key(false).is_valid(t0() + Duration::days(30)));
    }

    #[test]
    fn remaining_days_round_up_and_floor_at_zero() {
        let k = key(false);
        assert_eq!(k.remaining_days(t0()), 30);
        assert_eq!(k.remaining_days(t0() + Duration::hours(1)), 30);
        assert_eq!(k.remaining_days(t0() + Duration::days(31)), 0);
    }

    #[test]
    fn subscription_status_parsing_is_lenient() {
        assert_eq!(SubscriptionStatus::parse("Active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::parse("expired"), SubscriptionStatus::Expired);
        assert_eq!(SubscriptionStatus::parse(""), SubscriptionStatus::None);
    }

    #[test]
    fn key_usage_labels() {
        assert_eq!(KeyUsage::Available.status_label(), "Disponible");
        assert_eq!(KeyUsage::Available.used_by_label(), "N/A");
        let used = KeyUsage::UsedBy("alice".to_string());
        assert_eq!(used.status_label(), "Utilizada");
        assert_eq!(used.used_by_label(), "alice");
    }
}
