use std::{fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::{
    errors::Error,
    model::{AccessKey, DecoratedKey, KeyIssuer},
    ports::KeyStore,
    Result,
};

/// Token entropy in bytes (rendered as 32 uppercase hex chars).
pub const KEY_BYTES: usize = 16;

const MAX_VALIDITY_DAYS: i64 = 36_500;

/// How long a new key stays redeemable.
///
/// Hour-based keys are stored with a fractional `days_validity`; the expiry itself is computed
/// from the exact hour count so nothing is rounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyValidity {
    Days(u32),
    Hours(u32),
}

impl KeyValidity {
    pub fn from_days(days: i64) -> Result<Self> {
        if days <= 0 || days > MAX_VALIDITY_DAYS {
            return Err(Error::invalid(format!(
                "Key validity must be between 1 and {MAX_VALIDITY_DAYS} days"
            )));
        }
        Ok(Self::Days(days as u32))
    }

    pub fn from_hours(hours: i64) -> Result<Self> {
        if hours <= 0 || hours > MAX_VALIDITY_DAYS * 24 {
            return Err(Error::invalid(format!(
                "Key validity must be between 1 and {} hours",
                MAX_VALIDITY_DAYS * 24
            )));
        }
        Ok(Self::Hours(hours as u32))
    }

    /// Parse `/genkey` arguments: `[]`, `[<days>]`, `[d, <days>]` or `[h, <hours>]`.
    pub fn parse_args(args: &[String], default_days: u32) -> Result<Self> {
        let parse = |s: &str| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| Error::invalid(format!("'{s}' is not a whole number")))
        };

        match args {
            [] => Self::from_days(i64::from(default_days)),
            [unit, n, ..] if unit.eq_ignore_ascii_case("h") => Self::from_hours(parse(n)?),
            [unit, n, ..] if unit.eq_ignore_ascii_case("d") => Self::from_days(parse(n)?),
            [n, ..] => Self::from_days(parse(n)?),
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Self::Days(d) => Duration::days(i64::from(d)),
            Self::Hours(h) => Duration::hours(i64::from(h)),
        }
    }

    pub fn days(self) -> f64 {
        match self {
            Self::Days(d) => f64::from(d),
            Self::Hours(h) => f64::from(h) / 24.0,
        }
    }
}

impl fmt::Display for KeyValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(1) => f.write_str("1 day"),
            Self::Days(d) => write!(f, "{d} days"),
            Self::Hours(1) => f.write_str("1 hour"),
            Self::Hours(h) => write!(f, "{h} hours"),
        }
    }
}

/// 128 random bits from the thread-local CSPRNG, uppercase hex.
pub fn generate_token() -> String {
    let bytes: [u8; KEY_BYTES] = rand::rng().random();
    hex::encode_upper(bytes)
}

#[derive(Clone)]
pub struct KeyRepository {
    store: Arc<dyn KeyStore>,
}

impl KeyRepository {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Issue a new key. A token collision fails with `Error::Conflict`.
    pub async fn generate(
        &self,
        validity: KeyValidity,
        issuer: Option<KeyIssuer>,
        now: DateTime<Utc>,
    ) -> Result<AccessKey> {
        let key = AccessKey {
            key: generate_token(),
            days_validity: validity.days(),
            used: false,
            created_at: now,
            expires_at: now + validity.duration(),
            created_by: issuer,
        };
        self.store.insert(&key).await?;
        tracing::info!(validity = %validity, "access key generated");
        Ok(key)
    }

    /// Mark a key as redeemed. Marking an already used key is a caller error.
    pub async fn mark_used(&self, key: &str) -> Result<AccessKey> {
        if let Some(updated) = self.store.mark_used(key).await? {
            return Ok(updated);
        }
        match self.store.find(key).await? {
            Some(_) => Err(Error::invalid(format!("Key {key} was already used"))),
            None => Err(Error::not_found(format!("Key {key} not found"))),
        }
    }

    /// Delete regardless of `used`. Returns whether a key was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        if removed {
            tracing::info!("access key deleted");
        }
        Ok(removed)
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<DecoratedKey>> {
        self.store.list_recent_with_usage(limit).await
    }

    pub async fn list_all(&self) -> Result<Vec<AccessKey>> {
        self.store.list_all().await
    }
}
