//! Block duration codes and expiry resolution.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockType {
    Hours24,
    Hours48,
    Week,
    Permanent,
}

impl BlockType {
    pub const ALL: [BlockType; 4] = [Self::Hours24, Self::Hours48, Self::Week, Self::Permanent];

    pub fn code(self) -> &'static str {
        match self {
            Self::Hours24 => "24h",
            Self::Hours48 => "48h",
            Self::Week => "week",
            Self::Permanent => "permanent",
        }
    }

    /// Length of the block, `None` for permanent.
    pub fn length(self) -> Option<Duration> {
        match self {
            Self::Hours24 => Some(Duration::hours(24)),
            Self::Hours48 => Some(Duration::hours(48)),
            Self::Week => Some(Duration::days(7)),
            Self::Permanent => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Hours24 => "24 hours",
            Self::Hours48 => "48 hours",
            Self::Week => "1 week",
            Self::Permanent => "permanently",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BlockType {
    type Err = Error;

    /// Codes are matched case-insensitively. There is no fallback duration.
    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "Invalid block duration '{}'. Use 24h, 48h, week or permanent.",
                    s.trim()
                ))
            })
    }
}

/// Resolved block window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedBlock {
    pub block_type: BlockType,
    /// `None` means the block never self-expires.
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Map a duration code to an absolute expiry measured from `from`.
pub fn resolve(code: &str, from: DateTime<Utc>) -> Result<ResolvedBlock> {
    let block_type: BlockType = code.parse()?;
    Ok(ResolvedBlock {
        block_type,
        blocked_until: block_type.length().map(|d| from + d),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 23, 30, 0).unwrap()
    }

    #[test]
    fn timed_codes_add_exact_offsets() {
        let expect = [("24h", 24), ("48h", 48), ("week", 24 * 7)];
        for (code, hours) in expect {
            let r = resolve(code, t()).unwrap();
            assert_eq!(r.blocked_until.unwrap() - t(), Duration::hours(hours), "{code}");
            assert_eq!(r.block_type.code(), code);
        }
    }

    #[test]
    fn permanent_has_no_expiry() {
        let r = resolve("permanent", t()).unwrap();
        assert_eq!(r.block_type, BlockType::Permanent);
        assert_eq!(r.blocked_until, None);
    }

    #[test]
    fn codes_are_case_insensitive() {
        assert_eq!(resolve("WEEK", t()).unwrap().block_type, BlockType::Week);
    }

    #[test]
    fn unknown_codes_fail_without_fallback() {
        for bad in ["", "12h", "month", "1w"] {
            assert!(matches!(resolve(bad, t()), Err(Error::InvalidArgument(_))), "{bad}");
        }
    }
}
