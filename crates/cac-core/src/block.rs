//! Block status evaluation.
//!
//! Evaluation is pure. An expired timed block is reported as not blocked together with
//! `needs_clear`; the caller persists the cleared state explicitly (see
//! [`crate::accounts::AccountRepository::persist_clear_if_needed`]).

use chrono::{DateTime, Duration, Utc};

use crate::{duration::BlockType, model::BlockState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockVerdict {
    NotBlocked {
        /// The stored state still says blocked but has lapsed (or is malformed).
        needs_clear: bool,
    },
    Permanent {
        reason: Option<String>,
    },
    Timed {
        reason: Option<String>,
        expires_at: DateTime<Utc>,
        hours_remaining: i64,
    },
}

impl BlockVerdict {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, Self::NotBlocked { .. })
    }

    pub fn needs_clear(&self) -> bool {
        matches!(self, Self::NotBlocked { needs_clear: true })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Permanent { reason } | Self::Timed { reason, .. } => reason.as_deref(),
            Self::NotBlocked { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotBlocked { .. } => "not blocked".to_string(),
            Self::Permanent { .. } => "permanent block".to_string(),
            Self::Timed {
                hours_remaining, ..
            } => format!("blocked for {hours_remaining} more hours"),
        }
    }
}

/// Decide whether `state` is an enforceable block at `now`.
pub fn evaluate(state: &BlockState, now: DateTime<Utc>) -> BlockVerdict {
    if !state.is_blocked {
        return BlockVerdict::NotBlocked { needs_clear: false };
    }

    if state.block_type == Some(BlockType::Permanent) {
        return BlockVerdict::Permanent {
            reason: state.reason.clone(),
        };
    }

    match state.blocked_until {
        Some(until) if now < until => {
            BlockVerdict::Timed {
                reason: state.reason.clone(),
                expires_at: until,
                hours_remaining: ceil_hours(until - now),
            }
        }
        // Lapsed, or a timed block without an expiry.
        _ => BlockVerdict::NotBlocked { needs_clear: true },
    }
}

/// Whole hours rounded up, exact down to the nanosecond.
fn ceil_hours(remaining: Duration) -> i64 {
    let whole = remaining.num_hours();
    if remaining > Duration::hours(whole) {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    fn timed(block_type: BlockType) -> BlockState {
        BlockState {
            is_blocked: true,
            reason: Some("spam".to_string()),
            blocked_at: Some(t0()),
            blocked_until: block_type.length().map(|d| t0() + d),
            block_type: Some(block_type),
        }
    }

    #[test]
    fn cleared_state_is_not_blocked() {
        let v = evaluate(&BlockState::cleared(), t0());
        assert_eq!(v, BlockVerdict::NotBlocked { needs_clear: false });
    }

    #[test]
    fn permanent_never_expires() {
        let v = evaluate(&timed(BlockType::Permanent), t0() + Duration::days(3650));
        assert!(v.is_permanent());
        assert_eq!(v.reason(), Some("spam"));
        assert_eq!(v.message(), "permanent block");
    }

    #[test]
    fn hours_remaining_rounds_up() {
        let state = timed(BlockType::Hours24);

        let v = evaluate(&state, t0() + Duration::hours(1));
        let BlockVerdict::Timed {
            hours_remaining,
            expires_at,
            ..
        } = v.clone()
        else {
            panic!("expected timed block, got {v:?}");
        };
        assert_eq!(hours_remaining, 23);
        assert_eq!(expires_at, t0() + Duration::hours(24));
        assert_eq!(v.message(), "blocked for 23 more hours");

        let v = evaluate(&state, t0() + Duration::minutes(90));
        assert!(matches!(v, BlockVerdict::Timed { hours_remaining: 23, .. }));

        let v = evaluate(&state, t0() + Duration::minutes(30));
        assert!(matches!(v, BlockVerdict::Timed { hours_remaining: 24, .. }));
    }

    #[test]
    fn sub_second_remainders_count_as_a_full_hour() {
        let state = timed(BlockType::Hours24);
        let until = t0() + Duration::hours(24);

        let v = evaluate(&state, until - Duration::milliseconds(500));
        assert!(matches!(v, BlockVerdict::Timed { hours_remaining: 1, .. }));
        assert_eq!(v.message(), "blocked for 1 more hours");

        let v = evaluate(&state, until - Duration::hours(3) - Duration::nanoseconds(1));
        assert!(matches!(v, BlockVerdict::Timed { hours_remaining: 4, .. }));

        let v = evaluate(&state, until - Duration::hours(3));
        assert!(matches!(v, BlockVerdict::Timed { hours_remaining: 3, .. }));
    }

    #[test]
    fn lapsed_block_asks_for_clear() {
        let v = evaluate(&timed(BlockType::Hours24), t0() + Duration::hours(25));
        assert!(!v.is_blocked());
        assert!(v.needs_clear());
    }

    #[test]
    fn expiry_instant_itself_is_lapsed() {
        let v = evaluate(&timed(BlockType::Week), t0() + Duration::days(7));
        assert!(v.needs_clear());
    }

    #[test]
    fn evaluation_is_repeatable() {
        let state = timed(BlockType::Hours48);
        let now = t0() + Duration::hours(5);
        assert_eq!(evaluate(&state, now), evaluate(&state, now));
    }

    #[test]
    fn timed_block_without_expiry_is_treated_as_lapsed() {
        let mut state = timed(BlockType::Hours24);
        state.blocked_until = None;
        assert!(evaluate(&state, t0()).needs_clear());
    }
}
