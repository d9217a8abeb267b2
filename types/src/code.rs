//! Redeemable codes and their usage history.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Points, Timestamp, UserId};

/// A shared secret string exchangeable for a fixed point credit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemableCode {
    pub code: String,
    /// Points credited per redemption.
    pub value: Points,
    pub max_uses: u32,
    /// Never exceeds `max_uses`, never decremented.
    pub current_uses: u32,
    pub expires_at: Option<Timestamp>,
    pub created_by: UserId,
    pub created_at: Timestamp,
}

impl RedeemableCode {
    /// Expired strictly after `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_uses >= self.max_uses
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.current_uses)
    }
}

/// Append-only record of one user redeeming one code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUsage {
    pub code: String,
    pub user: UserId,
    pub used_at: Timestamp,
}

/// Result of a redemption attempt.
///
/// Every variant except `Credited` leaves the ledger untouched. These are
/// routine outcomes, not faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionOutcome {
    /// The user was credited this many points.
    Credited(Points),
    NotFound,
    Expired,
    ExhaustedUses,
    AlreadyUsedByUser,
}

impl RedemptionOutcome {
    pub fn is_credited(&self) -> bool {
        matches!(self, Self::Credited(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credited(_) => "credited",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::ExhaustedUses => "exhausted",
            Self::AlreadyUsedByUser => "already_used",
        }
    }
}

impl fmt::Display for RedemptionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credited(points) => write!(f, "credited {points}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(max_uses: u32, current_uses: u32, expires_at: Option<u64>) -> RedeemableCode {
        RedeemableCode {
            code: "vip100".into(),
            value: 50,
            max_uses,
            current_uses,
            expires_at: expires_at.map(Timestamp::new),
            created_by: UserId::new(1),
            created_at: Timestamp::EPOCH,
        }
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let c = code(1, 0, Some(100));
        assert!(!c.is_expired(Timestamp::new(100)));
        assert!(c.is_expired(Timestamp::new(101)));
    }

    #[test]
    fn no_deadline_never_expires() {
        assert!(!code(1, 0, None).is_expired(Timestamp::new(u64::MAX)));
    }

    #[test]
    fn exhausted_at_cap() {
        assert!(!code(10, 9, None).is_exhausted());
        assert!(code(10, 10, None).is_exhausted());
        assert_eq!(code(10, 4, None).remaining_uses(), 6);
    }
}
