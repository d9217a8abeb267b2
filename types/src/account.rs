//! Accounts and referral edges.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Timestamp;

/// Point balances and point deltas.
pub type Points = i64;

/// Opaque numeric user identity, as handed to us by the messaging platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian key bytes, so LMDB iteration follows numeric order.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// A registered user's ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    /// Platform handle, if the user has one.
    pub username: Option<String>,
    pub display_name: String,
    /// Never negative: only the debit guard subtracts, and it refuses to
    /// overdraw.
    pub balance: Points,
    pub blocked: bool,
    /// Set once at registration, never rewritten.
    pub referred_by: Option<UserId>,
    pub created_at: Timestamp,
    /// Time of the last successful daily check-in. Only moves forward.
    pub last_check_in: Option<Timestamp>,
}

impl Account {
    /// Whether a check-in at `now` lands on a later calendar day than the
    /// last one.
    pub fn can_check_in(&self, now: Timestamp, utc_offset_secs: i32) -> bool {
        match self.last_check_in {
            None => true,
            Some(last) => last.calendar_day(utc_offset_secs) < now.calendar_day(utc_offset_secs),
        }
    }
}

/// Append-only fact: `referee` registered through `referrer`'s invite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub referrer: UserId,
    pub referee: UserId,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SECS_PER_DAY;

    fn account(last_check_in: Option<u64>) -> Account {
        Account {
            id: UserId::new(7),
            username: None,
            display_name: "seven".into(),
            balance: 1,
            blocked: false,
            referred_by: None,
            created_at: Timestamp::EPOCH,
            last_check_in: last_check_in.map(Timestamp::new),
        }
    }

    #[test]
    fn never_checked_in_can_check_in() {
        assert!(account(None).can_check_in(Timestamp::new(5), 0));
    }

    #[test]
    fn same_day_is_refused() {
        let acc = account(Some(3 * SECS_PER_DAY + 10));
        assert!(!acc.can_check_in(Timestamp::new(3 * SECS_PER_DAY + 5000), 0));
    }

    #[test]
    fn next_day_is_allowed() {
        let acc = account(Some(3 * SECS_PER_DAY + 10));
        assert!(acc.can_check_in(Timestamp::new(4 * SECS_PER_DAY), 0));
    }

    #[test]
    fn clock_moving_backwards_is_refused() {
        let acc = account(Some(9 * SECS_PER_DAY));
        assert!(!acc.can_check_in(Timestamp::new(2 * SECS_PER_DAY), 0));
    }

    #[test]
    fn user_id_key_bytes_sort_numerically() {
        let a = UserId::new(255).to_be_bytes();
        let b = UserId::new(256).to_be_bytes();
        assert!(a < b);
        assert_eq!(UserId::from_be_bytes(b), UserId::new(256));
    }
}
