//! Account storage trait.
//!
//! Every mutating method is one atomic unit in the backend: the guard and the
//! write it protects are evaluated inside the same transaction. Callers never
//! read an account, decide, and then write it back.

use crate::StoreError;
use pointgate_types::{Account, Points, ReferralEdge, Timestamp, UserId};

/// Everything needed to register an account in one transaction.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub id: UserId,
    pub username: Option<String>,
    pub display_name: String,
    /// Referrer id as supplied by the caller. Ignored if it does not resolve
    /// to an existing account.
    pub referrer: Option<UserId>,
    pub opening_balance: Points,
    /// Credited to the referrer when the referral resolves.
    pub referral_reward: Points,
    pub created_at: Timestamp,
}

/// What [`AccountStore::create_account`] wrote.
#[derive(Clone, Debug)]
pub struct Registration {
    pub account: Account,
    /// Present iff the referrer resolved and was credited.
    pub referral: Option<ReferralEdge>,
}

/// Guard parameters for [`AccountStore::check_in`].
#[derive(Clone, Copy, Debug)]
pub struct CheckIn {
    pub now: Timestamp,
    pub utc_offset_secs: i32,
    pub reward: Points,
}

pub trait AccountStore {
    /// Insert a new account, resolving and crediting the referrer in the same
    /// transaction.
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    fn create_account(&self, new: &NewAccount) -> Result<Registration, StoreError>;

    fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError>;

    /// Returns [`StoreError::NotFound`] for unknown ids.
    fn set_blocked(&self, id: UserId, blocked: bool) -> Result<(), StoreError>;

    /// Add `amount` to the balance and return the new balance.
    fn credit(&self, id: UserId, amount: Points) -> Result<Points, StoreError>;

    /// Subtract `amount` iff the balance covers it. Returns the new balance,
    /// or `None` (and writes nothing) when funds are insufficient.
    fn debit_if_sufficient(&self, id: UserId, amount: Points) -> Result<Option<Points>, StoreError>;

    /// Credit the check-in reward and stamp `last_check_in` iff the previous
    /// check-in is on an earlier calendar day. Returns the new balance, or
    /// `None` when already checked in today.
    fn check_in(&self, id: UserId, check_in: CheckIn) -> Result<Option<Points>, StoreError>;

    fn blocked_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// All account ids in ascending order.
    fn account_ids(&self) -> Result<Vec<UserId>, StoreError>;

    fn account_count(&self) -> Result<u64, StoreError>;

    /// The edge recorded when `referee` registered, if any.
    fn referral_of(&self, referee: UserId) -> Result<Option<ReferralEdge>, StoreError>;

    /// Every edge whose referrer is `referrer`, in referee id order.
    fn referrals_by(&self, referrer: UserId) -> Result<Vec<ReferralEdge>, StoreError>;
}
