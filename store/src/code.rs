//! Redeemable code storage trait.

use crate::StoreError;
use pointgate_types::{CodeUsage, RedeemableCode, RedemptionOutcome, Timestamp, UserId};

pub trait CodeStore {
    /// Returns [`StoreError::Duplicate`] if the code string already exists.
    fn create_code(&self, code: &RedeemableCode) -> Result<(), StoreError>;

    fn get_code(&self, code: &str) -> Result<Option<RedeemableCode>, StoreError>;

    /// Codes newest first, optionally only those created by `created_by`.
    fn list_codes(&self, created_by: Option<UserId>) -> Result<Vec<RedeemableCode>, StoreError>;

    /// Run the whole redemption in one transaction.
    ///
    /// Checks short-circuit in order: existence, expiry, remaining uses, prior
    /// use by `user`. Only when all pass are the use counter, the usage row
    /// and the user's balance written, together. A missing user account is
    /// [`StoreError::NotFound`] and nothing is written.
    fn redeem(
        &self,
        code: &str,
        user: UserId,
        now: Timestamp,
    ) -> Result<RedemptionOutcome, StoreError>;

    /// Usage rows for `code`, in user id order.
    fn usages(&self, code: &str) -> Result<Vec<CodeUsage>, StoreError>;
}
