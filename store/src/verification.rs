//! Verification audit log trait.

use crate::StoreError;
use pointgate_types::{UserId, VerificationRecord};

/// Append-only sink for verification records.
pub trait VerificationLog {
    /// Append a record and return its sequence number.
    fn append_verification(&self, record: &VerificationRecord) -> Result<u64, StoreError>;

    /// All records for `user`, newest first.
    fn verifications_for(&self, user: UserId) -> Result<Vec<VerificationRecord>, StoreError>;
}
