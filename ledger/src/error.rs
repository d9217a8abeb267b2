use std::fmt;

use pointgate_store::StoreError;
use pointgate_types::Points;
use thiserror::Error;

/// Faults and rejected inputs from ledger operations.
///
/// Routine business outcomes (insufficient funds, already checked in, code
/// exhausted) are not errors; they come back as `bool` or
/// [`RedemptionOutcome`](pointgate_types::RedemptionOutcome) values.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(Points),

    #[error("invalid code: {0}")]
    InvalidCode(String),

    /// A storage or connectivity fault. The transaction was rolled back and
    /// nothing was applied.
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl LedgerError {
    /// Classify a store error; genuine storage faults are logged here, once.
    pub(crate) fn from_store(op: &'static str, subject: impl fmt::Display, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            StoreError::Duplicate(what) => LedgerError::Conflict(what),
            other => {
                tracing::error!(op, subject = %subject, error = %other, "storage operation failed, rolled back");
                LedgerError::OperationFailed(other.to_string())
            }
        }
    }
}
