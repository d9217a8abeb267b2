//! Verification audit records.
//!
//! Written by whoever performs the external verification call; the ledger
//! only stores them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Timestamp, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub user: UserId,
    /// Verification category, e.g. `spotify_student`.
    pub category: String,
    /// Where the request came from (typically a URL the user submitted).
    pub source: String,
    /// Identifier assigned by the external service, if any.
    pub external_id: Option<String>,
    pub status: VerificationStatus,
    /// Opaque result payload from the external service.
    pub result: String,
    pub created_at: Timestamp,
}
