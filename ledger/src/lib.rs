//! Points ledger.
//!
//! Accounts earn points on registration, referral, daily check-in and code
//! redemption, and spend them on verification. Each mutation is a single
//! atomic store call, so balances stay consistent across threads and across
//! processes sharing one database.

pub mod codes;
pub mod error;
pub mod ledger;

pub use codes::{CodeBook, NewCode, MAX_CODE_LEN};
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerSummary, Profile};
