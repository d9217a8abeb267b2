//! Fundamental types for the pointgate ledger.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: user ids, timestamps and calendar days, account, code and
//! verification records, and the reward parameters.

pub mod account;
pub mod code;
pub mod params;
pub mod time;
pub mod verification;

pub use account::{Account, Points, ReferralEdge, UserId};
pub use code::{CodeUsage, RedeemableCode, RedemptionOutcome};
pub use params::RewardParams;
pub use time::{CalendarDay, Clock, SystemClock, Timestamp};
pub use verification::{VerificationRecord, VerificationStatus};
