//! Reward and cost parameters.

use serde::{Deserialize, Serialize};

use crate::Points;

/// Point amounts credited and debited by ledger flows.
///
/// Loaded from the `[rewards]` section of the node config; every field has a
/// default so a partial section is fine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardParams {
    /// Opening balance of a freshly registered account.
    pub register_reward: Points,
    /// Credited to the referrer when an invited user registers.
    pub invite_reward: Points,
    /// Credited once per calendar day by the daily check-in.
    pub checkin_reward: Points,
    /// Debited for each verification dispatch.
    pub verify_cost: Points,
    /// Offset east of UTC, in seconds, that defines the check-in calendar day.
    pub utc_offset_secs: i32,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            register_reward: 1,
            invite_reward: 2,
            checkin_reward: 1,
            verify_cost: 1,
            utc_offset_secs: 0,
        }
    }
}
