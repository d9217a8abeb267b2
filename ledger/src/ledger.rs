//! Account ledger operations.
//!
//! Every mutation is delegated to a single atomic store call; this layer adds
//! reward parameters, the clock, input validation, error classification and
//! logging. It never reads an account and then writes a decision back.

use std::sync::Arc;

use pointgate_store::account::{AccountStore, CheckIn, NewAccount};
use pointgate_store::verification::VerificationLog;
use pointgate_types::{
    Account, Clock, Points, ReferralEdge, RewardParams, UserId, VerificationRecord,
};

use crate::LedgerError;

/// Names a user presents at registration.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    pub username: Option<String>,
    pub display_name: String,
}

impl Profile {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            username: None,
            display_name: display_name.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Summary statistics for the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerSummary {
    pub accounts: u64,
    pub blocked: u64,
}

/// The points ledger.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and may be called
/// from many threads at once.
pub struct Ledger {
    accounts: Arc<dyn AccountStore + Send + Sync>,
    verifications: Arc<dyn VerificationLog + Send + Sync>,
    clock: Arc<dyn Clock>,
    params: RewardParams,
}

impl Ledger {
    pub fn new(
        accounts: Arc<dyn AccountStore + Send + Sync>,
        verifications: Arc<dyn VerificationLog + Send + Sync>,
        clock: Arc<dyn Clock>,
        params: RewardParams,
    ) -> Self {
        Self {
            accounts,
            verifications,
            clock,
            params,
        }
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    /// Register `id` with the registration reward as opening balance.
    ///
    /// A `referrer` that resolves to an existing account is credited the
    /// invite reward and recorded as a referral edge in the same transaction.
    /// One that does not resolve is ignored and the account is created
    /// unreferred. Returns [`LedgerError::Conflict`] if `id` is registered.
    pub fn create_account(
        &self,
        id: UserId,
        profile: Profile,
        referrer: Option<UserId>,
    ) -> Result<Account, LedgerError> {
        let new = NewAccount {
            id,
            username: profile.username,
            display_name: profile.display_name,
            referrer,
            opening_balance: self.params.register_reward,
            referral_reward: self.params.invite_reward,
            created_at: self.clock.now(),
        };
        let registration = self
            .accounts
            .create_account(&new)
            .map_err(|e| LedgerError::from_store("create_account", id, e))?;

        match &registration.referral {
            Some(edge) => tracing::info!(
                user = %id,
                referrer = %edge.referrer,
                reward = self.params.invite_reward,
                "account registered with referral"
            ),
            None => {
                if let Some(requested) = referrer {
                    tracing::debug!(user = %id, referrer = %requested, "referrer did not resolve");
                }
                tracing::info!(user = %id, "account registered");
            }
        }
        Ok(registration.account)
    }

    pub fn get_account(&self, id: UserId) -> Result<Option<Account>, LedgerError> {
        self.accounts
            .get_account(id)
            .map_err(|e| LedgerError::from_store("get_account", id, e))
    }

    pub fn set_blocked(&self, id: UserId, blocked: bool) -> Result<(), LedgerError> {
        self.accounts
            .set_blocked(id, blocked)
            .map_err(|e| LedgerError::from_store("set_blocked", id, e))?;
        tracing::info!(user = %id, blocked, "account block flag set");
        Ok(())
    }

    /// Add `amount` to the balance and return the new balance.
    pub fn credit(&self, id: UserId, amount: Points) -> Result<Points, LedgerError> {
        let balance = self
            .accounts
            .credit(id, amount)
            .map_err(|e| LedgerError::from_store("credit", id, e))?;
        tracing::debug!(user = %id, amount, balance, "credited");
        Ok(balance)
    }

    /// Debit `amount` iff the balance covers it.
    ///
    /// `false` means insufficient funds and nothing changed.
    pub fn debit_if_sufficient(&self, id: UserId, amount: Points) -> Result<bool, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let debited = self
            .accounts
            .debit_if_sufficient(id, amount)
            .map_err(|e| LedgerError::from_store("debit_if_sufficient", id, e))?;
        match debited {
            Some(balance) => {
                tracing::debug!(user = %id, amount, balance, "debited");
                Ok(true)
            }
            None => {
                tracing::debug!(user = %id, amount, "debit refused, insufficient funds");
                Ok(false)
            }
        }
    }

    /// Credit the check-in reward once per calendar day.
    ///
    /// `false` means the account already checked in today.
    pub fn daily_check_in(&self, id: UserId) -> Result<bool, LedgerError> {
        let check_in = CheckIn {
            now: self.clock.now(),
            utc_offset_secs: self.params.utc_offset_secs,
            reward: self.params.checkin_reward,
        };
        let credited = self
            .accounts
            .check_in(id, check_in)
            .map_err(|e| LedgerError::from_store("daily_check_in", id, e))?;
        match credited {
            Some(balance) => {
                tracing::debug!(user = %id, balance, "checked in");
                Ok(true)
            }
            None => {
                tracing::debug!(user = %id, "already checked in today");
                Ok(false)
            }
        }
    }

    /// Advisory: whether a check-in now would succeed. The answer can be stale
    /// by the time the caller acts; [`Ledger::daily_check_in`] re-checks
    /// atomically.
    pub fn can_check_in(&self, id: UserId) -> Result<bool, LedgerError> {
        let account = self
            .get_account(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("account {id}")))?;
        Ok(account.can_check_in(self.clock.now(), self.params.utc_offset_secs))
    }

    pub fn blocked_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.accounts
            .blocked_accounts()
            .map_err(|e| LedgerError::from_store("blocked_accounts", "*", e))
    }

    pub fn account_ids(&self) -> Result<Vec<UserId>, LedgerError> {
        self.accounts
            .account_ids()
            .map_err(|e| LedgerError::from_store("account_ids", "*", e))
    }

    pub fn account_count(&self) -> Result<u64, LedgerError> {
        self.accounts
            .account_count()
            .map_err(|e| LedgerError::from_store("account_count", "*", e))
    }

    /// Everyone `referrer` invited.
    pub fn referrals(&self, referrer: UserId) -> Result<Vec<ReferralEdge>, LedgerError> {
        self.accounts
            .referrals_by(referrer)
            .map_err(|e| LedgerError::from_store("referrals", referrer, e))
    }

    pub fn referral_of(&self, referee: UserId) -> Result<Option<ReferralEdge>, LedgerError> {
        self.accounts
            .referral_of(referee)
            .map_err(|e| LedgerError::from_store("referral_of", referee, e))
    }

    pub fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        let accounts = self.account_count()?;
        let blocked = self.blocked_accounts()?.len() as u64;
        Ok(LedgerSummary { accounts, blocked })
    }

    /// Append a verification record to the audit log.
    pub fn record_verification(&self, record: &VerificationRecord) -> Result<u64, LedgerError> {
        self.verifications
            .append_verification(record)
            .map_err(|e| LedgerError::from_store("record_verification", record.user, e))
    }

    /// A user's verification history, newest first.
    pub fn verifications(&self, id: UserId) -> Result<Vec<VerificationRecord>, LedgerError> {
        self.verifications
            .verifications_for(id)
            .map_err(|e| LedgerError::from_store("verifications", id, e))
    }
}
