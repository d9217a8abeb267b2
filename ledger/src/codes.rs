//! Redeemable codes.

use std::sync::Arc;

use pointgate_store::code::CodeStore;
use pointgate_types::{
    Clock, CodeUsage, Points, RedeemableCode, RedemptionOutcome, UserId,
};

use crate::LedgerError;

/// Longest accepted code string, in bytes.
pub const MAX_CODE_LEN: usize = 100;

fn mintable_len(code: &str) -> bool {
    !code.is_empty() && code.len() <= MAX_CODE_LEN
}

/// Parameters for minting a code.
#[derive(Clone, Debug)]
pub struct NewCode {
    pub code: String,
    pub value: Points,
    pub max_uses: u32,
    pub created_by: UserId,
    /// Days until expiry. `None` and `Some(0)` both mean the code never expires.
    pub expiry_days: Option<u32>,
}

impl NewCode {
    /// A single-use, non-expiring code.
    pub fn new(code: impl Into<String>, value: Points, created_by: UserId) -> Self {
        Self {
            code: code.into(),
            value,
            max_uses: 1,
            created_by,
            expiry_days: None,
        }
    }

    pub fn max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = max_uses;
        self
    }

    pub fn expires_in_days(mut self, days: u32) -> Self {
        self.expiry_days = Some(days);
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if !mintable_len(&self.code) {
            return Err(LedgerError::InvalidCode(format!(
                "code must be 1..={MAX_CODE_LEN} bytes"
            )));
        }
        if self.code.chars().any(char::is_whitespace) {
            return Err(LedgerError::InvalidCode("code must not contain whitespace".into()));
        }
        if self.value <= 0 {
            return Err(LedgerError::InvalidAmount(self.value));
        }
        if self.max_uses == 0 {
            return Err(LedgerError::InvalidCode("max uses must be at least 1".into()));
        }
        Ok(())
    }
}

/// Mints and redeems codes.
pub struct CodeBook {
    codes: Arc<dyn CodeStore + Send + Sync>,
    clock: Arc<dyn Clock>,
}

impl CodeBook {
    pub fn new(codes: Arc<dyn CodeStore + Send + Sync>, clock: Arc<dyn Clock>) -> Self {
        Self { codes, clock }
    }

    /// Mint a code. [`LedgerError::Conflict`] if the string is taken.
    pub fn create_code(&self, new: NewCode) -> Result<RedeemableCode, LedgerError> {
        new.validate()?;
        let now = self.clock.now();
        let expires_at = new.expiry_days.filter(|d| *d > 0).map(|d| now.plus_days(d));
        let code = RedeemableCode {
            code: new.code,
            value: new.value,
            max_uses: new.max_uses,
            current_uses: 0,
            expires_at,
            created_by: new.created_by,
            created_at: now,
        };
        self.codes
            .create_code(&code)
            .map_err(|e| LedgerError::from_store("create_code", &code.code, e))?;

        tracing::info!(
            code = %code.code,
            value = code.value,
            max_uses = code.max_uses,
            creator = %code.created_by,
            expires_at = ?code.expires_at.map(|t| t.as_secs()),
            "code created"
        );
        Ok(code)
    }

    /// Redeem `code` for `user`.
    ///
    /// Rejections are [`RedemptionOutcome`] values, not errors. A `user` with
    /// no account is [`LedgerError::NotFound`] and nothing is consumed.
    pub fn redeem(&self, code: &str, user: UserId) -> Result<RedemptionOutcome, LedgerError> {
        if !mintable_len(code) {
            tracing::debug!(len = code.len(), user = %user, "redemption of impossible code");
            return Ok(RedemptionOutcome::NotFound);
        }
        let outcome = self
            .codes
            .redeem(code, user, self.clock.now())
            .map_err(|e| LedgerError::from_store("redeem", code, e))?;
        match outcome {
            RedemptionOutcome::Credited(value) => {
                tracing::info!(code, user = %user, value, "code redeemed")
            }
            rejected => tracing::debug!(code, user = %user, outcome = %rejected, "redemption rejected"),
        }
        Ok(outcome)
    }

    pub fn get_code(&self, code: &str) -> Result<Option<RedeemableCode>, LedgerError> {
        if !mintable_len(code) {
            return Ok(None);
        }
        self.codes
            .get_code(code)
            .map_err(|e| LedgerError::from_store("get_code", code, e))
    }

    /// Codes newest first, optionally only those minted by `created_by`.
    pub fn list_codes(&self, created_by: Option<UserId>) -> Result<Vec<RedeemableCode>, LedgerError> {
        self.codes
            .list_codes(created_by)
            .map_err(|e| LedgerError::from_store("list_codes", "*", e))
    }

    pub fn usages(&self, code: &str) -> Result<Vec<CodeUsage>, LedgerError> {
        self.codes
            .usages(code)
            .map_err(|e| LedgerError::from_store("usages", code, e))
    }
}
