//! Nullable store — thread-safe in-memory storage for testing.
//!
//! All tables sit behind one mutex, so every trait method is a serializable
//! transaction just like an LMDB write transaction. Mutations are computed on
//! copies and only installed once every step has succeeded.

use pointgate_store::account::{AccountStore, CheckIn, NewAccount, Registration};
use pointgate_store::code::CodeStore;
use pointgate_store::verification::VerificationLog;
use pointgate_store::StoreError;
use pointgate_types::{
    Account, CodeUsage, Points, RedeemableCode, RedemptionOutcome, ReferralEdge, Timestamp,
    UserId, VerificationRecord,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<UserId, Account>,
    referrals: BTreeMap<UserId, ReferralEdge>,
    codes: HashMap<String, RedeemableCode>,
    usages: BTreeMap<(String, UserId), CodeUsage>,
    verifications: Vec<VerificationRecord>,
}

/// An in-memory ledger store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mutating call fail with a backend error, as if
    /// the database connection dropped. Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("null store mutex poisoned".into()))
    }

    fn writable(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        self.tables()
    }
}

fn account_mut(tables: &mut Tables, id: UserId) -> Result<&mut Account, StoreError> {
    tables
        .accounts
        .get_mut(&id)
        .ok_or_else(|| StoreError::NotFound(format!("account {id}")))
}

fn add(balance: Points, amount: Points, id: UserId) -> Result<Points, StoreError> {
    balance
        .checked_add(amount)
        .ok_or_else(|| StoreError::Overflow(format!("balance of account {id}")))
}

impl AccountStore for NullStore {
    fn create_account(&self, new: &NewAccount) -> Result<Registration, StoreError> {
        let mut tables = self.writable()?;
        if tables.accounts.contains_key(&new.id) {
            return Err(StoreError::Duplicate(format!("account {}", new.id)));
        }

        let referrer = new
            .referrer
            .filter(|r| *r != new.id && tables.accounts.contains_key(r));
        let credited_referrer = match referrer {
            Some(r) => {
                let current = tables.accounts[&r].balance;
                Some((r, add(current, new.referral_reward, r)?))
            }
            None => None,
        };

        let account = Account {
            id: new.id,
            username: new.username.clone(),
            display_name: new.display_name.clone(),
            balance: new.opening_balance,
            blocked: false,
            referred_by: referrer,
            created_at: new.created_at,
            last_check_in: None,
        };
        tables.accounts.insert(new.id, account.clone());

        let referral = credited_referrer.map(|(r, balance)| {
            if let Some(acc) = tables.accounts.get_mut(&r) {
                acc.balance = balance;
            }
            let edge = ReferralEdge {
                referrer: r,
                referee: new.id,
                created_at: new.created_at,
            };
            tables.referrals.insert(new.id, edge.clone());
            edge
        });

        Ok(Registration { account, referral })
    }

    fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables()?.accounts.get(&id).cloned())
    }

    fn set_blocked(&self, id: UserId, blocked: bool) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        account_mut(&mut tables, id)?.blocked = blocked;
        Ok(())
    }

    fn credit(&self, id: UserId, amount: Points) -> Result<Points, StoreError> {
        let mut tables = self.writable()?;
        let account = account_mut(&mut tables, id)?;
        account.balance = add(account.balance, amount, id)?;
        Ok(account.balance)
    }

    fn debit_if_sufficient(&self, id: UserId, amount: Points) -> Result<Option<Points>, StoreError> {
        let mut tables = self.writable()?;
        let account = account_mut(&mut tables, id)?;
        if account.balance < amount {
            return Ok(None);
        }
        account.balance -= amount;
        Ok(Some(account.balance))
    }

    fn check_in(&self, id: UserId, check_in: CheckIn) -> Result<Option<Points>, StoreError> {
        let mut tables = self.writable()?;
        let account = account_mut(&mut tables, id)?;
        if !account.can_check_in(check_in.now, check_in.utc_offset_secs) {
            return Ok(None);
        }
        account.balance = add(account.balance, check_in.reward, id)?;
        account.last_check_in = Some(check_in.now);
        Ok(Some(account.balance))
    }

    fn blocked_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .tables()?
            .accounts
            .values()
            .filter(|a| a.blocked)
            .cloned()
            .collect())
    }

    fn account_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.tables()?.accounts.keys().copied().collect())
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.tables()?.accounts.len() as u64)
    }

    fn referral_of(&self, referee: UserId) -> Result<Option<ReferralEdge>, StoreError> {
        Ok(self.tables()?.referrals.get(&referee).cloned())
    }

    fn referrals_by(&self, referrer: UserId) -> Result<Vec<ReferralEdge>, StoreError> {
        Ok(self
            .tables()?
            .referrals
            .values()
            .filter(|e| e.referrer == referrer)
            .cloned()
            .collect())
    }
}

impl CodeStore for NullStore {
    fn create_code(&self, code: &RedeemableCode) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        if tables.codes.contains_key(&code.code) {
            return Err(StoreError::Duplicate(format!("code {}", code.code)));
        }
        tables.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    fn get_code(&self, code: &str) -> Result<Option<RedeemableCode>, StoreError> {
        Ok(self.tables()?.codes.get(code).cloned())
    }

    fn list_codes(&self, created_by: Option<UserId>) -> Result<Vec<RedeemableCode>, StoreError> {
        let mut codes: Vec<_> = self
            .tables()?
            .codes
            .values()
            .filter(|c| created_by.map_or(true, |creator| c.created_by == creator))
            .cloned()
            .collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.code.cmp(&b.code)));
        Ok(codes)
    }

    fn redeem(
        &self,
        code: &str,
        user: UserId,
        now: Timestamp,
    ) -> Result<RedemptionOutcome, StoreError> {
        let mut tables = self.tables()?;

        let card = match tables.codes.get(code) {
            Some(card) => card.clone(),
            None => return Ok(RedemptionOutcome::NotFound),
        };
        if card.is_expired(now) {
            return Ok(RedemptionOutcome::Expired);
        }
        if card.is_exhausted() {
            return Ok(RedemptionOutcome::ExhaustedUses);
        }
        let usage_key = (code.to_string(), user);
        if tables.usages.contains_key(&usage_key) {
            return Ok(RedemptionOutcome::AlreadyUsedByUser);
        }

        // Every write below is staged first; nothing is installed unless all
        // of them can succeed.
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        let current = tables
            .accounts
            .get(&user)
            .ok_or_else(|| StoreError::NotFound(format!("account {user}")))?
            .balance;
        let new_balance = add(current, card.value, user)?;

        if let Some(stored) = tables.codes.get_mut(code) {
            stored.current_uses += 1;
        }
        tables.usages.insert(
            usage_key,
            CodeUsage {
                code: code.to_string(),
                user,
                used_at: now,
            },
        );
        account_mut(&mut tables, user)?.balance = new_balance;

        Ok(RedemptionOutcome::Credited(card.value))
    }

    fn usages(&self, code: &str) -> Result<Vec<CodeUsage>, StoreError> {
        Ok(self
            .tables()?
            .usages
            .values()
            .filter(|u| u.code == code)
            .cloned()
            .collect())
    }
}

impl VerificationLog for NullStore {
    fn append_verification(&self, record: &VerificationRecord) -> Result<u64, StoreError> {
        let mut tables = self.writable()?;
        tables.verifications.push(record.clone());
        Ok(tables.verifications.len() as u64)
    }

    fn verifications_for(&self, user: UserId) -> Result<Vec<VerificationRecord>, StoreError> {
        Ok(self
            .tables()?
            .verifications
            .iter()
            .rev()
            .filter(|r| r.user == user)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(id: u64, referrer: Option<u64>) -> NewAccount {
        NewAccount {
            id: UserId::new(id),
            username: None,
            display_name: format!("user {id}"),
            referrer: referrer.map(UserId::new),
            opening_balance: 1,
            referral_reward: 2,
            created_at: Timestamp::new(0),
        }
    }

    #[test]
    fn referral_is_applied_with_registration() {
        let store = NullStore::new();
        store.create_account(&new_account(1, None)).unwrap();
        let reg = store.create_account(&new_account(2, Some(1))).unwrap();
        assert!(reg.referral.is_some());
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 3);
        assert_eq!(store.referrals_by(UserId::new(1)).unwrap().len(), 1);
    }

    #[test]
    fn injected_failure_blocks_writes_but_not_reads() {
        let store = NullStore::new();
        store.create_account(&new_account(1, None)).unwrap();
        store.fail_writes(true);
        assert!(matches!(store.credit(UserId::new(1), 5), Err(StoreError::Backend(_))));
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 1);
        store.fail_writes(false);
        assert_eq!(store.credit(UserId::new(1), 5).unwrap(), 6);
    }

    #[test]
    fn failed_redemption_leaves_code_untouched() {
        let store = NullStore::new();
        store.create_account(&new_account(1, None)).unwrap();
        store
            .create_code(&RedeemableCode {
                code: "x".into(),
                value: 5,
                max_uses: 2,
                current_uses: 0,
                expires_at: None,
                created_by: UserId::new(1),
                created_at: Timestamp::new(0),
            })
            .unwrap();
        store.fail_writes(true);
        assert!(store.redeem("x", UserId::new(1), Timestamp::new(1)).is_err());
        store.fail_writes(false);
        assert_eq!(store.get_code("x").unwrap().unwrap().current_uses, 0);
        assert!(store.usages("x").unwrap().is_empty());
    }
}
