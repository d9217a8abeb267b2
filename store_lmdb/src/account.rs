//! LMDB implementation of AccountStore.
//!
//! Tables:
//! - `accounts_db`: `user_id_be(8)` → bincode [`Account`].
//! - `referrals_db`: `referee_be(8)` → bincode [`ReferralEdge`]. One edge per
//!   referee, written with `NO_OVERWRITE`.
//! - `referrals_by_referrer_db`: `referrer_be(8) ++ referee_be(8)` → empty.
//!   Prefix range-scan lists everyone a referrer invited.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, PutFlags, RoTxn, RwTxn};

use pointgate_store::account::{AccountStore, CheckIn, NewAccount, Registration};
use pointgate_store::StoreError;
use pointgate_types::{Account, Points, ReferralEdge, UserId};

use crate::LmdbError;

pub struct LmdbAccountStore {
    pub(crate) env: Arc<Env>,
    pub(crate) accounts_db: Database<Bytes, Bytes>,
    pub(crate) referrals_db: Database<Bytes, Bytes>,
    pub(crate) referrals_by_referrer_db: Database<Bytes, Bytes>,
}

fn referrer_index_key(referrer: UserId, referee: UserId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&referrer.to_be_bytes());
    key[8..].copy_from_slice(&referee.to_be_bytes());
    key
}

/// Read and decode one account inside an open transaction.
pub(crate) fn read_account(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn,
    id: UserId,
) -> Result<Option<Account>, LmdbError> {
    match db.get(txn, &id.to_be_bytes())? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn write_account(
    db: &Database<Bytes, Bytes>,
    txn: &mut RwTxn,
    account: &Account,
) -> Result<(), LmdbError> {
    let bytes = bincode::serialize(account)?;
    db.put(txn, &account.id.to_be_bytes(), &bytes)?;
    Ok(())
}

/// Add `amount` to an account's balance inside `txn`.
pub(crate) fn apply_credit(
    db: &Database<Bytes, Bytes>,
    txn: &mut RwTxn,
    id: UserId,
    amount: Points,
) -> Result<Points, LmdbError> {
    let mut account =
        read_account(db, txn, id)?.ok_or_else(|| LmdbError::NotFound(format!("account {id}")))?;
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| LmdbError::Overflow(format!("balance of account {id}")))?;
    write_account(db, txn, &account)?;
    Ok(account.balance)
}

impl AccountStore for LmdbAccountStore {
    fn create_account(&self, new: &NewAccount) -> Result<Registration, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        let referrer = match new.referrer {
            Some(referrer) if referrer != new.id => {
                read_account(&self.accounts_db, &wtxn, referrer)?.map(|_| referrer)
            }
            _ => None,
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
        let bytes = bincode::serialize(&account).map_err(LmdbError::from)?;
        // NO_OVERWRITE is the primary-key constraint: a racing registration of
        // the same id fails here with KeyExist.
        self.accounts_db
            .put_with_flags(&mut wtxn, PutFlags::NO_OVERWRITE, &new.id.to_be_bytes(), &bytes)
            .map_err(LmdbError::from)?;

        let referral = match referrer {
            Some(referrer) => {
                apply_credit(&self.accounts_db, &mut wtxn, referrer, new.referral_reward)?;
                let edge = ReferralEdge {
                    referrer,
                    referee: new.id,
                    created_at: new.created_at,
                };
                let edge_bytes = bincode::serialize(&edge).map_err(LmdbError::from)?;
                self.referrals_db
                    .put_with_flags(
                        &mut wtxn,
                        PutFlags::NO_OVERWRITE,
                        &new.id.to_be_bytes(),
                        &edge_bytes,
                    )
                    .map_err(LmdbError::from)?;
                self.referrals_by_referrer_db
                    .put(&mut wtxn, &referrer_index_key(referrer, new.id), &[])
                    .map_err(LmdbError::from)?;
                Some(edge)
            }
            None => None,
        };

        wtxn.commit().map_err(LmdbError::from)?;
        Ok(Registration { account, referral })
    }

    fn get_account(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(read_account(&self.accounts_db, &rtxn, id)?)
    }

    fn set_blocked(&self, id: UserId, blocked: bool) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut account = read_account(&self.accounts_db, &wtxn, id)?
            .ok_or_else(|| LmdbError::NotFound(format!("account {id}")))?;
        if account.blocked != blocked {
            account.blocked = blocked;
            write_account(&self.accounts_db, &mut wtxn, &account)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn credit(&self, id: UserId, amount: Points) -> Result<Points, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let balance = apply_credit(&self.accounts_db, &mut wtxn, id, amount)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(balance)
    }

    fn debit_if_sufficient(&self, id: UserId, amount: Points) -> Result<Option<Points>, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut account = read_account(&self.accounts_db, &wtxn, id)?
            .ok_or_else(|| LmdbError::NotFound(format!("account {id}")))?;
        if account.balance < amount {
            // Dropping the transaction aborts it; nothing was written.
            return Ok(None);
        }
        account.balance -= amount;
        write_account(&self.accounts_db, &mut wtxn, &account)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(Some(account.balance))
    }

    fn check_in(&self, id: UserId, check_in: CheckIn) -> Result<Option<Points>, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut account = read_account(&self.accounts_db, &wtxn, id)?
            .ok_or_else(|| LmdbError::NotFound(format!("account {id}")))?;
        if !account.can_check_in(check_in.now, check_in.utc_offset_secs) {
            return Ok(None);
        }
        account.balance = account
            .balance
            .checked_add(check_in.reward)
            .ok_or_else(|| LmdbError::Overflow(format!("balance of account {id}")))?;
        account.last_check_in = Some(check_in.now);
        write_account(&self.accounts_db, &mut wtxn, &account)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(Some(account.balance))
    }

    fn blocked_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut blocked = Vec::new();
        for entry in self.accounts_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            let account: Account = bincode::deserialize(val).map_err(LmdbError::from)?;
            if account.blocked {
                blocked.push(account);
            }
        }
        Ok(blocked)
    }

    fn account_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut ids = Vec::new();
        for entry in self.accounts_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, _val) = entry.map_err(LmdbError::from)?;
            let arr: [u8; 8] = key
                .try_into()
                .map_err(|_| LmdbError::Corruption("invalid account key length".into()))?;
            ids.push(UserId::from_be_bytes(arr));
        }
        Ok(ids)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let count = self.accounts_db.len(&rtxn).map_err(LmdbError::from)?;
        Ok(count)
    }

    fn referral_of(&self, referee: UserId) -> Result<Option<ReferralEdge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .referrals_db
            .get(&rtxn, &referee.to_be_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn referrals_by(&self, referrer: UserId) -> Result<Vec<ReferralEdge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = referrer.to_be_bytes();
        let mut edges = Vec::new();
        for entry in self
            .referrals_by_referrer_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?
        {
            let (key, _) = entry.map_err(LmdbError::from)?;
            if key.len() != 16 {
                return Err(LmdbError::Corruption("invalid referral index key length".into()).into());
            }
            let edge_bytes = self
                .referrals_db
                .get(&rtxn, &key[8..])
                .map_err(LmdbError::from)?
                .ok_or_else(|| LmdbError::Corruption("referral index points at no edge".into()))?;
            edges.push(bincode::deserialize(edge_bytes).map_err(LmdbError::from)?);
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointgate_types::Timestamp;
    use std::sync::Barrier;

    fn open_test_env() -> (tempfile::TempDir, crate::LmdbEnvironment) {
        let dir = tempfile::tempdir().unwrap();
        let env = crate::LmdbEnvironment::open(dir.path(), crate::MAX_DBS, 1 << 22).unwrap();
        (dir, env)
    }

    fn new_account(id: u64, referrer: Option<u64>) -> NewAccount {
        NewAccount {
            id: UserId::new(id),
            username: None,
            display_name: format!("user {id}"),
            referrer: referrer.map(UserId::new),
            opening_balance: 1,
            referral_reward: 2,
            created_at: Timestamp::new(1_000),
        }
    }

    #[test]
    fn create_and_read_back() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();

        let reg = store.create_account(&new_account(1, None)).unwrap();
        assert_eq!(reg.account.balance, 1);
        assert!(reg.referral.is_none());

        let read = store.get_account(UserId::new(1)).unwrap().unwrap();
        assert_eq!(read, reg.account);
        assert_eq!(store.account_count().unwrap(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected_without_side_effects() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        store.create_account(&new_account(1, None)).unwrap();
        store.create_account(&new_account(2, None)).unwrap();

        let err = store.create_account(&new_account(2, Some(1))).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        // The referral credit in the failed transaction was rolled back.
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 1);
        assert!(store.referrals_by(UserId::new(1)).unwrap().is_empty());
    }

    #[test]
    fn referral_credits_referrer_and_records_edge() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        store.create_account(&new_account(1, None)).unwrap();

        let reg = store.create_account(&new_account(2, Some(1))).unwrap();
        assert_eq!(reg.account.referred_by, Some(UserId::new(1)));
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 3);

        let edge = store.referral_of(UserId::new(2)).unwrap().unwrap();
        assert_eq!(edge.referrer, UserId::new(1));
        assert_eq!(store.referrals_by(UserId::new(1)).unwrap(), vec![edge]);
    }

    #[test]
    fn unknown_referrer_creates_unreferred_account() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        let reg = store.create_account(&new_account(2, Some(99))).unwrap();
        assert_eq!(reg.account.referred_by, None);
        assert!(reg.referral.is_none());
        assert!(store.referral_of(UserId::new(2)).unwrap().is_none());
    }

    #[test]
    fn debit_guard_refuses_overdraft() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        store.create_account(&new_account(1, None)).unwrap();

        assert_eq!(store.debit_if_sufficient(UserId::new(1), 1).unwrap(), Some(0));
        assert_eq!(store.debit_if_sufficient(UserId::new(1), 1).unwrap(), None);
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 0);
    }

    #[test]
    fn mutations_on_unknown_account_are_not_found() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        let id = UserId::new(5);
        assert!(matches!(store.credit(id, 1), Err(StoreError::NotFound(_))));
        assert!(matches!(store.debit_if_sufficient(id, 1), Err(StoreError::NotFound(_))));
        assert!(matches!(store.set_blocked(id, true), Err(StoreError::NotFound(_))));
        let check_in = CheckIn { now: Timestamp::new(0), utc_offset_secs: 0, reward: 1 };
        assert!(matches!(store.check_in(id, check_in), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn check_in_once_per_day() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        store.create_account(&new_account(1, None)).unwrap();
        let at = |secs| CheckIn { now: Timestamp::new(secs), utc_offset_secs: 0, reward: 1 };

        assert_eq!(store.check_in(UserId::new(1), at(86_400 + 10)).unwrap(), Some(2));
        assert_eq!(store.check_in(UserId::new(1), at(86_400 + 500)).unwrap(), None);
        assert_eq!(store.check_in(UserId::new(1), at(2 * 86_400)).unwrap(), Some(3));
    }

    #[test]
    fn blocked_listing_and_ids() {
        let (_dir, env) = open_test_env();
        let store = env.account_store();
        for id in [3, 1, 2] {
            store.create_account(&new_account(id, None)).unwrap();
        }
        store.set_blocked(UserId::new(2), true).unwrap();

        let blocked = store.blocked_accounts().unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, UserId::new(2));
        assert_eq!(
            store.account_ids().unwrap(),
            vec![UserId::new(1), UserId::new(2), UserId::new(3)]
        );

        store.set_blocked(UserId::new(2), false).unwrap();
        assert!(store.blocked_accounts().unwrap().is_empty());
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let (_dir, env) = open_test_env();
        let store = Arc::new(env.account_store());
        store.create_account(&new_account(1, None)).unwrap();
        store.credit(UserId::new(1), 4).unwrap(); // balance 5

        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.debit_if_sufficient(UserId::new(1), 1).unwrap().is_some()
                })
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 5);
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 0);
    }

    #[test]
    fn concurrent_check_ins_credit_once() {
        let (_dir, env) = open_test_env();
        let store = Arc::new(env.account_store());
        store.create_account(&new_account(1, None)).unwrap();

        let barrier = Arc::new(Barrier::new(12));
        let handles: Vec<_> = (0..12)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let check_in = CheckIn {
                        now: Timestamp::new(86_400 + i),
                        utc_offset_secs: 0,
                        reward: 1,
                    };
                    store.check_in(UserId::new(1), check_in).unwrap().is_some()
                })
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(store.get_account(UserId::new(1)).unwrap().unwrap().balance, 2);
    }
}
