//! LMDB implementation of CodeStore.
//!
//! Tables:
//! - `codes_db`: UTF-8 code string → bincode [`RedeemableCode`].
//! - `code_usage_db`: `code_len_be(4) ++ code ++ user_id_be(8)` → bincode
//!   [`CodeUsage`]. The length prefix keeps one code's rows from colliding
//!   with a longer code that shares its prefix. Written with `NO_OVERWRITE`,
//!   so the key doubles as the one-use-per-user constraint.
//!
//! Redemption touches `accounts_db` too, inside the same write transaction.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, MdbError, PutFlags};

use pointgate_store::code::CodeStore;
use pointgate_store::StoreError;
use pointgate_types::{CodeUsage, RedeemableCode, RedemptionOutcome, Timestamp, UserId};

use crate::account::apply_credit;
use crate::LmdbError;

pub struct LmdbCodeStore {
    pub(crate) env: Arc<Env>,
    pub(crate) codes_db: Database<Bytes, Bytes>,
    pub(crate) code_usage_db: Database<Bytes, Bytes>,
    pub(crate) accounts_db: Database<Bytes, Bytes>,
}

/// Largest key LMDB accepts with its default build settings.
const MAX_KEY_SIZE: usize = 511;

/// Whether `code` can be a `codes_db` key at all. LMDB rejects empty and
/// oversized keys with `MDB_BAD_VALSIZE`; such codes can never have been stored.
fn storable(code: &str) -> bool {
    !code.is_empty() && code.len() <= MAX_KEY_SIZE
}

fn usage_prefix(code: &str) -> Vec<u8> {
    let bytes = code.as_bytes();
    let mut key = Vec::with_capacity(4 + bytes.len() + 8);
    key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

fn usage_key(code: &str, user: UserId) -> Vec<u8> {
    let mut key = usage_prefix(code);
    key.extend_from_slice(&user.to_be_bytes());
    key
}

impl CodeStore for LmdbCodeStore {
    fn create_code(&self, code: &RedeemableCode) -> Result<(), StoreError> {
        let bytes = bincode::serialize(code).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        match self.codes_db.put_with_flags(
            &mut wtxn,
            PutFlags::NO_OVERWRITE,
            code.code.as_bytes(),
            &bytes,
        ) {
            Ok(()) => {}
            Err(heed::Error::Mdb(MdbError::KeyExist)) => {
                return Err(StoreError::Duplicate(format!("code {}", code.code)));
            }
            Err(e) => return Err(LmdbError::from(e).into()),
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_code(&self, code: &str) -> Result<Option<RedeemableCode>, StoreError> {
        if !storable(code) {
            return Ok(None);
        }
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .codes_db
            .get(&rtxn, code.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn list_codes(&self, created_by: Option<UserId>) -> Result<Vec<RedeemableCode>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut codes = Vec::new();
        for entry in self.codes_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            let code: RedeemableCode = bincode::deserialize(val).map_err(LmdbError::from)?;
            if created_by.map_or(true, |creator| code.created_by == creator) {
                codes.push(code);
            }
        }
        // Newest first; ties keep code order for a stable listing.
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.code.cmp(&b.code)));
        Ok(codes)
    }

    fn redeem(
        &self,
        code: &str,
        user: UserId,
        now: Timestamp,
    ) -> Result<RedemptionOutcome, StoreError> {
        if !storable(code) {
            return Ok(RedemptionOutcome::NotFound);
        }
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        let mut card: RedeemableCode = match self
            .codes_db
            .get(&wtxn, code.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => bincode::deserialize(bytes).map_err(LmdbError::from)?,
            None => return Ok(RedemptionOutcome::NotFound),
        };
        if card.is_expired(now) {
            return Ok(RedemptionOutcome::Expired);
        }
        if card.is_exhausted() {
            return Ok(RedemptionOutcome::ExhaustedUses);
        }
        let key = usage_key(code, user);
        if self
            .code_usage_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Ok(RedemptionOutcome::AlreadyUsedByUser);
        }

        card.current_uses += 1;
        let card_bytes = bincode::serialize(&card).map_err(LmdbError::from)?;
        self.codes_db
            .put(&mut wtxn, code.as_bytes(), &card_bytes)
            .map_err(LmdbError::from)?;

        let usage = CodeUsage {
            code: code.to_string(),
            user,
            used_at: now,
        };
        let usage_bytes = bincode::serialize(&usage).map_err(LmdbError::from)?;
        match self
            .code_usage_db
            .put_with_flags(&mut wtxn, PutFlags::NO_OVERWRITE, &key, &usage_bytes)
        {
            Ok(()) => {}
            Err(heed::Error::Mdb(MdbError::KeyExist)) => {
                return Ok(RedemptionOutcome::AlreadyUsedByUser);
            }
            Err(e) => return Err(LmdbError::from(e).into()),
        }

        apply_credit(&self.accounts_db, &mut wtxn, user, card.value)?;

        wtxn.commit().map_err(LmdbError::from)?;
        Ok(RedemptionOutcome::Credited(card.value))
    }

    fn usages(&self, code: &str) -> Result<Vec<CodeUsage>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = usage_prefix(code);
        let mut usages = Vec::new();
        for entry in self
            .code_usage_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?
        {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            usages.push(bincode::deserialize(val).map_err(LmdbError::from)?);
        }
        Ok(usages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointgate_store::account::{AccountStore, NewAccount};
    use std::sync::Barrier;

    fn open_test_env() -> (tempfile::TempDir, crate::LmdbEnvironment) {
        let dir = tempfile::tempdir().unwrap();
        let env = crate::LmdbEnvironment::open(dir.path(), crate::MAX_DBS, 1 << 22).unwrap();
        (dir, env)
    }

    fn register(env: &crate::LmdbEnvironment, id: u64) {
        env.account_store()
            .create_account(&NewAccount {
                id: UserId::new(id),
                username: None,
                display_name: format!("user {id}"),
                referrer: None,
                opening_balance: 0,
                referral_reward: 0,
                created_at: Timestamp::new(0),
            })
            .unwrap();
    }

    fn card(code: &str, value: i64, max_uses: u32, expires_at: Option<u64>) -> RedeemableCode {
        RedeemableCode {
            code: code.into(),
            value,
            max_uses,
            current_uses: 0,
            expires_at: expires_at.map(Timestamp::new),
            created_by: UserId::new(1),
            created_at: Timestamp::new(100),
        }
    }

    fn balance(env: &crate::LmdbEnvironment, id: u64) -> i64 {
        env.account_store().get_account(UserId::new(id)).unwrap().unwrap().balance
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let (_dir, env) = open_test_env();
        let store = env.code_store();
        store.create_code(&card("vip100", 50, 10, None)).unwrap();
        let err = store.create_code(&card("vip100", 5, 1, None)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.get_code("vip100").unwrap().unwrap().value, 50);
    }

    #[test]
    fn outcomes_follow_check_order() {
        let (_dir, env) = open_test_env();
        register(&env, 7);
        let store = env.code_store();
        store.create_code(&card("old", 5, 1, Some(50))).unwrap();
        store.create_code(&card("one", 5, 1, None)).unwrap();

        let now = Timestamp::new(200);
        assert_eq!(store.redeem("missing", UserId::new(7), now).unwrap(), RedemptionOutcome::NotFound);
        assert_eq!(store.redeem("old", UserId::new(7), now).unwrap(), RedemptionOutcome::Expired);
        assert_eq!(store.redeem("one", UserId::new(7), now).unwrap(), RedemptionOutcome::Credited(5));
        // Exhaustion is checked before prior use.
        assert_eq!(store.redeem("one", UserId::new(7), now).unwrap(), RedemptionOutcome::ExhaustedUses);
        assert_eq!(balance(&env, 7), 5);
    }

    #[test]
    fn unstorable_codes_are_not_found() {
        let (_dir, env) = open_test_env();
        register(&env, 7);
        let store = env.code_store();
        let long = "x".repeat(MAX_KEY_SIZE + 89);

        for code in ["", long.as_str()] {
            assert_eq!(
                store.redeem(code, UserId::new(7), Timestamp::new(200)).unwrap(),
                RedemptionOutcome::NotFound
            );
            assert!(store.get_code(code).unwrap().is_none());
            assert!(store.usages(code).unwrap().is_empty());
        }
        assert_eq!(balance(&env, 7), 0);
    }

    #[test]
    fn same_user_cannot_redeem_twice() {
        let (_dir, env) = open_test_env();
        register(&env, 7);
        let store = env.code_store();
        store.create_code(&card("multi", 3, 5, None)).unwrap();

        let now = Timestamp::new(200);
        assert_eq!(store.redeem("multi", UserId::new(7), now).unwrap(), RedemptionOutcome::Credited(3));
        assert_eq!(
            store.redeem("multi", UserId::new(7), now).unwrap(),
            RedemptionOutcome::AlreadyUsedByUser
        );
        assert_eq!(store.get_code("multi").unwrap().unwrap().current_uses, 1);
        assert_eq!(store.usages("multi").unwrap().len(), 1);
        assert_eq!(balance(&env, 7), 3);
    }

    #[test]
    fn missing_user_rolls_back_everything() {
        let (_dir, env) = open_test_env();
        let store = env.code_store();
        store.create_code(&card("ghost", 3, 5, None)).unwrap();

        let err = store.redeem("ghost", UserId::new(404), Timestamp::new(200)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.get_code("ghost").unwrap().unwrap().current_uses, 0);
        assert!(store.usages("ghost").unwrap().is_empty());
    }

    #[test]
    fn usage_rows_do_not_leak_across_prefixed_codes() {
        let (_dir, env) = open_test_env();
        register(&env, 7);
        let store = env.code_store();
        store.create_code(&card("ab", 1, 5, None)).unwrap();
        store.create_code(&card("abc", 1, 5, None)).unwrap();

        store.redeem("abc", UserId::new(7), Timestamp::new(200)).unwrap();
        assert!(store.usages("ab").unwrap().is_empty());
        assert_eq!(store.usages("abc").unwrap().len(), 1);
        assert_eq!(
            store.redeem("ab", UserId::new(7), Timestamp::new(200)).unwrap(),
            RedemptionOutcome::Credited(1)
        );
    }

    #[test]
    fn list_codes_newest_first_with_creator_filter() {
        let (_dir, env) = open_test_env();
        let store = env.code_store();
        let mut a = card("a", 1, 1, None);
        a.created_at = Timestamp::new(10);
        let mut b = card("b", 1, 1, None);
        b.created_at = Timestamp::new(30);
        b.created_by = UserId::new(2);
        let mut c = card("c", 1, 1, None);
        c.created_at = Timestamp::new(20);
        for code in [&a, &b, &c] {
            store.create_code(code).unwrap();
        }

        let all: Vec<_> = store.list_codes(None).unwrap().into_iter().map(|c| c.code).collect();
        assert_eq!(all, vec!["b", "c", "a"]);
        let mine: Vec<_> = store
            .list_codes(Some(UserId::new(1)))
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(mine, vec!["c", "a"]);
    }

    #[test]
    fn single_use_code_races_to_one_winner() {
        let (_dir, env) = open_test_env();
        register(&env, 1);
        register(&env, 2);
        env.code_store().create_code(&card("solo", 10, 1, None)).unwrap();

        let store = Arc::new(env.code_store());
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [1u64, 2]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.redeem("solo", UserId::new(id), Timestamp::new(200)).unwrap()
                })
            })
            .collect();
        let mut outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        outcomes.sort_by_key(|o| o.as_str());

        assert_eq!(
            outcomes,
            vec![RedemptionOutcome::Credited(10), RedemptionOutcome::ExhaustedUses]
        );
        assert_eq!(balance(&env, 1) + balance(&env, 2), 10);
    }
}
