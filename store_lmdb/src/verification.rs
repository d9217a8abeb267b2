//! LMDB implementation of VerificationLog.
//!
//! Records are keyed `user_id_be(8) ++ seq_be(8)`, where `seq` is a global
//! counter kept in `meta_db` and bumped in the same write transaction as the
//! append. A prefix range-scan returns one user's records oldest first.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use pointgate_store::verification::VerificationLog;
use pointgate_store::StoreError;
use pointgate_types::{UserId, VerificationRecord};

use crate::LmdbError;

const SEQ_KEY: &[u8] = b"verification_seq";

pub struct LmdbVerificationLog {
    pub(crate) env: Arc<Env>,
    pub(crate) verifications_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl VerificationLog for LmdbVerificationLog {
    fn append_verification(&self, record: &VerificationRecord) -> Result<u64, StoreError> {
        let bytes = bincode::serialize(record).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        let seq = match self.meta_db.get(&wtxn, SEQ_KEY).map_err(LmdbError::from)? {
            Some(raw) => {
                let arr: [u8; 8] = raw
                    .try_into()
                    .map_err(|_| LmdbError::Corruption("invalid verification seq".into()))?;
                u64::from_be_bytes(arr) + 1
            }
            None => 1,
        };
        self.meta_db
            .put(&mut wtxn, SEQ_KEY, &seq.to_be_bytes())
            .map_err(LmdbError::from)?;

        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&record.user.to_be_bytes());
        key[8..].copy_from_slice(&seq.to_be_bytes());
        self.verifications_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;

        wtxn.commit().map_err(LmdbError::from)?;
        Ok(seq)
    }

    fn verifications_for(&self, user: UserId) -> Result<Vec<VerificationRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut records = Vec::new();
        for entry in self
            .verifications_db
            .prefix_iter(&rtxn, &user.to_be_bytes())
            .map_err(LmdbError::from)?
        {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            records.push(bincode::deserialize(val).map_err(LmdbError::from)?);
        }
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointgate_types::{Timestamp, VerificationStatus};

    fn record(user: u64, category: &str, at: u64) -> VerificationRecord {
        VerificationRecord {
            user: UserId::new(user),
            category: category.into(),
            source: "https://example.invalid/verify".into(),
            external_id: None,
            status: VerificationStatus::Succeeded,
            result: String::new(),
            created_at: Timestamp::new(at),
        }
    }

    #[test]
    fn records_are_listed_newest_first_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let env = crate::LmdbEnvironment::open(dir.path(), crate::MAX_DBS, 1 << 20).unwrap();
        let log = env.verification_log();

        assert_eq!(log.append_verification(&record(1, "a", 10)).unwrap(), 1);
        assert_eq!(log.append_verification(&record(2, "b", 11)).unwrap(), 2);
        assert_eq!(log.append_verification(&record(1, "c", 12)).unwrap(), 3);

        let categories: Vec<_> = log
            .verifications_for(UserId::new(1))
            .unwrap()
            .into_iter()
            .map(|r| r.category)
            .collect();
        assert_eq!(categories, vec!["c", "a"]);
        assert!(log.verifications_for(UserId::new(3)).unwrap().is_empty());
    }
}
