//! LMDB environment setup.
//!
//! One environment holds every table. LMDB admits a single write transaction
//! at a time across all threads and processes sharing the environment, which
//! is what makes each store mutation a serializable read-check-write.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::account::LmdbAccountStore;
use crate::code::LmdbCodeStore;
use crate::meta::LmdbMetaStore;
use crate::migration::Migrator;
use crate::verification::LmdbVerificationLog;
use crate::LmdbError;

/// Number of named databases created by [`LmdbEnvironment::open`].
pub const MAX_DBS: u32 = 8;

/// Default LMDB map size (1 GiB).
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    pub(crate) accounts_db: Database<Bytes, Bytes>,
    pub(crate) referrals_db: Database<Bytes, Bytes>,
    pub(crate) referrals_by_referrer_db: Database<Bytes, Bytes>,
    pub(crate) codes_db: Database<Bytes, Bytes>,
    pub(crate) code_usage_db: Database<Bytes, Bytes>,
    pub(crate) verifications_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path and bring its
    /// schema up to date.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path).map_err(|e| LmdbError::Heed(e.to_string()))?;

        // SAFETY: the environment is opened once per path by this process and
        // the data file is never truncated or modified outside LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs.max(MAX_DBS))
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let accounts_db = env.create_database(&mut wtxn, Some("accounts"))?;
        let referrals_db = env.create_database(&mut wtxn, Some("referrals"))?;
        let referrals_by_referrer_db =
            env.create_database(&mut wtxn, Some("referrals_by_referrer"))?;
        let codes_db = env.create_database(&mut wtxn, Some("codes"))?;
        let code_usage_db = env.create_database(&mut wtxn, Some("code_usage"))?;
        let verifications_db = env.create_database(&mut wtxn, Some("verifications"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        let environment = Self {
            env: Arc::new(env),
            accounts_db,
            referrals_db,
            referrals_by_referrer_db,
            codes_db,
            code_usage_db,
            verifications_db,
            meta_db,
        };

        Migrator::run(&environment.meta_store())?;
        tracing::info!(path = %path.display(), map_size, "LMDB environment opened");
        Ok(environment)
    }

    pub(crate) fn env(&self) -> &Env {
        &self.env
    }

    pub fn account_store(&self) -> LmdbAccountStore {
        LmdbAccountStore {
            env: Arc::clone(&self.env),
            accounts_db: self.accounts_db,
            referrals_db: self.referrals_db,
            referrals_by_referrer_db: self.referrals_by_referrer_db,
        }
    }

    pub fn code_store(&self) -> LmdbCodeStore {
        LmdbCodeStore {
            env: Arc::clone(&self.env),
            codes_db: self.codes_db,
            code_usage_db: self.code_usage_db,
            accounts_db: self.accounts_db,
        }
    }

    pub fn verification_log(&self) -> LmdbVerificationLog {
        LmdbVerificationLog {
            env: Arc::clone(&self.env),
            verifications_db: self.verifications_db,
            meta_db: self.meta_db,
        }
    }

    pub fn meta_store(&self) -> LmdbMetaStore {
        LmdbMetaStore {
            env: Arc::clone(&self.env),
            meta_db: self.meta_db,
        }
    }

    /// Flush dirty pages to disk.
    pub fn force_sync(&self) -> Result<(), LmdbError> {
        self.env().force_sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointgate_store::MetaStore;

    #[test]
    fn open_creates_directory_and_sets_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db");
        let env = LmdbEnvironment::open(&path, MAX_DBS, 1 << 20).unwrap();
        assert!(path.exists());
        assert_eq!(
            env.meta_store().get_schema_version().unwrap(),
            crate::migration::CURRENT_SCHEMA_VERSION
        );
        env.force_sync().unwrap();
    }
}
