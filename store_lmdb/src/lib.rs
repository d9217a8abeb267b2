//! LMDB storage backend for the pointgate ledger.
//!
//! Implements the storage traits from `pointgate-store` using the `heed` LMDB
//! bindings. Every mutating trait method runs in exactly one LMDB write
//! transaction; returning early without `commit` aborts it, so no failed
//! operation leaves a partial write behind.

pub mod account;
pub mod code;
pub mod environment;
pub mod error;
pub mod meta;
pub mod migration;
pub mod verification;

pub use account::LmdbAccountStore;
pub use code::LmdbCodeStore;
pub use environment::{LmdbEnvironment, DEFAULT_MAP_SIZE, MAX_DBS};
pub use error::LmdbError;
pub use meta::LmdbMetaStore;
pub use verification::LmdbVerificationLog;
