//! Abstract storage traits for the pointgate ledger.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.

pub mod account;
pub mod code;
pub mod error;
pub mod meta;
pub mod verification;

pub use account::{AccountStore, CheckIn, NewAccount, Registration};
pub use code::CodeStore;
pub use error::StoreError;
pub use meta::MetaStore;
pub use verification::VerificationLog;

