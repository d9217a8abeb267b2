use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] pointgate_ledger::LedgerError),

    #[error("governor error: {0}")]
    Governor(#[from] pointgate_governor::GovernorError),

    #[error("store error: {0}")]
    Store(#[from] pointgate_store::StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
