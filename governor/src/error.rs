use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("governor closed, cannot acquire permit for category {0}")]
    Closed(String),

    #[error("host load probe failed: {0}")]
    Probe(String),
}
