//! Pointgate node: owns the storage environment and wires the ledger, code
//! book, concurrency governor and load monitor together.
//!
//! Command handlers hold a [`PointgateNode`] (or clones of its `Arc` parts)
//! and call straight into the ledger and code book. Verification requests go
//! through the [`VerificationGate`], which charges the account and holds a
//! governor permit for the duration of the external call.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;

pub use config::{GovernorConfig, NodeConfig};
pub use dispatch::{CallResult, DispatchOutcome, VerificationGate};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::PointgateNode;
pub use shutdown::ShutdownController;
