//! Adaptive concurrency governor.
//!
//! Bounds in-flight verification calls per category. Pools are sized once
//! from the host and rescaled by a background [`LoadMonitor`] as load rises
//! and falls.

pub mod error;
pub mod governor;
pub mod host;
pub mod monitor;

pub use error::GovernorError;
pub use governor::{
    base_capacity, ConcurrencyGovernor, PoolStats, ScopedPermit, DEFAULT_CATEGORIES,
};
pub use host::{HostSnapshot, LoadProbe, LoadSample, SysinfoProbe};
pub use monitor::{LoadMonitor, LoadPolicy, DEFAULT_MONITOR_INTERVAL};
