//! The main pointgate node struct: wires storage, ledger, codes and the
//! concurrency governor together.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use pointgate_governor::{
    ConcurrencyGovernor, HostSnapshot, LoadMonitor, LoadPolicy, SysinfoProbe,
};
use pointgate_ledger::{CodeBook, Ledger};
use pointgate_store::StoreError;
use pointgate_store_lmdb::{LmdbEnvironment, MAX_DBS};
use pointgate_types::{Clock, SystemClock};

use crate::config::NodeConfig;
use crate::dispatch::VerificationGate;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// How often the metrics task refreshes gauges.
const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// A running pointgate node.
pub struct PointgateNode {
    pub config: NodeConfig,
    pub ledger: Arc<Ledger>,
    pub codes: Arc<CodeBook>,
    pub governor: Arc<ConcurrencyGovernor>,
    pub gate: Arc<VerificationGate>,
    pub metrics: Option<Arc<NodeMetrics>>,
    pub shutdown: Arc<ShutdownController>,
    env: LmdbEnvironment,
    monitor: LoadMonitor,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl PointgateNode {
    /// Create a node with the system clock and the host load probe.
    ///
    /// Opens the LMDB environment at `config.data_dir`. Call
    /// [`PointgateNode::start`] to launch background tasks.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let governor = ConcurrencyGovernor::new(
            config.governor.categories.iter().cloned(),
            HostSnapshot::detect().as_ref(),
        );
        Self::with_parts(config, Arc::new(SystemClock), governor)
    }

    /// Create a node from an explicit clock and governor.
    pub fn with_parts(
        config: NodeConfig,
        clock: Arc<dyn Clock>,
        governor: ConcurrencyGovernor,
    ) -> Result<Self, NodeError> {
        let env = LmdbEnvironment::open(&config.data_dir, MAX_DBS, config.map_size)
            .map_err(StoreError::from)?;

        let accounts = Arc::new(env.account_store());
        let ledger = Arc::new(Ledger::new(
            accounts,
            Arc::new(env.verification_log()),
            Arc::clone(&clock),
            config.rewards.clone(),
        ));
        let codes = Arc::new(CodeBook::new(Arc::new(env.code_store()), Arc::clone(&clock)));

        let metrics = if config.enable_metrics {
            let metrics = NodeMetrics::new().map_err(|e| NodeError::Other(e.to_string()))?;
            Some(Arc::new(metrics))
        } else {
            None
        };

        let governor = Arc::new(governor);
        let monitor = LoadMonitor::new(
            Arc::clone(&governor),
            Box::new(SysinfoProbe::new()),
            LoadPolicy::default(),
        );
        let gate = Arc::new(VerificationGate::new(
            Arc::clone(&ledger),
            Arc::clone(&governor),
            clock,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            codes,
            governor,
            gate,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            env,
            monitor,
            task_handles: Vec::new(),
        })
    }

    /// Launch the load monitor and the metrics refresh task.
    pub fn start(&mut self) -> Result<(), NodeError> {
        let summary = self.ledger.summary()?;
        tracing::info!(
            data_dir = %self.config.data_dir.display(),
            accounts = summary.accounts,
            blocked = summary.blocked,
            base = self.governor.base(),
            "pointgate node starting"
        );

        if self.config.governor.enable_monitor {
            self.monitor.start(self.config.governor.monitor_interval());
        } else {
            tracing::info!("load monitor disabled");
        }

        if let Some(metrics) = &self.metrics {
            let metrics = Arc::clone(metrics);
            let ledger = Arc::clone(&self.ledger);
            let governor = Arc::clone(&self.governor);
            let mut shutdown_rx = self.shutdown.subscribe();

            let metrics_handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(METRICS_REFRESH_INTERVAL);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("metrics task shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            refresh_metrics(&metrics, &ledger, &governor);
                        }
                    }
                }
            });
            self.task_handles.push(metrics_handle);
        }
        Ok(())
    }

    /// Stop background tasks, close the governor and flush LMDB.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("pointgate node stopping");

        self.shutdown.shutdown();
        self.monitor.stop().await;
        self.governor.shutdown();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        if let Some(metrics) = &self.metrics {
            refresh_metrics(metrics, &self.ledger, &self.governor);
        }

        self.env.force_sync().map_err(StoreError::from)?;
        tracing::info!("LMDB flushed to disk");
        tracing::info!("pointgate node stopped");
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }
}

fn refresh_metrics(metrics: &NodeMetrics, ledger: &Ledger, governor: &ConcurrencyGovernor) {
    match ledger.summary() {
        Ok(summary) => {
            metrics.account_count.set(summary.accounts as i64);
            metrics.blocked_count.set(summary.blocked as i64);
        }
        Err(e) => tracing::warn!(error = %e, "failed to read ledger summary for metrics"),
    }
    metrics.record_pools(&governor.stats(), governor.multiplier());
}
