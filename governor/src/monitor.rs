//! Background loop that rescales the governor from host load.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::governor::ConcurrencyGovernor;
use crate::host::{LoadProbe, LoadSample};

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Thresholds and multipliers for load-driven resizing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadPolicy {
    /// Shrink when CPU is above this percentage...
    pub high_cpu: f32,
    /// ...or memory is above this one.
    pub high_memory: f32,
    pub shrink: f64,
    /// Grow only when CPU is below this percentage and memory below the next.
    pub low_cpu: f32,
    pub low_memory: f32,
    pub grow: f64,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            high_cpu: 80.0,
            high_memory: 85.0,
            shrink: 0.7,
            low_cpu: 40.0,
            low_memory: 60.0,
            grow: 1.2,
        }
    }
}

impl LoadPolicy {
    /// Multiplier to apply for `sample`, or `None` to leave pools alone.
    pub fn multiplier_for(&self, sample: &LoadSample) -> Option<f64> {
        if sample.cpu_percent > self.high_cpu || sample.memory_percent > self.high_memory {
            Some(self.shrink)
        } else if sample.cpu_percent < self.low_cpu && sample.memory_percent < self.low_memory {
            Some(self.grow)
        } else {
            None
        }
    }
}

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct MonitorState {
    probe: Option<Box<dyn LoadProbe>>,
    started: bool,
    running: Option<Running>,
}

/// Periodically samples host load and resizes the governor.
///
/// Starts at most once. Stopping is cooperative: the loop only exits at a
/// sleep boundary, so a resize in progress always completes.
pub struct LoadMonitor {
    governor: Arc<ConcurrencyGovernor>,
    policy: LoadPolicy,
    state: Mutex<MonitorState>,
}

impl LoadMonitor {
    pub fn new(
        governor: Arc<ConcurrencyGovernor>,
        probe: Box<dyn LoadProbe>,
        policy: LoadPolicy,
    ) -> Self {
        Self {
            governor,
            policy,
            state: Mutex::new(MonitorState {
                probe: Some(probe),
                ..MonitorState::default()
            }),
        }
    }

    pub fn policy(&self) -> &LoadPolicy {
        &self.policy
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Returns `false` without doing anything if the monitor was already
    /// started, even if it has since been stopped.
    pub fn start(&self, interval: Duration) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.started {
            tracing::debug!("load monitor already started");
            return false;
        }
        let Some(probe) = state.probe.take() else {
            return false;
        };
        state.started = true;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.governor),
            probe,
            self.policy,
            interval,
            shutdown_rx,
        ));
        state.running = Some(Running {
            shutdown_tx,
            handle,
        });
        tracing::info!(interval_secs = interval.as_secs_f64(), "load monitor started");
        true
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(&self) {
        let running = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .take();
        let Some(Running {
            shutdown_tx,
            handle,
        }) = running
        else {
            return;
        };

        let _ = shutdown_tx.send(());
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "load monitor task ended abnormally");
        }
        tracing::info!("load monitor stopped");
    }
}

async fn run_loop(
    governor: Arc<ConcurrencyGovernor>,
    mut probe: Box<dyn LoadProbe>,
    policy: LoadPolicy,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let sample = match probe.sample() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, "load sample failed, skipping tick");
                continue;
            }
        };
        match policy.multiplier_for(&sample) {
            Some(multiplier) => {
                tracing::info!(
                    cpu = sample.cpu_percent,
                    memory = sample.memory_percent,
                    multiplier,
                    "host load crossed threshold"
                );
                if governor.resize(multiplier).is_none() {
                    break;
                }
            }
            None => tracing::debug!(
                cpu = sample.cpu_percent,
                memory = sample.memory_percent,
                "host load within bounds"
            ),
        }
    }
}
