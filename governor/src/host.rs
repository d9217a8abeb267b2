//! Host resource readings.
//!
//! The governor sizes its pools once from a [`HostSnapshot`]; the load
//! monitor reads a [`LoadSample`] on every tick through a [`LoadProbe`].

use sysinfo::System;

use crate::GovernorError;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Static host capacity, read once at startup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HostSnapshot {
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
}

impl HostSnapshot {
    /// Read the host. `None` when the platform reports no memory figure.
    pub fn detect() -> Option<Self> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total_memory_bytes = sys.total_memory();
        if total_memory_bytes == 0 {
            return None;
        }
        Some(Self {
            cpu_count: num_cpus::get(),
            total_memory_bytes,
        })
    }

    pub fn memory_gib(&self) -> f64 {
        self.total_memory_bytes as f64 / BYTES_PER_GIB
    }
}

/// Instantaneous utilization, both as percentages in `0.0..=100.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Source of load samples for the monitor.
pub trait LoadProbe: Send {
    fn sample(&mut self) -> Result<LoadSample, GovernorError>;
}

/// Reads utilization from the running host via `sysinfo`.
pub struct SysinfoProbe {
    sys: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        // CPU usage is a delta between refreshes; prime the first one.
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self { sys }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProbe for SysinfoProbe {
    fn sample(&mut self) -> Result<LoadSample, GovernorError> {
        let sys = &mut self.sys;
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(GovernorError::Probe("host reports zero total memory".into()));
        }
        let memory_percent = (sys.used_memory() as f64 / total as f64 * 100.0) as f32;
        Ok(LoadSample {
            cpu_percent: sys.global_cpu_usage(),
            memory_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_gib_converts_bytes() {
        let snap = HostSnapshot {
            cpu_count: 4,
            total_memory_bytes: 8 * 1024 * 1024 * 1024,
        };
        assert!((snap.memory_gib() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sysinfo_probe_reports_percentages() {
        let mut probe = SysinfoProbe::new();
        let sample = probe.sample().unwrap();
        assert!((0.0..=100.0).contains(&sample.memory_percent));
        assert!(sample.cpu_percent >= 0.0);
    }
}
