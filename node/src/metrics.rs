//! Prometheus metrics for the pointgate node.
//!
//! Covers verification dispatch, ledger size and governor pool occupancy.
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that can be
//! encoded into the Prometheus text exposition format.

use std::collections::BTreeMap;

use prometheus::{
    register_gauge_with_registry, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, Gauge, HistogramOpts, HistogramVec,
    IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use pointgate_governor::PoolStats;

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Dispatch attempts by category and outcome
    /// (`completed`, `unknown_account`, `blocked`, `insufficient_funds`).
    pub dispatches: IntCounterVec,
    /// Completed verifications by category and status (`succeeded`, `failed`).
    pub verifications: IntCounterVec,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Current number of registered accounts.
    pub account_count: IntGauge,
    /// Current number of blocked accounts.
    pub blocked_count: IntGauge,
    /// Pool limit per category.
    pub pool_limit: IntGaugeVec,
    /// Permits held per category.
    pub pool_in_use: IntGaugeVec,
    /// Multiplier applied by the most recent resize.
    pub governor_multiplier: Gauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time a verification call held its permit, in milliseconds.
    pub verification_time_ms: HistogramVec,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let dispatches = register_int_counter_vec_with_registry!(
            Opts::new(
                "pointgate_dispatches_total",
                "Verification dispatch attempts by outcome"
            ),
            &["category", "outcome"],
            registry
        )?;

        let verifications = register_int_counter_vec_with_registry!(
            Opts::new(
                "pointgate_verifications_total",
                "Verification calls that ran, by status"
            ),
            &["category", "status"],
            registry
        )?;

        let account_count = register_int_gauge_with_registry!(
            Opts::new("pointgate_account_count", "Current number of accounts"),
            registry
        )?;

        let blocked_count = register_int_gauge_with_registry!(
            Opts::new("pointgate_blocked_count", "Current number of blocked accounts"),
            registry
        )?;

        let pool_limit = register_int_gauge_vec_with_registry!(
            Opts::new("pointgate_pool_limit", "Concurrency limit per category"),
            &["category"],
            registry
        )?;

        let pool_in_use = register_int_gauge_vec_with_registry!(
            Opts::new("pointgate_pool_in_use", "Permits held per category"),
            &["category"],
            registry
        )?;

        let governor_multiplier = register_gauge_with_registry!(
            Opts::new(
                "pointgate_governor_multiplier",
                "Load multiplier applied by the last resize"
            ),
            registry
        )?;

        // Exponential buckets covering 10 ms → ~160 s.
        let verification_time_ms = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "pointgate_verification_time_ms",
                "Verification call duration in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(10.0, 2.0, 15)?),
            &["category"],
            registry
        )?;

        Ok(Self {
            registry,
            dispatches,
            verifications,
            account_count,
            blocked_count,
            pool_limit,
            pool_in_use,
            governor_multiplier,
            verification_time_ms,
        })
    }

    /// Mirror a governor stats snapshot into the pool gauges.
    pub fn record_pools(&self, stats: &BTreeMap<String, PoolStats>, multiplier: f64) {
        for (category, pool) in stats {
            self.pool_limit
                .with_label_values(&[category.as_str()])
                .set(pool.limit as i64);
            self.pool_in_use
                .with_label_values(&[category.as_str()])
                .set(pool.in_use as i64);
        }
        self.governor_multiplier.set(multiplier);
    }

    /// Encode every metric in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_gauges_follow_stats() {
        let metrics = NodeMetrics::new().unwrap();
        let mut stats = BTreeMap::new();
        stats.insert(
            "spotify_student".to_string(),
            PoolStats {
                limit: 6,
                in_use: 2,
                available: 4,
            },
        );
        metrics.record_pools(&stats, 0.7);

        assert_eq!(
            metrics.pool_limit.with_label_values(&["spotify_student"]).get(),
            6
        );
        assert_eq!(
            metrics.pool_in_use.with_label_values(&["spotify_student"]).get(),
            2
        );
        assert!((metrics.governor_multiplier.get() - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn text_encoding_names_registered_metrics() {
        let metrics = NodeMetrics::new().unwrap();
        metrics
            .dispatches
            .with_label_values(&["bolt_teacher", "completed"])
            .inc();
        metrics.account_count.set(3);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("pointgate_dispatches_total"));
        assert!(text.contains("pointgate_account_count 3"));
    }
}
