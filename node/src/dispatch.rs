//! Gate in front of external verification calls.
//!
//! A dispatch charges the verification cost, waits for a slot in the
//! category's pool, runs the opaque call while holding the slot, and appends
//! the outcome to the verification log. The slot is released on every exit
//! path, including cancellation of the dispatching task. A charge is kept only
//! once a slot has been granted; a dispatch dropped while queued refunds it.
//!
//! Store calls run on the blocking pool so a contended LMDB write lock never
//! stalls the async workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use pointgate_governor::ConcurrencyGovernor;
use pointgate_ledger::{Ledger, LedgerError};
use pointgate_types::{Clock, Points, UserId, VerificationRecord, VerificationStatus};

use crate::metrics::NodeMetrics;
use crate::NodeError;

/// What the external verification call reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallResult {
    pub status: VerificationStatus,
    pub external_id: Option<String>,
    pub result: String,
}

impl CallResult {
    pub fn succeeded(result: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Succeeded,
            external_id: None,
            result: result.into(),
        }
    }

    pub fn failed(result: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Failed,
            external_id: None,
            result: result.into(),
        }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }
}

/// Result of a dispatch attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The call ran; the record is what was logged.
    Completed(VerificationRecord),
    UnknownAccount,
    Blocked,
    InsufficientFunds,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::UnknownAccount => "unknown_account",
            Self::Blocked => "blocked",
            Self::InsufficientFunds => "insufficient_funds",
        }
    }
}

/// Refunds a verification charge on drop unless the call was allowed to run.
struct PendingCharge {
    ledger: Arc<Ledger>,
    user: UserId,
    cost: Points,
    settled: bool,
}

impl PendingCharge {
    fn keep(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingCharge {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match self.ledger.credit(self.user, self.cost) {
            Ok(_) => tracing::debug!(user = %self.user, cost = self.cost, "verification charge refunded"),
            Err(e) => tracing::error!(
                user = %self.user,
                cost = self.cost,
                error = %e,
                "refund of verification charge failed"
            ),
        }
    }
}

pub struct VerificationGate {
    ledger: Arc<Ledger>,
    governor: Arc<ConcurrencyGovernor>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<NodeMetrics>>,
}

impl VerificationGate {
    pub fn new(
        ledger: Arc<Ledger>,
        governor: Arc<ConcurrencyGovernor>,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<NodeMetrics>>,
    ) -> Self {
        Self {
            ledger,
            governor,
            clock,
            metrics,
        }
    }

    /// Charge `user` and run `call` under the `category` pool.
    ///
    /// The charge is not refunded when the call reports failure. It is
    /// refunded if no slot is granted, either because the governor shut down
    /// or because the dispatch was dropped while queued.
    pub async fn dispatch<F, Fut>(
        &self,
        user: UserId,
        category: &str,
        source: &str,
        call: F,
    ) -> Result<DispatchOutcome, NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallResult>,
    {
        let outcome = self.dispatch_inner(user, category, source, call).await?;
        if let Some(metrics) = &self.metrics {
            metrics
                .dispatches
                .with_label_values(&[category, outcome.as_str()])
                .inc();
        }
        Ok(outcome)
    }

    async fn dispatch_inner<F, Fut>(
        &self,
        user: UserId,
        category: &str,
        source: &str,
        call: F,
    ) -> Result<DispatchOutcome, NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallResult>,
    {
        let Some(account) = self.with_ledger(move |l| l.get_account(user)).await? else {
            return Ok(DispatchOutcome::UnknownAccount);
        };
        if account.blocked {
            tracing::debug!(user = %user, category, "dispatch refused, account blocked");
            return Ok(DispatchOutcome::Blocked);
        }

        let cost = self.ledger.params().verify_cost;
        if !self
            .with_ledger(move |l| l.debit_if_sufficient(user, cost))
            .await?
        {
            return Ok(DispatchOutcome::InsufficientFunds);
        }
        let charge = PendingCharge {
            ledger: Arc::clone(&self.ledger),
            user,
            cost,
            settled: false,
        };

        let permit = self.governor.acquire(category).await?;
        charge.keep();

        let started = Instant::now();
        let reply = call().await;
        let elapsed = started.elapsed();
        drop(permit);

        let record = VerificationRecord {
            user,
            category: category.to_string(),
            source: source.to_string(),
            external_id: reply.external_id,
            status: reply.status,
            result: reply.result,
            created_at: self.clock.now(),
        };
        let logged = record.clone();
        if let Err(e) = self
            .with_ledger(move |l| l.record_verification(&logged))
            .await
        {
            tracing::error!(user = %user, category, error = %e, "verification ran but was not logged");
        }

        if let Some(metrics) = &self.metrics {
            let status = record.status.to_string();
            metrics
                .verifications
                .with_label_values(&[category, status.as_str()])
                .inc();
            metrics
                .verification_time_ms
                .with_label_values(&[category])
                .observe(elapsed.as_secs_f64() * 1000.0);
        }
        tracing::info!(
            user = %user,
            category,
            status = %record.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "verification completed"
        );
        Ok(DispatchOutcome::Completed(record))
    }

    async fn with_ledger<T, F>(&self, op: F) -> Result<T, NodeError>
    where
        F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || op(&ledger))
            .await
            .map_err(|e| NodeError::Other(format!("ledger task failed: {e}")))?
            .map_err(NodeError::from)
    }
}
