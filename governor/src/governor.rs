//! Per-category concurrency limits for verification dispatch.
//!
//! Each category owns a pool: a semaphore plus an explicit in-use counter.
//! A [`ScopedPermit`] keeps an `Arc` to the pool it came from, so swapping
//! pools on resize never touches permits already handed out; they release
//! into the pool they came from when dropped.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::host::HostSnapshot;
use crate::GovernorError;

/// Base capacity when the host cannot be read.
pub const FALLBACK_BASE: usize = 20;
pub const MIN_BASE: usize = 10;
pub const MAX_BASE: usize = 100;

/// Bounds on a single pool after a resize.
pub const MIN_RESIZED_LIMIT: usize = 5;
pub const MAX_RESIZED_LIMIT: usize = 50;

pub const MIN_MULTIPLIER: f64 = 0.5;
pub const MAX_MULTIPLIER: f64 = 2.0;

/// Divisor for pools created lazily for unknown categories.
const LAZY_POOL_DIVISOR: usize = 3;

/// Verification categories configured out of the box.
pub const DEFAULT_CATEGORIES: [&str; 5] = [
    "gemini_one_pro",
    "chatgpt_teacher_k12",
    "spotify_student",
    "youtube_student",
    "bolt_teacher",
];

/// Total slots shared by the known categories.
///
/// `min(cpus * 4, floor(memory GiB * 2))`, clamped to `[10, 100]`.
pub fn base_capacity(host: Option<&HostSnapshot>) -> usize {
    match host {
        Some(host) => {
            let cpu_based = host.cpu_count.saturating_mul(4);
            let mem_based = (host.memory_gib() * 2.0).floor() as usize;
            cpu_based.min(mem_based).clamp(MIN_BASE, MAX_BASE)
        }
        None => FALLBACK_BASE,
    }
}

struct CategoryPool {
    limit: usize,
    semaphore: Arc<Semaphore>,
    in_use: AtomicUsize,
}

impl CategoryPool {
    fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            in_use: AtomicUsize::new(0),
        })
    }
}

/// A held concurrency slot. Released on drop, including when the owning task
/// is cancelled.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct ScopedPermit {
    category: String,
    pool: Arc<CategoryPool>,
    _permit: OwnedSemaphorePermit,
}

impl ScopedPermit {
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Limit of the pool this permit was taken from.
    pub fn pool_limit(&self) -> usize {
        self.pool.limit
    }
}

impl Drop for ScopedPermit {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ScopedPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedPermit")
            .field("category", &self.category)
            .field("pool_limit", &self.pool.limit)
            .finish()
    }
}

/// Point-in-time view of one pool. Advisory only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub limit: usize,
    pub in_use: usize,
    pub available: usize,
}

struct Pools {
    by_category: HashMap<String, Arc<CategoryPool>>,
    /// Semaphores replaced by a resize that may still have waiters queued.
    retired: Vec<Weak<Semaphore>>,
    multiplier: f64,
    closed: bool,
}

/// Bounds in-flight verifications per category.
pub struct ConcurrencyGovernor {
    base: usize,
    known: Vec<String>,
    pools: RwLock<Pools>,
}

impl ConcurrencyGovernor {
    /// Size pools for `categories` from the host snapshot.
    pub fn new<I, S>(categories: I, host: Option<&HostSnapshot>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_base(categories, base_capacity(host))
    }

    /// Size pools from an explicit base capacity.
    pub fn with_base<I, S>(categories: I, base: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: Vec<String> = categories.into_iter().map(Into::into).collect();
        known.sort();
        known.dedup();

        let per_category = base / known.len().max(1);
        if per_category == 0 && !known.is_empty() {
            tracing::warn!(
                base,
                categories = known.len(),
                "more categories than base capacity, pools have no slots until resized"
            );
        }
        let by_category = known
            .iter()
            .map(|c| (c.clone(), CategoryPool::new(per_category)))
            .collect();

        tracing::info!(
            base,
            categories = known.len(),
            per_category,
            "concurrency governor initialized"
        );
        Self {
            base,
            known,
            pools: RwLock::new(Pools {
                by_category,
                retired: Vec::new(),
                multiplier: 1.0,
                closed: false,
            }),
        }
    }

    /// Detect the host and size pools for the default categories.
    pub fn from_host() -> Self {
        let host = HostSnapshot::detect();
        if host.is_none() {
            tracing::warn!(base = FALLBACK_BASE, "host snapshot unavailable, using fallback base");
        }
        Self::new(DEFAULT_CATEGORIES, host.as_ref())
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn known_categories(&self) -> &[String] {
        &self.known
    }

    /// Multiplier applied by the most recent resize (1.0 initially).
    pub fn multiplier(&self) -> f64 {
        self.read().multiplier
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Pools> {
        self.pools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Pools> {
        self.pools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current pool for `category`, creating it if unknown.
    fn pool(&self, category: &str) -> Result<Arc<CategoryPool>, GovernorError> {
        {
            let pools = self.read();
            if pools.closed {
                return Err(GovernorError::Closed(category.to_string()));
            }
            if let Some(pool) = pools.by_category.get(category) {
                return Ok(Arc::clone(pool));
            }
        }

        let mut pools = self.write();
        if pools.closed {
            return Err(GovernorError::Closed(category.to_string()));
        }
        let limit = self.base / LAZY_POOL_DIVISOR;
        let pool = pools
            .by_category
            .entry(category.to_string())
            .or_insert_with(|| {
                tracing::info!(category, limit, "created pool for unknown category");
                CategoryPool::new(limit)
            });
        Ok(Arc::clone(pool))
    }

    /// Wait for a slot in `category`.
    ///
    /// Only the calling task waits. There is no timeout; wrap the call in one
    /// if bounded latency matters.
    pub async fn acquire(&self, category: &str) -> Result<ScopedPermit, GovernorError> {
        let pool = self.pool(category)?;
        let permit = Arc::clone(&pool.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GovernorError::Closed(category.to_string()))?;
        pool.in_use.fetch_add(1, Ordering::AcqRel);
        Ok(ScopedPermit {
            category: category.to_string(),
            pool,
            _permit: permit,
        })
    }

    /// Run `fut` while holding a slot in `category`.
    pub async fn run<F, T>(&self, category: &str, fut: F) -> Result<T, GovernorError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire(category).await?;
        Ok(fut.await)
    }

    /// Snapshot of every pool, keyed by category.
    pub fn stats(&self) -> BTreeMap<String, PoolStats> {
        self.read()
            .by_category
            .iter()
            .map(|(category, pool)| {
                let in_use = pool.in_use.load(Ordering::Acquire);
                let stats = PoolStats {
                    limit: pool.limit,
                    in_use,
                    available: pool.limit.saturating_sub(in_use),
                };
                (category.clone(), stats)
            })
            .collect()
    }

    /// Replace every pool with one sized for `multiplier`.
    ///
    /// The multiplier is clamped to `[0.5, 2.0]` and applied to the startup
    /// base, not to the current limits. Permits already held keep counting
    /// against the pool they were taken from. Returns the new per-pool limit,
    /// or `None` once the governor is shut down.
    pub fn resize(&self, multiplier: f64) -> Option<usize> {
        let multiplier = if multiplier.is_nan() {
            1.0
        } else {
            multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
        };
        let count = self.known.len().max(1) as f64;
        let limit = ((self.base as f64 * multiplier / count).floor() as usize)
            .clamp(MIN_RESIZED_LIMIT, MAX_RESIZED_LIMIT);

        let mut pools = self.write();
        if pools.closed {
            tracing::warn!(multiplier, "resize ignored, governor is shut down");
            return None;
        }
        let Pools {
            by_category,
            retired,
            ..
        } = &mut *pools;
        retired.retain(|sem| sem.strong_count() > 0);
        for pool in by_category.values_mut() {
            retired.push(Arc::downgrade(&pool.semaphore));
            *pool = CategoryPool::new(limit);
        }
        pools.multiplier = multiplier;
        tracing::info!(
            multiplier,
            limit,
            pools = pools.by_category.len(),
            "concurrency pools resized"
        );
        Some(limit)
    }

    /// Close every pool, including ones a resize replaced. Waiting and future
    /// acquires fail with [`GovernorError::Closed`]; held permits stay valid
    /// until dropped.
    pub fn shutdown(&self) {
        let mut pools = self.write();
        if pools.closed {
            return;
        }
        pools.closed = true;
        for pool in pools.by_category.values() {
            pool.semaphore.close();
        }
        for sem in pools.retired.drain(..).filter_map(|sem| sem.upgrade()) {
            sem.close();
        }
        tracing::info!("concurrency governor shut down");
    }
}
