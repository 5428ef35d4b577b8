//! Bounded executor pool.
//!
//! The `ExecutorPool` hands out permits for executor attempts. Every
//! attempt needs a general slot; `High`-tier attempts additionally need a
//! slot from a smaller high-tier lane so risky work does not pile up.

use crate::core::complexity::Tier;
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent executor attempts.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default number of concurrent `High`-tier attempts.
pub const DEFAULT_HIGH_TIER_CAP: usize = 1;

/// Slots held by one running attempt. Released on drop.
#[derive(Debug)]
pub struct PoolPermit {
    _general: OwnedSemaphorePermit,
    _high_tier: Option<OwnedSemaphorePermit>,
    tier: Tier,
}

impl PoolPermit {
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

/// Concurrency limiter for executor attempts.
///
/// # Example
///
/// ```
/// use taskwave::core::Tier;
/// use taskwave::orchestration::ExecutorPool;
///
/// let pool = ExecutorPool::new(2, 1).unwrap();
/// let a = pool.try_acquire(Tier::High).unwrap();
/// assert!(pool.try_acquire(Tier::High).is_none());
/// let b = pool.try_acquire(Tier::Low).unwrap();
/// assert!(!pool.has_capacity());
/// drop((a, b));
/// assert_eq!(pool.active_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorPool {
    general: Arc<Semaphore>,
    high_tier: Arc<Semaphore>,
    max_concurrency: usize,
    high_tier_cap: usize,
}

impl ExecutorPool {
    /// Create a pool with the given limits.
    ///
    /// # Errors
    /// Returns `Error::Validation` if either limit is zero.
    pub fn new(max_concurrency: usize, high_tier_cap: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(Error::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if high_tier_cap == 0 {
            return Err(Error::Validation(
                "high_tier_cap must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            general: Arc::new(Semaphore::new(max_concurrency)),
            high_tier: Arc::new(Semaphore::new(high_tier_cap)),
            max_concurrency,
            high_tier_cap,
        })
    }

    /// Try to reserve slots for an attempt of the given tier without waiting.
    pub fn try_acquire(&self, tier: Tier) -> Option<PoolPermit> {
        let high = if tier == Tier::High {
            Some(Arc::clone(&self.high_tier).try_acquire_owned().ok()?)
        } else {
            None
        };
        let general = Arc::clone(&self.general).try_acquire_owned().ok()?;
        Some(PoolPermit {
            _general: general,
            _high_tier: high,
            tier,
        })
    }

    /// Whether a slot of this tier is free right now.
    pub fn can_accept(&self, tier: Tier) -> bool {
        self.has_capacity() && (tier != Tier::High || self.high_tier.available_permits() > 0)
    }

    /// Number of attempts currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.max_concurrency - self.general.available_permits()
    }

    /// Number of `High`-tier attempts currently holding a slot.
    pub fn active_high_tier(&self) -> usize {
        self.high_tier_cap - self.high_tier.available_permits()
    }

    pub fn has_capacity(&self) -> bool {
        self.general.available_permits() > 0
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn high_tier_cap(&self) -> usize {
        self.high_tier_cap
    }
}

impl Default for ExecutorPool {
    fn default() -> Self {
        Self {
            general: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY)),
            high_tier: Arc::new(Semaphore::new(DEFAULT_HIGH_TIER_CAP)),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            high_tier_cap: DEFAULT_HIGH_TIER_CAP,
        }
    }
}
