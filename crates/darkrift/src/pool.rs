//! Generic bounded object pool
//!
//! [`ObjectPool`] keeps up to `capacity` idle instances of a type so hot paths
//! can reuse them instead of allocating. Acquiring from an empty pool falls
//! back to a factory and returning to a full pool drops the instance, so
//! neither operation ever fails or blocks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use serde::Serialize;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A thread-safe, fixed-capacity pool of reusable instances.
///
/// The idle instances live in a lock-free bounded queue, so any number of
/// threads may acquire and return concurrently. An instance popped by one
/// caller can never be observed by another.
///
/// # Examples
///
/// ```rust
/// use darkrift::ObjectPool;
///
/// let pool = ObjectPool::new(2, || Vec::<u8>::with_capacity(64));
/// let buffer = pool.get_instance();
/// assert!(pool.return_instance(buffer));
/// assert_eq!(pool.len(), 1);
/// ```
pub struct ObjectPool<T> {
    // `ArrayQueue` rejects a capacity of zero, so a zero-capacity pool has no store.
    store: Option<ArrayQueue<T>>,
    factory: Factory<T>,
    metrics: PoolMetrics,
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of idle instances retained
    /// * `factory` - Builds a new instance whenever the pool is empty
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            store: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            factory: Box::new(factory),
            metrics: PoolMetrics::default(),
        }
    }

    /// Takes an idle instance, or builds a fresh one when none is available.
    ///
    /// Pooled instances are handed out in whatever state they were returned
    /// in; callers reset them as needed.
    pub fn get_instance(&self) -> T {
        match self.store.as_ref().and_then(ArrayQueue::pop) {
            Some(instance) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                instance
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        }
    }

    /// Offers an instance back to the pool.
    ///
    /// # Returns
    ///
    /// `true` if the pool kept the instance, `false` if the pool was full and
    /// the instance was dropped.
    pub fn return_instance(&self, instance: T) -> bool {
        let accepted = match &self.store {
            Some(store) => store.push(instance).is_ok(),
            None => false,
        };

        if accepted {
            self.metrics.returned.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Maximum number of idle instances this pool retains.
    pub fn capacity(&self) -> usize {
        self.store.as_ref().map_or(0, ArrayQueue::capacity)
    }

    /// Number of idle instances currently held.
    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, ArrayQueue::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every idle instance, returning how many were released.
    pub fn clear(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut released = 0;
        while store.pop().is_some() {
            released += 1;
        }
        released
    }

    /// Snapshot of this pool's counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            available: self.len(),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            returned: self.metrics.returned.load(Ordering::Relaxed),
            discarded: self.metrics.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity())
            .field("available", &self.len())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct PoolMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time counters for a pool.
///
/// `misses` counts instances built by the factory and `discarded` counts
/// instances dropped because the pool was full. A steadily climbing
/// `misses` with a flat `returned` means instances are being leaked or held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub hits: u64,
    pub misses: u64,
    pub returned: u64,
    pub discarded: u64,
}

impl PoolStats {
    /// Fraction of acquisitions served from the pool, or `0.0` before any.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_empty_pool_uses_factory() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let pool = ObjectPool::new(4, move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(pool.get_instance(), 0);
        assert_eq!(pool.get_instance(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().misses, 2);
    }

    #[test]
    fn test_returned_instance_is_reused() {
        let pool = ObjectPool::new(4, || Vec::<u8>::new());
        let mut first = pool.get_instance();
        first.push(9);
        assert!(pool.return_instance(first));

        let second = pool.get_instance();
        assert_eq!(second, vec![9]);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.returned, 1);
    }

    #[test]
    fn test_full_pool_discards() {
        let pool = ObjectPool::new(1, || 0u32);
        assert!(pool.return_instance(1));
        assert!(!pool.return_instance(2));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().discarded, 1);
        assert_eq!(pool.get_instance(), 1);
    }

    #[test]
    fn test_zero_capacity_pool() {
        let pool = ObjectPool::new(0, || 5u8);
        assert_eq!(pool.capacity(), 0);
        assert!(!pool.return_instance(1));
        assert_eq!(pool.get_instance(), 5);
        assert!(pool.is_empty());
        assert_eq!(pool.clear(), 0);
    }

    #[test]
    fn test_clear_releases_idle_instances() {
        let pool = ObjectPool::new(3, String::new);
        for _ in 0..3 {
            pool.return_instance(String::from("x"));
        }
        assert_eq!(pool.clear(), 3);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let stats = PoolStats {
            hits: 3,
            misses: 1,
            ..PoolStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(PoolStats::default().hit_rate(), 0.0);
    }
}
