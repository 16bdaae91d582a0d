//! Registry of every pool used by messages and dispatchers.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::buffer::Block;
use crate::dispatching::task::TaskCore;
use crate::error::ConfigError;
use crate::memory::{MemoryPool, TierStats};
use crate::pool::{ObjectPool, PoolStats};
use crate::settings::CacheSettings;
use crate::writer::DarkRiftWriter;

/// Owns the memory tiers, the shared-buffer shell pool and the dispatcher
/// task pool.
///
/// An `ObjectCache` is an explicit handle rather than process-wide state:
/// build one from [`CacheSettings`] and pass it to whatever needs pooled
/// memory. Cloning it is cheap and every clone shares the same pools, so one
/// cache is usually shared by a whole client or server.
///
/// # Examples
///
/// ```rust
/// use darkrift::{CacheSettings, ObjectCache};
///
/// let cache = ObjectCache::new(CacheSettings::default())?;
/// let writer = cache.writer();
/// assert_eq!(writer.length(), 0);
/// # Ok::<(), darkrift::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct ObjectCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    settings: CacheSettings,
    memory: MemoryPool,
    buffer_shells: ObjectPool<Arc<Block>>,
    task_cores: ObjectPool<Arc<TaskCore>>,
}

/// Snapshot of every pool in a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub memory: Vec<TierStats>,
    pub message_buffers: PoolStats,
    pub action_dispatcher_tasks: PoolStats,
}

impl ObjectCache {
    /// Creates the pools described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the memory tiers are invalid.
    pub fn new(settings: CacheSettings) -> Result<Self, ConfigError> {
        let memory = MemoryPool::new(&settings)?;

        let shell_memory = memory.clone();
        let buffer_shells = ObjectPool::new(settings.max_message_buffers, move || {
            Arc::new(Block::empty(shell_memory.clone()))
        });
        let task_cores = ObjectPool::new(settings.max_action_dispatcher_tasks, || {
            Arc::new(TaskCore::new())
        });

        debug!(
            tiers = ?memory.tier_sizes(),
            max_message_buffers = settings.max_message_buffers,
            max_action_dispatcher_tasks = settings.max_action_dispatcher_tasks,
            "🗃️ Object cache initialized"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                settings,
                memory,
                buffer_shells,
                task_cores,
            }),
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// The shared block tiers.
    pub fn memory(&self) -> &MemoryPool {
        &self.inner.memory
    }

    /// Shorthand for [`DarkRiftWriter::create`].
    pub fn writer(&self) -> DarkRiftWriter {
        DarkRiftWriter::create(self)
    }

    pub(crate) fn buffer_shells(&self) -> &ObjectPool<Arc<Block>> {
        &self.inner.buffer_shells
    }

    pub(crate) fn task_cores(&self) -> &ObjectPool<Arc<TaskCore>> {
        &self.inner.task_cores
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            memory: self.inner.memory.tier_stats(),
            message_buffers: self.inner.buffer_shells.stats(),
            action_dispatcher_tasks: self.inner.task_cores.stats(),
        }
    }

    /// Releases every idle pooled object, returning how many were freed.
    ///
    /// Objects currently in use are unaffected and return to the (now
    /// emptied) pools as usual when released.
    pub fn clear(&self) -> usize {
        let released = self.inner.memory.clear()
            + self.inner.buffer_shells.clear()
            + self.inner.task_cores.clear();
        debug!(released, "🧹 Object cache cleared");
        released
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryBlockSettings;

    #[test]
    fn test_clones_share_pools() {
        let cache = ObjectCache::new(CacheSettings::default()).unwrap();
        let other = cache.clone();

        assert!(other.memory().return_instance(vec![0u8; 64].into_boxed_slice()));
        assert_eq!(cache.statistics().memory[1].stats.available, 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = CacheSettings {
            extra_small: MemoryBlockSettings::new(0, 4),
            ..CacheSettings::default()
        };
        assert!(ObjectCache::new(settings).is_err());
    }

    #[test]
    fn test_clear_empties_every_pool() {
        let cache = ObjectCache::new(CacheSettings::default()).unwrap();
        cache.memory().return_instance(vec![0u8; 16].into_boxed_slice());
        cache.memory().return_instance(vec![0u8; 4096].into_boxed_slice());
        cache.task_cores().return_instance(Arc::new(TaskCore::new()));

        assert_eq!(cache.clear(), 3);
        let stats = cache.statistics();
        assert!(stats.memory.iter().all(|tier| tier.stats.available == 0));
        assert_eq!(stats.action_dispatcher_tasks.available, 0);
    }
}
