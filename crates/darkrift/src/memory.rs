//! Size-tiered pool of byte blocks
//!
//! Every writer, buffer and message draws its backing storage from a
//! [`MemoryPool`]. Requests are rounded up to one of five tier sizes so that
//! blocks released by one message can serve the next, whatever its exact
//! length.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use crate::error::ConfigError;
use crate::pool::{ObjectPool, PoolStats};
use crate::settings::CacheSettings;

/// A thread-safe set of five size-classed block pools.
///
/// Cloning a `MemoryPool` clones a handle; all clones share the same tiers.
#[derive(Clone)]
pub struct MemoryPool {
    tiers: Arc<[Tier]>,
}

struct Tier {
    name: &'static str,
    block_size: usize,
    blocks: ObjectPool<Box<[u8]>>,
}

/// Counters for one memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub name: &'static str,
    pub block_size: usize,
    pub stats: PoolStats,
}

impl MemoryPool {
    /// Builds the five tiers described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a tier size is zero or the sizes do not
    /// strictly increase.
    pub fn new(settings: &CacheSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let tiers = settings
            .tiers()
            .into_iter()
            .map(|(name, tier)| {
                let block_size = tier.block_size;
                Tier {
                    name,
                    block_size,
                    blocks: ObjectPool::new(tier.max_blocks, move || {
                        vec![0u8; block_size].into_boxed_slice()
                    }),
                }
            })
            .collect();

        Ok(Self { tiers })
    }

    /// Returns a block of at least `min_size` bytes.
    ///
    /// The smallest tier able to hold `min_size` serves the request, either
    /// from its idle blocks or with a fresh block of exactly the tier size.
    /// Requests beyond the largest tier get a fresh block of exactly
    /// `min_size` bytes that no tier accounts for.
    ///
    /// Block contents are unspecified.
    pub fn get_instance(&self, min_size: usize) -> Box<[u8]> {
        match self.tiers.iter().find(|tier| tier.block_size >= min_size) {
            Some(tier) => tier.blocks.get_instance(),
            None => {
                trace!(min_size, "🧱 Allocating block beyond the largest memory tier");
                vec![0u8; min_size].into_boxed_slice()
            }
        }
    }

    /// Offers a block back to the pool.
    ///
    /// A block longer than the largest tier is dropped. Otherwise it goes to
    /// the largest tier whose block size does not exceed its length, so it
    /// can satisfy every request that tier serves. Blocks shorter than the
    /// smallest tier, and blocks offered to a full tier, are dropped.
    ///
    /// # Returns
    ///
    /// `true` if a tier kept the block.
    pub fn return_instance(&self, block: Box<[u8]>) -> bool {
        let length = block.len();
        if self.tiers.last().is_some_and(|tier| length > tier.block_size) {
            return false;
        }

        match self.tiers.iter().rev().find(|tier| tier.block_size <= length) {
            Some(tier) => tier.blocks.return_instance(block),
            None => false,
        }
    }

    /// Block sizes of the five tiers, smallest first.
    pub fn tier_sizes(&self) -> Vec<usize> {
        self.tiers.iter().map(|tier| tier.block_size).collect()
    }

    /// Size of the largest tier; requests above it bypass the pool.
    pub fn largest_tier_size(&self) -> usize {
        self.tiers.last().map_or(0, |tier| tier.block_size)
    }

    pub fn tier_stats(&self) -> Vec<TierStats> {
        self.tiers
            .iter()
            .map(|tier| TierStats {
                name: tier.name,
                block_size: tier.block_size,
                stats: tier.blocks.stats(),
            })
            .collect()
    }

    /// Releases every idle block in every tier, returning how many were freed.
    pub fn clear(&self) -> usize {
        self.tiers.iter().map(|tier| tier.blocks.clear()).sum()
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("tier_sizes", &self.tier_sizes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryBlockSettings;

    fn pool() -> MemoryPool {
        MemoryPool::new(&CacheSettings::default()).unwrap()
    }

    #[test]
    fn test_requests_round_up_to_tier() {
        let pool = pool();
        assert_eq!(pool.get_instance(0).len(), 16);
        assert_eq!(pool.get_instance(10).len(), 16);
        assert_eq!(pool.get_instance(16).len(), 16);
        assert_eq!(pool.get_instance(17).len(), 64);
        assert_eq!(pool.get_instance(4096).len(), 4096);
    }

    #[test]
    fn test_oversized_request_is_exact_and_untracked() {
        let pool = pool();
        let block = pool.get_instance(10_000);
        assert_eq!(block.len(), 10_000);
        assert!(!pool.return_instance(block));
        assert!(pool.tier_stats().iter().all(|tier| tier.stats.misses == 0));
    }

    #[test]
    fn test_return_classifies_by_floor() {
        let pool = pool();
        assert!(pool.return_instance(vec![7u8; 20].into_boxed_slice()));
        assert!(pool.return_instance(vec![0u8; 300].into_boxed_slice()));

        let stats = pool.tier_stats();
        assert_eq!(stats[0].stats.available, 1);
        assert_eq!(stats[2].stats.available, 1);

        let reused = pool.get_instance(10);
        assert_eq!(reused.len(), 20);
        assert!(reused.iter().all(|byte| *byte == 7));
    }

    #[test]
    fn test_undersized_block_is_dropped() {
        let pool = pool();
        assert!(!pool.return_instance(vec![0u8; 10].into_boxed_slice()));
        assert_eq!(pool.get_instance(10).len(), 16);
    }

    #[test]
    fn test_full_tier_drops_block() {
        let settings = CacheSettings {
            extra_small: MemoryBlockSettings::new(16, 1),
            ..CacheSettings::default()
        };
        let pool = MemoryPool::new(&settings).unwrap();
        assert!(pool.return_instance(vec![0u8; 16].into_boxed_slice()));
        assert!(!pool.return_instance(vec![0u8; 16].into_boxed_slice()));
        assert_eq!(pool.clear(), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = CacheSettings {
            medium: MemoryBlockSettings::new(32, 4),
            ..CacheSettings::default()
        };
        assert!(MemoryPool::new(&settings).is_err());
    }
}
