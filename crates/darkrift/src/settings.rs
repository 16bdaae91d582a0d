//! Pool sizing configuration for an [`crate::ObjectCache`].

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Size and retention of one memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlockSettings {
    /// Length in bytes of every block this tier hands out.
    pub block_size: usize,
    /// Number of idle blocks the tier keeps for reuse.
    pub max_blocks: usize,
}

impl MemoryBlockSettings {
    pub const fn new(block_size: usize, max_blocks: usize) -> Self {
        Self { block_size, max_blocks }
    }
}

/// Settings for every pool owned by an [`crate::ObjectCache`].
///
/// The defaults match what a server uses. Any field missing from a
/// deserialized document takes its default value.
///
/// # Examples
///
/// ```rust
/// use darkrift::CacheSettings;
///
/// let settings = CacheSettings {
///     max_message_buffers: 32,
///     ..CacheSettings::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Idle shared buffer shells kept for [`crate::MessageBuffer`].
    pub max_message_buffers: usize,
    /// Idle task state objects kept for [`crate::ActionDispatcherTask`].
    pub max_action_dispatcher_tasks: usize,
    pub extra_small: MemoryBlockSettings,
    pub small: MemoryBlockSettings,
    pub medium: MemoryBlockSettings,
    pub large: MemoryBlockSettings,
    pub extra_large: MemoryBlockSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_message_buffers: 4,
            max_action_dispatcher_tasks: 16,
            extra_small: MemoryBlockSettings::new(16, 4),
            small: MemoryBlockSettings::new(64, 4),
            medium: MemoryBlockSettings::new(256, 4),
            large: MemoryBlockSettings::new(1024, 4),
            extra_large: MemoryBlockSettings::new(4096, 4),
        }
    }
}

impl CacheSettings {
    /// Settings that retain nothing: every acquisition allocates and every
    /// release drops. Tier sizes keep their defaults so requests are still
    /// rounded the same way.
    pub fn dont_use_cache() -> Self {
        let defaults = Self::default();
        Self {
            max_message_buffers: 0,
            max_action_dispatcher_tasks: 0,
            extra_small: MemoryBlockSettings::new(defaults.extra_small.block_size, 0),
            small: MemoryBlockSettings::new(defaults.small.block_size, 0),
            medium: MemoryBlockSettings::new(defaults.medium.block_size, 0),
            large: MemoryBlockSettings::new(defaults.large.block_size, 0),
            extra_large: MemoryBlockSettings::new(defaults.extra_large.block_size, 0),
        }
    }

    /// The five memory tiers, smallest first, paired with their names.
    pub fn tiers(&self) -> [(&'static str, MemoryBlockSettings); 5] {
        [
            ("extra_small", self.extra_small),
            ("small", self.small),
            ("medium", self.medium),
            ("large", self.large),
            ("extra_large", self.extra_large),
        ]
    }

    /// Checks that every tier has a non-zero block size and that sizes
    /// strictly increase from `extra_small` to `extra_large`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut previous: Option<usize> = None;
        for (tier, settings) in self.tiers() {
            if settings.block_size == 0 {
                return Err(ConfigError::ZeroBlockSize { tier });
            }
            if let Some(previous) = previous {
                if settings.block_size <= previous {
                    return Err(ConfigError::TiersNotAscending {
                        tier,
                        size: settings.block_size,
                        previous,
                    });
                }
            }
            previous = Some(settings.block_size);
        }
        Ok(())
    }
}
