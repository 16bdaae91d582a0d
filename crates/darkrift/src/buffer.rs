//! Shared, pooled views over byte blocks.

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::cache::ObjectCache;
use crate::error::RangeError;
use crate::memory::MemoryPool;

/// Backing storage shared by every view of one buffer.
///
/// The block goes back to its memory pool when the last view lets go of it.
pub(crate) struct Block {
    data: Box<[u8]>,
    memory: MemoryPool,
}

impl Block {
    pub(crate) fn empty(memory: MemoryPool) -> Self {
        Self {
            data: Box::default(),
            memory,
        }
    }

    fn release(&mut self) {
        let data = mem::take(&mut self.data);
        if !data.is_empty() {
            self.memory.return_instance(data);
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.release();
    }
}

/// A window of `count` bytes starting at `offset` in a pooled block.
///
/// Cloning a `MessageBuffer` is shallow: the clone views the same memory.
/// The block returns to the cache's [`MemoryPool`] exactly once, when the
/// last view is dropped.
///
/// # Examples
///
/// ```rust
/// use darkrift::{CacheSettings, MessageBuffer, ObjectCache};
///
/// let cache = ObjectCache::new(CacheSettings::default())?;
/// let buffer = MessageBuffer::from_slice(&cache, &[1, 2, 3, 4]);
/// let tail = buffer.slice(2, 2)?;
/// assert_eq!(tail.as_slice(), &[3, 4]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MessageBuffer {
    // Only `None` while being dropped.
    block: Option<Arc<Block>>,
    offset: usize,
    count: usize,
    cache: ObjectCache,
}

impl MessageBuffer {
    /// Wraps a block taken from `cache`'s memory pool. `offset + count` must
    /// not exceed `data.len()`.
    pub(crate) fn from_block(cache: &ObjectCache, data: Box<[u8]>, offset: usize, count: usize) -> Self {
        debug_assert!(offset + count <= data.len());

        let mut shell = cache.buffer_shells().get_instance();
        match Arc::get_mut(&mut shell) {
            Some(block) => block.data = data,
            None => {
                shell = Arc::new(Block {
                    data,
                    memory: cache.memory().clone(),
                })
            }
        }

        Self {
            block: Some(shell),
            offset,
            count,
            cache: cache.clone(),
        }
    }

    /// Creates a buffer of `count` zeroed bytes, ready to be filled through
    /// [`as_mut_slice`](Self::as_mut_slice).
    pub fn create(cache: &ObjectCache, count: usize) -> Self {
        let mut data = cache.memory().get_instance(count);
        data[..count].fill(0);
        Self::from_block(cache, data, 0, count)
    }

    /// Copies `bytes` into a pooled block.
    pub fn from_slice(cache: &ObjectCache, bytes: &[u8]) -> Self {
        let mut data = cache.memory().get_instance(bytes.len());
        data[..bytes.len()].copy_from_slice(bytes);
        Self::from_block(cache, data, 0, bytes.len())
    }

    /// The bytes in view.
    pub fn as_slice(&self) -> &[u8] {
        match &self.block {
            Some(block) => &block.data[self.offset..self.offset + self.count],
            None => &[],
        }
    }

    /// Mutable access to the bytes in view, available only while no other
    /// view shares the block.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        let range = self.offset..self.offset + self.count;
        let block = Arc::get_mut(self.block.as_mut()?)?;
        Some(&mut block.data[range])
    }

    /// Offset of the view within its block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes in view.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Length of the whole underlying block.
    pub fn capacity(&self) -> usize {
        self.block.as_ref().map_or(0, |block| block.data.len())
    }

    /// Whether another view currently shares this buffer's block.
    pub fn is_shared(&self) -> bool {
        self.block
            .as_ref()
            .is_some_and(|block| Arc::strong_count(block) > 1)
    }

    /// A shallow sub-view of `count` bytes starting `offset` bytes into this
    /// view.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if the range does not fit within this view.
    pub fn slice(&self, offset: usize, count: usize) -> Result<Self, RangeError> {
        RangeError::check(offset, count, self.count)?;
        Ok(Self {
            block: self.block.clone(),
            offset: self.offset + offset,
            count,
            cache: self.cache.clone(),
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Narrows the view by dropping its first `by` bytes. `by` must not
    /// exceed [`count`](Self::count).
    pub(crate) fn advance(mut self, by: usize) -> Self {
        debug_assert!(by <= self.count);
        self.offset += by;
        self.count -= by;
        self
    }

    pub(crate) fn cache(&self) -> &ObjectCache {
        &self.cache
    }
}

impl Clone for MessageBuffer {
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
            offset: self.offset,
            count: self.count,
            cache: self.cache.clone(),
        }
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        let Some(mut shell) = self.block.take() else {
            return;
        };

        // The last view recycles the shell as well as the block. Any other
        // view just drops its reference; the block's own Drop covers the
        // case where that reference turns out to be the last one.
        if let Some(block) = Arc::get_mut(&mut shell) {
            block.release();
            self.cache.buffer_shells().return_instance(shell);
        }
    }
}

impl AsRef<[u8]> for MessageBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("offset", &self.offset)
            .field("count", &self.count)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CacheSettings;

    fn cache() -> ObjectCache {
        ObjectCache::new(CacheSettings::default()).unwrap()
    }

    #[test]
    fn test_from_slice_copies_into_tier_block() {
        let cache = cache();
        let buffer = MessageBuffer::from_slice(&cache, &[1, 2, 3]);
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
        assert_eq!(buffer.offset(), 0);
        assert_eq!(buffer.count(), 3);
        assert_eq!(buffer.capacity(), 16);
    }

    #[test]
    fn test_drop_returns_block_and_shell() {
        let cache = cache();
        drop(MessageBuffer::from_slice(&cache, &[9; 40]));

        let stats = cache.statistics();
        assert_eq!(stats.memory[1].stats.available, 1);
        assert_eq!(stats.message_buffers.available, 1);
    }

    #[test]
    fn test_block_returns_once_after_last_clone() {
        let cache = cache();
        let original = MessageBuffer::from_slice(&cache, &[5; 10]);
        let clone = original.clone();
        assert!(original.is_shared());

        drop(original);
        assert_eq!(cache.statistics().memory[0].stats.available, 0);
        assert_eq!(clone.as_slice(), &[5; 10]);

        drop(clone);
        let stats = cache.statistics();
        assert_eq!(stats.memory[0].stats.available, 1);
        assert_eq!(stats.memory[0].stats.returned, 1);
    }

    #[test]
    fn test_slice_bounds() {
        let cache = cache();
        let buffer = MessageBuffer::from_slice(&cache, &[0, 1, 2, 3, 4]);
        let middle = buffer.slice(1, 3).unwrap();
        assert_eq!(middle.as_slice(), &[1, 2, 3]);
        assert_eq!(middle.offset(), 1);

        let nested = middle.slice(2, 1).unwrap();
        assert_eq!(nested.as_slice(), &[3]);
        assert_eq!(nested.offset(), 3);

        assert_eq!(
            middle.slice(2, 2).unwrap_err(),
            RangeError { offset: 2, count: 2, length: 3 }
        );
    }

    #[test]
    fn test_mut_access_requires_unique_view() {
        let cache = cache();
        let mut buffer = MessageBuffer::create(&cache, 4);
        assert_eq!(buffer.as_slice(), &[0; 4]);

        buffer.as_mut_slice().unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4]);

        let clone = buffer.clone();
        assert!(buffer.as_mut_slice().is_none());
        drop(clone);
        assert!(buffer.as_mut_slice().is_some());
    }
}
