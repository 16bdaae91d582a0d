//! Append-only binary serializer.
//!
//! Multi-byte numbers are written big-endian. Strings, arrays and boolean
//! arrays carry a 4-byte big-endian length prefix; strings count encoded
//! bytes, arrays count elements.

use std::fmt;
use std::mem;

use tracing::trace;

use crate::buffer::MessageBuffer;
use crate::cache::ObjectCache;
use crate::encoding::Encoding;
use crate::error::RangeError;
use crate::serializable::DarkRiftSerializable;

const INITIAL_CAPACITY: usize = 16;

/// Writes primitives, strings and arrays into a pooled, growable block.
///
/// A writer only ever appends, so its position always equals its length.
/// Hand the written bytes on with [`to_buffer`](Self::to_buffer) or
/// [`crate::Message::create`]; both consume the writer. A writer dropped
/// without being converted returns its block to the memory pool.
///
/// # Panics
///
/// Length-prefixed writes panic when the string, array or byte count does
/// not fit in a `u32`.
///
/// # Examples
///
/// ```rust
/// use darkrift::{CacheSettings, DarkRiftWriter, ObjectCache};
///
/// let cache = ObjectCache::new(CacheSettings::default())?;
/// let mut writer = DarkRiftWriter::create(&cache);
/// writer.write_u16(0x0102);
/// writer.write_bools(&[true, false, true]);
/// assert_eq!(writer.to_vec(), vec![0x01, 0x02, 0, 0, 0, 3, 0b1010_0000]);
/// # Ok::<(), darkrift::ConfigError>(())
/// ```
pub struct DarkRiftWriter {
    block: Box<[u8]>,
    length: usize,
    encoding: Encoding,
    cache: ObjectCache,
}

macro_rules! write_primitives {
    ($($(#[$meta:meta])* $write:ident, $write_array:ident => $ty:ty;)*) => {
        $(
            $(#[$meta])*
            pub fn $write(&mut self, value: $ty) {
                self.claim(mem::size_of::<$ty>())
                    .copy_from_slice(&value.to_be_bytes());
            }

            #[doc = concat!("Writes a length-prefixed array of `", stringify!($ty), "`.")]
            pub fn $write_array(&mut self, values: &[$ty]) {
                const WIDTH: usize = mem::size_of::<$ty>();
                self.write_length(values.len());
                let slots = self.claim(values.len() * WIDTH);
                for (value, slot) in values.iter().zip(slots.chunks_exact_mut(WIDTH)) {
                    slot.copy_from_slice(&value.to_be_bytes());
                }
            }
        )*
    };
}

impl DarkRiftWriter {
    /// Creates an empty writer with a small pooled block.
    pub fn create(cache: &ObjectCache) -> Self {
        Self::with_capacity(cache, INITIAL_CAPACITY)
    }

    /// Creates an empty writer whose block holds at least `capacity` bytes.
    pub fn with_capacity(cache: &ObjectCache, capacity: usize) -> Self {
        Self {
            block: cache.memory().get_instance(capacity),
            length: 0,
            encoding: Encoding::default(),
            cache: cache.clone(),
        }
    }

    /// Creates an empty writer that encodes strings with `encoding`.
    pub fn with_encoding(cache: &ObjectCache, encoding: Encoding) -> Self {
        let mut writer = Self::create(cache);
        writer.encoding = encoding;
        writer
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// Current write position. Always equal to [`length`](Self::length).
    pub fn position(&self) -> usize {
        self.length
    }

    /// Number of bytes written.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Size of the current block; writing past it grows the block.
    pub fn capacity(&self) -> usize {
        self.block.len()
    }

    /// The bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.block[..self.length]
    }

    write_primitives! {
        /// Writes a single byte.
        write_u8, write_bytes => u8;
        /// Writes a single signed byte.
        write_i8, write_i8s => i8;
        /// Writes 2 bytes, big-endian.
        write_i16, write_i16s => i16;
        /// Writes 2 bytes, big-endian.
        write_u16, write_u16s => u16;
        /// Writes 4 bytes, big-endian.
        write_i32, write_i32s => i32;
        /// Writes 4 bytes, big-endian.
        write_u32, write_u32s => u32;
        /// Writes the IEEE-754 bits as 4 bytes, big-endian.
        write_f32, write_f32s => f32;
        /// Writes 8 bytes, big-endian.
        write_i64, write_i64s => i64;
        /// Writes 8 bytes, big-endian.
        write_u64, write_u64s => u64;
        /// Writes the IEEE-754 bits as 8 bytes, big-endian.
        write_f64, write_f64s => f64;
    }

    /// Writes `1` for `true` and `0` for `false`.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a character as a one-character string.
    pub fn write_char(&mut self, value: char) {
        let mut scratch = [0u8; 4];
        self.write_string(value.encode_utf8(&mut scratch));
    }

    /// Writes the characters as a single string.
    pub fn write_chars(&mut self, values: &[char]) {
        let value: String = values.iter().collect();
        self.write_string(&value);
    }

    /// Writes a length-prefixed string in this writer's encoding.
    pub fn write_string(&mut self, value: &str) {
        self.write_string_with(value, self.encoding);
    }

    /// Writes a length-prefixed string in the given encoding.
    ///
    /// The prefix is the number of encoded bytes that follow.
    pub fn write_string_with(&mut self, value: &str, encoding: Encoding) {
        let byte_count = encoding.byte_count(value);
        self.write_length(byte_count);
        encoding.encode_into(value, self.claim(byte_count));
    }

    /// Writes a length-prefixed array of strings.
    pub fn write_strings<S: AsRef<str>>(&mut self, values: &[S]) {
        self.write_length(values.len());
        for value in values {
            self.write_string(value.as_ref());
        }
    }

    /// Writes the element count, then the booleans packed eight to a byte
    /// with the first element in the most significant bit.
    pub fn write_bools(&mut self, values: &[bool]) {
        self.write_length(values.len());
        let packed = self.claim(values.len().div_ceil(8));
        packed.fill(0);
        for (index, _) in values.iter().enumerate().filter(|(_, value)| **value) {
            packed[index / 8] |= 0x80 >> (index % 8);
        }
    }

    /// Writes bytes as-is, with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.claim(bytes.len()).copy_from_slice(bytes);
    }

    pub fn write_serializable<T: DarkRiftSerializable>(&mut self, value: &T) {
        value.serialize(self);
    }

    /// Writes the element count, then each value.
    pub fn write_serializables<T: DarkRiftSerializable>(&mut self, values: &[T]) {
        self.write_length(values.len());
        for value in values {
            value.serialize(self);
        }
    }

    /// Moves the written bytes into a [`MessageBuffer`] without copying.
    pub fn to_buffer(mut self) -> MessageBuffer {
        let block = mem::take(&mut self.block);
        MessageBuffer::from_block(&self.cache, block, 0, self.length)
    }

    /// Copies the written bytes into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Copies `count` written bytes starting at `offset` into a new vector.
    pub fn to_vec_range(&self, offset: usize, count: usize) -> Result<Vec<u8>, RangeError> {
        RangeError::check(offset, count, self.length)?;
        Ok(self.block[offset..offset + count].to_vec())
    }

    /// Copies every written byte into `destination` at `destination_offset`.
    pub fn copy_to(&self, destination: &mut [u8], destination_offset: usize) -> Result<(), RangeError> {
        self.copy_range_to(0, self.length, destination, destination_offset)
    }

    /// Copies `count` written bytes from `source_offset` into `destination`
    /// at `destination_offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if either range is out of bounds; nothing is
    /// copied in that case.
    pub fn copy_range_to(
        &self,
        source_offset: usize,
        count: usize,
        destination: &mut [u8],
        destination_offset: usize,
    ) -> Result<(), RangeError> {
        RangeError::check(source_offset, count, self.length)?;
        RangeError::check(destination_offset, count, destination.len())?;
        destination[destination_offset..destination_offset + count]
            .copy_from_slice(&self.block[source_offset..source_offset + count]);
        Ok(())
    }

    /// # Panics
    ///
    /// If `length` does not fit the 4-byte prefix. Nothing is written then.
    fn write_length(&mut self, length: usize) {
        let prefix = u32::try_from(length)
            .unwrap_or_else(|_| panic!("length {length} does not fit a 4-byte prefix"));
        self.write_u32(prefix);
    }

    /// Reserves the next `width` bytes, advancing the length past them.
    fn claim(&mut self, width: usize) -> &mut [u8] {
        let start = self.length;
        let end = start + width;
        self.ensure_capacity(end);
        self.length = end;
        &mut self.block[start..end]
    }

    fn ensure_capacity(&mut self, required: usize) {
        let current = self.block.len();
        if required <= current {
            return;
        }

        let memory = self.cache.memory();
        let mut grown = memory.get_instance(required.max(current * 2));
        grown[..self.length].copy_from_slice(&self.block[..self.length]);
        trace!(from = current, to = grown.len(), "📈 Growing writer block");

        let old = mem::replace(&mut self.block, grown);
        memory.return_instance(old);
    }
}

impl Drop for DarkRiftWriter {
    fn drop(&mut self) {
        let block = mem::take(&mut self.block);
        if !block.is_empty() {
            self.cache.memory().return_instance(block);
        }
    }
}

impl fmt::Debug for DarkRiftWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DarkRiftWriter")
            .field("length", &self.length)
            .field("capacity", &self.capacity())
            .field("encoding", &self.encoding)
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

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_length_prefix_panics_before_writing() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            writer.write_length(u32::MAX as usize + 1)
        }));

        assert!(result.is_err());
        assert_eq!(writer.length(), 0);
        writer.write_length(u32::MAX as usize);
        assert_eq!(writer.to_vec(), vec![0xFF; 4]);
    }

    #[test]
    fn test_primitives_are_big_endian() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_u8(5);
        writer.write_i16(-2);
        writer.write_u32(0x0A0B_0C0D);
        writer.write_f64(0.75);

        assert_eq!(
            writer.to_vec(),
            vec![5, 0xFF, 0xFE, 0x0A, 0x0B, 0x0C, 0x0D, 0x3F, 0xE8, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(writer.position(), 15);
        assert_eq!(writer.length(), 15);
    }

    #[test]
    fn test_char_and_string_encoding() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_char('A');
        writer.write_string("ABC");
        assert_eq!(
            writer.to_vec(),
            vec![0, 0, 0, 2, 65, 0, 0, 0, 0, 6, 65, 0, 66, 0, 67, 0]
        );

        let mut utf8 = DarkRiftWriter::with_encoding(&cache, Encoding::Utf8);
        utf8.write_string("hé");
        assert_eq!(utf8.to_vec(), vec![0, 0, 0, 3, b'h', 0xC3, 0xA9]);
    }

    #[test]
    fn test_bools_overwrite_stale_pool_bytes() {
        let cache = cache();
        cache.memory().return_instance(vec![0xFF; 16].into_boxed_slice());

        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_bools(&[true, true, false, false, true, false, true, false, true]);
        assert_eq!(writer.to_vec(), vec![0, 0, 0, 9, 0b1100_1010, 0b1000_0000]);
    }

    #[test]
    fn test_primitive_arrays() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_u16s(&[1, 0x0203]);
        writer.write_bytes(&[]);
        assert_eq!(writer.to_vec(), vec![0, 0, 0, 2, 0, 1, 2, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_growth_doubles_and_recycles_old_block() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);
        assert_eq!(writer.capacity(), 16);

        writer.write_raw(&[1; 16]);
        writer.write_u8(2);
        assert_eq!(writer.capacity(), 64);
        assert_eq!(writer.length(), 17);
        assert_eq!(&writer.as_slice()[15..], &[1, 2]);
        assert_eq!(cache.statistics().memory[0].stats.available, 1);

        writer.write_raw(&[0; 200]);
        assert_eq!(writer.capacity(), 256);
        assert_eq!(writer.length(), 217);
    }

    #[test]
    fn test_copy_ranges() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_raw(&[1, 2, 3, 4]);

        assert_eq!(writer.to_vec_range(1, 2).unwrap(), vec![2, 3]);
        assert!(writer.to_vec_range(3, 2).is_err());

        let mut destination = [0u8; 6];
        writer.copy_to(&mut destination, 2).unwrap();
        assert_eq!(destination, [0, 0, 1, 2, 3, 4]);

        writer.copy_range_to(2, 2, &mut destination, 0).unwrap();
        assert_eq!(destination, [3, 4, 1, 2, 3, 4]);

        assert_eq!(
            writer.copy_to(&mut destination, 3),
            Err(RangeError { offset: 3, count: 4, length: 6 })
        );
    }

    #[test]
    fn test_to_buffer_moves_block() {
        let cache = cache();
        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_u32(7);

        let buffer = writer.to_buffer();
        assert_eq!(buffer.as_slice(), &[0, 0, 0, 7]);
        assert_eq!(buffer.offset(), 0);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(cache.statistics().memory[0].stats.available, 0);

        drop(buffer);
        assert_eq!(cache.statistics().memory[0].stats.available, 1);
    }

    #[test]
    fn test_dropped_writer_returns_block() {
        let cache = cache();
        drop(DarkRiftWriter::with_capacity(&cache, 100));
        assert_eq!(cache.statistics().memory[2].stats.available, 1);
    }
}
