//! Cursor-based binary deserializer, the mirror of [`crate::DarkRiftWriter`].

use std::mem;

use crate::buffer::MessageBuffer;
use crate::encoding::Encoding;
use crate::error::{RangeError, ReadError};
use crate::serializable::DarkRiftSerializable;

/// Reads primitives, strings and arrays from a borrowed byte slice.
///
/// Every read checks that all the bytes it needs are present before it
/// consumes anything. A failed read, including a failed string, array or
/// [`DarkRiftSerializable`] read, leaves the position where it was.
///
/// # Examples
///
/// ```rust
/// use darkrift::{DarkRiftReader, ReadError};
///
/// let mut reader = DarkRiftReader::from_slice(&[0, 7, 1]);
/// assert_eq!(reader.read_u16()?, 7);
/// assert!(reader.read_u32().is_err());
/// assert_eq!(reader.position(), 2);
/// assert!(reader.read_bool()?);
/// # Ok::<(), ReadError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DarkRiftReader<'a> {
    data: &'a [u8],
    position: usize,
    encoding: Encoding,
}

macro_rules! read_primitives {
    ($($(#[$meta:meta])* $read:ident, $read_array:ident => $ty:ty;)*) => {
        $(
            $(#[$meta])*
            pub fn $read(&mut self) -> Result<$ty, ReadError> {
                const WIDTH: usize = mem::size_of::<$ty>();
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(self.take(WIDTH)?);
                Ok(<$ty>::from_be_bytes(raw))
            }

            #[doc = concat!("Reads a length-prefixed array of `", stringify!($ty), "`.")]
            pub fn $read_array(&mut self) -> Result<Vec<$ty>, ReadError> {
                const WIDTH: usize = mem::size_of::<$ty>();
                self.atomically(|reader| {
                    let count = reader.read_length()?;
                    let width = count.checked_mul(WIDTH).unwrap_or(usize::MAX);
                    let bytes = reader.take(width)?;
                    Ok(bytes
                        .chunks_exact(WIDTH)
                        .map(|chunk| {
                            let mut raw = [0u8; WIDTH];
                            raw.copy_from_slice(chunk);
                            <$ty>::from_be_bytes(raw)
                        })
                        .collect())
                })
            }
        )*
    };
}

impl<'a> DarkRiftReader<'a> {
    /// Reads the bytes in view of `buffer`.
    pub fn new(buffer: &'a MessageBuffer) -> Self {
        Self::from_slice(buffer.as_slice())
    }

    /// Reads directly from a slice.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            encoding: Encoding::default(),
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// Total number of bytes readable from the start.
    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor to `position`, for skipping or re-reading fields.
    /// Seeking to [`length`](Self::length) is allowed and leaves nothing to
    /// read.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if `position` is past the end; the cursor
    /// does not move.
    pub fn set_position(&mut self, position: usize) -> Result<(), RangeError> {
        RangeError::check(position, 0, self.data.len())?;
        self.position = position;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    read_primitives! {
        /// Reads a single byte.
        read_u8, read_bytes => u8;
        /// Reads a single signed byte.
        read_i8, read_i8s => i8;
        /// Reads 2 big-endian bytes.
        read_i16, read_i16s => i16;
        /// Reads 2 big-endian bytes.
        read_u16, read_u16s => u16;
        /// Reads 4 big-endian bytes.
        read_i32, read_i32s => i32;
        /// Reads 4 big-endian bytes.
        read_u32, read_u32s => u32;
        /// Reads 4 big-endian bytes of IEEE-754 bits.
        read_f32, read_f32s => f32;
        /// Reads 8 big-endian bytes.
        read_i64, read_i64s => i64;
        /// Reads 8 big-endian bytes.
        read_u64, read_u64s => u64;
        /// Reads 8 big-endian bytes of IEEE-754 bits.
        read_f64, read_f64s => f64;
    }

    /// Reads one byte; only `1` is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ReadError> {
        Ok(self.read_u8()? == 1)
    }

    /// Reads a string that must hold exactly one character.
    pub fn read_char(&mut self) -> Result<char, ReadError> {
        self.atomically(|reader| {
            let value = reader.read_string()?;
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(ReadError::InvalidChar {
                    count: value.chars().count(),
                }),
            }
        })
    }

    /// Reads a string and returns its characters.
    pub fn read_chars(&mut self) -> Result<Vec<char>, ReadError> {
        Ok(self.read_string()?.chars().collect())
    }

    /// Reads a length-prefixed string in this reader's encoding.
    pub fn read_string(&mut self) -> Result<String, ReadError> {
        self.read_string_with(self.encoding)
    }

    pub fn read_string_with(&mut self, encoding: Encoding) -> Result<String, ReadError> {
        self.atomically(|reader| {
            let byte_count = reader.read_length()?;
            let bytes = reader.take(byte_count)?;
            encoding
                .decode(bytes)
                .ok_or(ReadError::InvalidString { encoding })
        })
    }

    pub fn read_strings(&mut self) -> Result<Vec<String>, ReadError> {
        self.atomically(|reader| {
            let count = reader.read_length()?;
            (0..count).map(|_| reader.read_string()).collect()
        })
    }

    /// Reads a bit-packed boolean array, first element in the most
    /// significant bit.
    pub fn read_bools(&mut self) -> Result<Vec<bool>, ReadError> {
        self.atomically(|reader| {
            let count = reader.read_length()?;
            let packed = reader.take(count.div_ceil(8))?;
            Ok((0..count)
                .map(|index| packed[index / 8] & (0x80 >> (index % 8)) != 0)
                .collect())
        })
    }

    /// Borrows the next `length` bytes without copying.
    pub fn read_raw(&mut self, length: usize) -> Result<&'a [u8], ReadError> {
        self.take(length)
    }

    pub fn read_serializable<T: DarkRiftSerializable>(&mut self) -> Result<T, ReadError> {
        self.atomically(T::deserialize)
    }

    pub fn read_serializables<T: DarkRiftSerializable>(&mut self) -> Result<Vec<T>, ReadError> {
        self.atomically(|reader| {
            let count = reader.read_length()?;
            (0..count).map(|_| T::deserialize(reader)).collect()
        })
    }

    fn read_length(&mut self) -> Result<usize, ReadError> {
        Ok(self.read_u32()? as usize)
    }

    fn take(&mut self, width: usize) -> Result<&'a [u8], ReadError> {
        let remaining = self.remaining();
        if width > remaining {
            return Err(ReadError::NotEnoughData {
                expected: width,
                remaining,
            });
        }

        let bytes = &self.data[self.position..self.position + width];
        self.position += width;
        Ok(bytes)
    }

    /// Runs a multi-step read, rewinding to the starting position if any
    /// step fails.
    fn atomically<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, ReadError>,
    ) -> Result<T, ReadError> {
        let start = self.position;
        let result = read(self);
        if result.is_err() {
            self.position = start;
        }
        result
    }
}
