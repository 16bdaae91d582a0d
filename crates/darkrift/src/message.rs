//! Tagged messages and their wire framing.
//!
//! A framed message is laid out as:
//!
//! ```text
//! flags (1) | tag (2, big-endian) | [ping code (2, big-endian)] | payload
//! ```
//!
//! The ping code is present only when the flags mark the message as a ping
//! or a ping acknowledgement.

use std::fmt;

use crate::buffer::MessageBuffer;
use crate::cache::ObjectCache;
use crate::error::{MessageError, ReadError};
use crate::reader::DarkRiftReader;
use crate::serializable::DarkRiftSerializable;
use crate::writer::DarkRiftWriter;

const COMMAND_FLAG: u8 = 0b1000_0000;
const PING_FLAG: u8 = 0b0100_0000;
const ACKNOWLEDGEMENT_FLAG: u8 = 0b0010_0000;

const HEADER_LENGTH: usize = 3;
const PING_HEADER_LENGTH: usize = 5;

/// A payload paired with a 16-bit tag.
///
/// Tags are opaque to this crate; applications use them to tell message
/// types apart. Cloning a message is shallow and shares the payload memory.
///
/// # Examples
///
/// ```rust
/// use darkrift::{CacheSettings, DarkRiftWriter, Message, ObjectCache};
///
/// let cache = ObjectCache::new(CacheSettings::default())?;
/// let mut writer = DarkRiftWriter::create(&cache);
/// writer.write_i32(-1);
///
/// let message = Message::create(12, writer);
/// let framed = message.to_buffer();
/// assert_eq!(framed.as_slice(), &[0, 0, 12, 0xFF, 0xFF, 0xFF, 0xFF]);
///
/// let received = Message::from_buffer(framed)?;
/// assert_eq!(received.tag(), 12);
/// assert_eq!(received.get_reader().read_i32()?, -1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Message {
    tag: u16,
    flags: u8,
    ping_code: u16,
    buffer: MessageBuffer,
}

impl Message {
    /// Creates a message that takes over the writer's bytes without copying.
    pub fn create(tag: u16, writer: DarkRiftWriter) -> Self {
        Self::with_buffer(tag, writer.to_buffer())
    }

    /// Creates a message with no payload.
    pub fn create_empty(cache: &ObjectCache, tag: u16) -> Self {
        Self::with_buffer(tag, MessageBuffer::from_slice(cache, &[]))
    }

    /// Creates a message whose payload is `value` serialized.
    pub fn create_from<T: DarkRiftSerializable>(cache: &ObjectCache, tag: u16, value: &T) -> Self {
        let mut writer = DarkRiftWriter::create(cache);
        writer.write_serializable(value);
        Self::create(tag, writer)
    }

    /// Parses a framed message received from the transport.
    ///
    /// The payload is a view into `buffer`; nothing is copied.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::HeaderTooShort`] if `buffer` cannot hold the
    /// header its flags announce.
    pub fn from_buffer(buffer: MessageBuffer) -> Result<Self, MessageError> {
        let bytes = buffer.as_slice();
        let length = bytes.len();
        if length < HEADER_LENGTH {
            return Err(MessageError::HeaderTooShort {
                length,
                required: HEADER_LENGTH,
            });
        }

        let flags = bytes[0];
        let tag = u16::from_be_bytes([bytes[1], bytes[2]]);

        let (header_length, ping_code) = if flags & PING_FLAG != 0 {
            if length < PING_HEADER_LENGTH {
                return Err(MessageError::HeaderTooShort {
                    length,
                    required: PING_HEADER_LENGTH,
                });
            }
            (PING_HEADER_LENGTH, u16::from_be_bytes([bytes[3], bytes[4]]))
        } else {
            (HEADER_LENGTH, 0)
        };

        Ok(Self {
            tag,
            flags,
            ping_code,
            buffer: buffer.advance(header_length),
        })
    }

    fn with_buffer(tag: u16, buffer: MessageBuffer) -> Self {
        Self {
            tag,
            flags: 0,
            ping_code: 0,
            buffer,
        }
    }

    /// A reader over the payload. The message keeps ownership and can hand
    /// out any number of readers.
    pub fn get_reader(&self) -> DarkRiftReader<'_> {
        DarkRiftReader::new(&self.buffer)
    }

    /// Replaces the payload with the writer's bytes.
    pub fn serialize(&mut self, writer: DarkRiftWriter) {
        self.buffer = writer.to_buffer();
    }

    /// Replaces the payload with `value` serialized.
    pub fn serialize_value<T: DarkRiftSerializable>(&mut self, value: &T) {
        let mut writer = DarkRiftWriter::create(self.buffer.cache());
        writer.write_serializable(value);
        self.serialize(writer);
    }

    /// Reads the whole payload as a `T`.
    pub fn deserialize<T: DarkRiftSerializable>(&self) -> Result<T, ReadError> {
        self.get_reader().read_serializable()
    }

    /// Discards the payload. Other clones sharing it are unaffected.
    pub fn empty(&mut self) {
        self.buffer = MessageBuffer::from_slice(self.buffer.cache(), &[]);
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn set_tag(&mut self, tag: u16) {
        self.tag = tag;
    }

    /// Payload length in bytes, excluding the header.
    pub fn data_length(&self) -> usize {
        self.buffer.count()
    }

    /// The payload.
    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn is_command_message(&self) -> bool {
        self.flags & COMMAND_FLAG != 0
    }

    pub fn set_command_message(&mut self, command: bool) {
        if command {
            self.flags |= COMMAND_FLAG;
        } else {
            self.flags &= !COMMAND_FLAG;
        }
    }

    pub fn is_ping_message(&self) -> bool {
        self.flags & PING_FLAG != 0 && self.flags & ACKNOWLEDGEMENT_FLAG == 0
    }

    pub fn is_ping_acknowledgement_message(&self) -> bool {
        self.flags & PING_FLAG != 0 && self.flags & ACKNOWLEDGEMENT_FLAG != 0
    }

    /// Marks this message as a ping with a fresh random code.
    pub fn make_ping_message(&mut self) {
        self.flags = (self.flags | PING_FLAG) & !ACKNOWLEDGEMENT_FLAG;
        self.ping_code = rand::random();
    }

    /// Marks this message as the acknowledgement of `ping`, copying its code.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::NotAPing`] if `ping` is not a ping message.
    pub fn make_ping_acknowledgement_message(&mut self, ping: &Message) -> Result<(), MessageError> {
        if !ping.is_ping_message() {
            return Err(MessageError::NotAPing);
        }
        self.flags |= PING_FLAG | ACKNOWLEDGEMENT_FLAG;
        self.ping_code = ping.ping_code;
        Ok(())
    }

    /// Code pairing a ping with its acknowledgement; `0` for other messages.
    pub fn ping_code(&self) -> u16 {
        self.ping_code
    }

    /// Frames the message for the transport, copying the payload behind the
    /// header into a new pooled buffer.
    pub fn to_buffer(&self) -> MessageBuffer {
        let has_ping = self.flags & PING_FLAG != 0;
        let header_length = if has_ping { PING_HEADER_LENGTH } else { HEADER_LENGTH };

        let mut writer =
            DarkRiftWriter::with_capacity(self.buffer.cache(), header_length + self.data_length());
        writer.write_u8(self.flags);
        writer.write_u16(self.tag);
        if has_ping {
            writer.write_u16(self.ping_code);
        }
        writer.write_raw(self.buffer.as_slice());
        writer.to_buffer()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message with tag '{}' and {} bytes of data.",
            self.tag,
            self.data_length()
        )
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("tag", &self.tag)
            .field("flags", &format_args!("{:#010b}", self.flags))
            .field("ping_code", &self.ping_code)
            .field("data_length", &self.data_length())
            .finish()
    }
}
