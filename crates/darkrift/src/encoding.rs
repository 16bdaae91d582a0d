//! Text encodings for length-prefixed strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Encoding used for string payloads. The length prefix always counts
/// encoded bytes, not characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// UTF-16 little-endian code units. The default wire encoding.
    #[default]
    Utf16Le,
    Utf8,
}

impl Encoding {
    /// Number of bytes `value` occupies once encoded.
    pub fn byte_count(self, value: &str) -> usize {
        match self {
            Encoding::Utf16Le => value.encode_utf16().count() * 2,
            Encoding::Utf8 => value.len(),
        }
    }

    /// Encodes `value` into `out`, which must be exactly
    /// [`byte_count`](Self::byte_count) bytes long.
    pub(crate) fn encode_into(self, value: &str, out: &mut [u8]) {
        match self {
            Encoding::Utf16Le => {
                for (unit, slot) in value.encode_utf16().zip(out.chunks_exact_mut(2)) {
                    slot.copy_from_slice(&unit.to_le_bytes());
                }
            }
            Encoding::Utf8 => out.copy_from_slice(value.as_bytes()),
        }
    }

    /// Decodes `bytes`, returning `None` when they are not valid in this
    /// encoding.
    pub(crate) fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return None;
                }
                let units = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .collect::<Result<String, _>>()
                    .ok()
            }
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf16Le => f.write_str("UTF-16LE"),
            Encoding::Utf8 => f.write_str("UTF-8"),
        }
    }
}
