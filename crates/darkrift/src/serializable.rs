//! User types that serialize themselves.

use crate::error::ReadError;
use crate::reader::DarkRiftReader;
use crate::writer::DarkRiftWriter;

/// A type that knows how to write itself to a [`DarkRiftWriter`] and read
/// itself back from a [`DarkRiftReader`].
///
/// `deserialize` must read exactly the fields `serialize` wrote, in the same
/// order. A failed `deserialize` called through
/// [`DarkRiftReader::read_serializable`] leaves the reader's position
/// untouched.
///
/// # Examples
///
/// ```rust
/// use darkrift::{DarkRiftReader, DarkRiftSerializable, DarkRiftWriter, ReadError};
///
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl DarkRiftSerializable for Position {
///     fn serialize(&self, writer: &mut DarkRiftWriter) {
///         writer.write_f32(self.x);
///         writer.write_f32(self.y);
///     }
///
///     fn deserialize(reader: &mut DarkRiftReader<'_>) -> Result<Self, ReadError> {
///         Ok(Self {
///             x: reader.read_f32()?,
///             y: reader.read_f32()?,
///         })
///     }
/// }
/// ```
pub trait DarkRiftSerializable: Sized {
    fn serialize(&self, writer: &mut DarkRiftWriter);

    fn deserialize(reader: &mut DarkRiftReader<'_>) -> Result<Self, ReadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ObjectCache;
    use crate::settings::CacheSettings;

    #[derive(Debug, PartialEq)]
    struct Player {
        id: u16,
        name: String,
        alive: bool,
    }

    impl DarkRiftSerializable for Player {
        fn serialize(&self, writer: &mut DarkRiftWriter) {
            writer.write_u16(self.id);
            writer.write_string(&self.name);
            writer.write_bool(self.alive);
        }

        fn deserialize(reader: &mut DarkRiftReader<'_>) -> Result<Self, ReadError> {
            let id = reader.read_u16()?;
            if id == 0 {
                return Err(ReadError::custom("player id 0 is reserved"));
            }
            Ok(Self {
                id,
                name: reader.read_string()?,
                alive: reader.read_bool()?,
            })
        }
    }

    #[test]
    fn test_serializable_array_round_trip() {
        let cache = ObjectCache::new(CacheSettings::default()).unwrap();
        let players = vec![
            Player { id: 1, name: "Ada".into(), alive: true },
            Player { id: 2, name: "Lin".into(), alive: false },
        ];

        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_serializables(&players);
        let bytes = writer.to_vec();

        let mut reader = DarkRiftReader::from_slice(&bytes);
        assert_eq!(reader.read_serializables::<Player>().unwrap(), players);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_failed_deserialize_rewinds() {
        let cache = ObjectCache::new(CacheSettings::default()).unwrap();
        let mut writer = DarkRiftWriter::create(&cache);
        writer.write_serializable(&Player { id: 0, name: "x".into(), alive: true });
        let bytes = writer.to_vec();

        let mut reader = DarkRiftReader::from_slice(&bytes);
        assert_eq!(
            reader.read_serializable::<Player>(),
            Err(ReadError::Custom("player id 0 is reserved".into()))
        );
        assert_eq!(reader.position(), 0);
    }
}
