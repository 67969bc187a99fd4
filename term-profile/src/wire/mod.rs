//! Binary wire format: protobuf messages and length-delimited framing.
//!
//! A profile file is laid out as
//!
//! ```text
//! varint(len) DatasetProfileHeader          <- header region
//! varint(len) ChunkHeader  ChunkMessage     <- chunk for column 0 (raw, ChunkHeader.length bytes)
//! varint(len) ChunkHeader  ChunkMessage     <- chunk for column 1
//! ...
//! ```
//!
//! Chunk offsets recorded in the header are relative to the first byte after the header.

pub mod messages;

use std::io::{Read, Write};

use prost::Message;

use crate::error::{ProfileError, Result};

pub use messages::{
    metric_component_message, ChunkHeader, ChunkMessage, ChunkOffsets, ChunkType, ColumnMessage,
    DatasetProfileHeader, DatasetProperties, KllLevelMessage, KllSketchMessage,
    MetricComponentMessage,
};

/// A varint never spans more than 10 bytes.
const MAX_VARINT_LEN: usize = 10;

/// Writes `msg` prefixed with its varint-encoded length. Returns the number of bytes written.
pub fn write_delimited<M: Message, W: Write>(writer: &mut W, msg: &M) -> Result<usize> {
    let buf = msg.encode_length_delimited_to_vec();
    writer.write_all(&buf)?;
    Ok(buf.len())
}

/// Reads a varint-length-delimited message.
///
/// Returns `Ok(None)` when the reader is exhausted before the first length byte, so callers
/// can tell "nothing there" apart from a corrupt message. The reader never advances past the
/// declared message length.
pub fn read_delimited<M: Message + Default, R: Read>(reader: &mut R) -> Result<Option<M>> {
    let Some(len) = read_varint(reader)? else {
        return Ok(None);
    };
    let len = usize::try_from(len)
        .map_err(|_| ProfileError::deserialization(format!("message length {len} too large")))?;

    let mut buf = Vec::with_capacity(len.min(1 << 20));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(ProfileError::deserialization(format!(
            "truncated message: expecting {len} bytes, got {}",
            buf.len()
        )));
    }

    Ok(Some(M::decode(buf.as_slice())?))
}

fn read_varint<R: Read>(reader: &mut R) -> Result<Option<u64>> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            if bytes.is_empty() {
                return Ok(None);
            }
            return Err(ProfileError::deserialization("truncated length prefix"));
        }
        bytes.push(byte[0]);
        if byte[0] & 0x80 == 0 {
            break;
        }
        if bytes.len() == MAX_VARINT_LEN {
            return Err(ProfileError::deserialization("length prefix is not a valid varint"));
        }
    }
    let value = prost::encoding::decode_varint(&mut bytes.as_slice())?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_delimited_round_trip() {
        let header = ChunkHeader {
            r#type: ChunkType::Column as i32,
            length: 300,
        };
        let mut buf = Vec::new();
        let written = write_delimited(&mut buf, &header).unwrap();
        assert_eq!(written, buf.len());

        let mut cursor = Cursor::new(buf);
        let decoded: ChunkHeader = read_delimited(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.r#type(), ChunkType::Column);

        // Exhausted reader.
        assert!(read_delimited::<ChunkHeader, _>(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_delimited_stops_at_declared_length() {
        let a = ChunkOffsets { offsets: vec![1, 2] };
        let b = ChunkOffsets { offsets: vec![3] };
        let mut buf = Vec::new();
        write_delimited(&mut buf, &a).unwrap();
        write_delimited(&mut buf, &b).unwrap();

        let mut cursor = Cursor::new(buf);
        let first: ChunkOffsets = read_delimited(&mut cursor).unwrap().unwrap();
        let second: ChunkOffsets = read_delimited(&mut cursor).unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(second, b);
    }

    #[test]
    fn test_truncated_message_is_rejected() {
        let offsets = ChunkOffsets {
            offsets: vec![10, 20, 30],
        };
        let mut buf = Vec::new();
        write_delimited(&mut buf, &offsets).unwrap();
        buf.truncate(buf.len() - 1);

        let err = read_delimited::<ChunkOffsets, _>(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ProfileError::Deserialization(_)));
    }

    #[test]
    fn test_unterminated_varint_is_rejected() {
        let err = read_delimited::<ChunkOffsets, _>(&mut Cursor::new(vec![0x80, 0x80])).unwrap_err();
        assert!(matches!(err, ProfileError::Deserialization(_)));
    }

    #[test]
    fn test_map_encoding_is_deterministic() {
        let mut first = DatasetProfileHeader::default();
        for (index, name) in [(2, "c"), (0, "a"), (1, "b")] {
            first.indexed_names.insert(index, name.to_string());
        }
        let mut second = DatasetProfileHeader::default();
        for (index, name) in [(0, "a"), (1, "b"), (2, "c")] {
            second.indexed_names.insert(index, name.to_string());
        }
        assert_eq!(first.encode_to_vec(), second.encode_to_vec());
    }
}
