use bytes::Bytes;

use crate::{Metadata, ParseError, Parser, PayloadType, ProfileRecord, ProfileType};

/// Magic bytes at the start of every recording chunk.
const CHUNK_MAGIC: &[u8; 4] = b"FLR\0";

/// Size of a chunk header in bytes.
const CHUNK_HEADER_SIZE: usize = 68;

/// Header of a single chunk in a Java Flight Recorder recording.
///
/// All fields are stored big endian directly after the magic bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkHeader {
    /// Major version of the chunk format. Versions `1` and `2` are supported.
    pub major: u16,
    /// Minor version of the chunk format.
    pub minor: u16,
    /// Total size of the chunk including this header.
    pub chunk_size: u64,
    /// Offset of the constant pool relative to the chunk start.
    pub constant_pool_offset: u64,
    /// Offset of the metadata event relative to the chunk start.
    pub metadata_offset: u64,
    /// Wall clock start of the chunk in nanoseconds since the epoch.
    pub start_nanos: u64,
    /// Duration covered by the chunk in nanoseconds.
    pub duration_nanos: u64,
}

impl ChunkHeader {
    /// Reads and validates the chunk header at `offset`.
    fn read(data: &[u8], offset: usize) -> Result<Self, ParseError> {
        let header = data
            .get(offset..offset + CHUNK_HEADER_SIZE)
            .ok_or(ParseError::TruncatedHeader { offset })?;

        if &header[..4] != CHUNK_MAGIC {
            return Err(ParseError::InvalidMagic { offset });
        }

        let u16_at = |pos: usize| u16::from_be_bytes([header[pos], header[pos + 1]]);
        let u64_at = |pos: usize| {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&header[pos..pos + 8]);
            u64::from_be_bytes(bytes)
        };

        let chunk = Self {
            major: u16_at(4),
            minor: u16_at(6),
            chunk_size: u64_at(8),
            constant_pool_offset: u64_at(16),
            metadata_offset: u64_at(24),
            start_nanos: u64_at(32),
            duration_nanos: u64_at(40),
        };

        if !matches!(chunk.major, 1 | 2) {
            return Err(ParseError::UnsupportedVersion {
                major: chunk.major,
                minor: chunk.minor,
            });
        }

        let available = (data.len() - offset) as u64;
        if chunk.chunk_size < CHUNK_HEADER_SIZE as u64 || chunk.chunk_size > available {
            return Err(ParseError::InvalidChunkSize {
                offset,
                size: chunk.chunk_size,
            });
        }

        if chunk.constant_pool_offset >= chunk.chunk_size
            || chunk.metadata_offset >= chunk.chunk_size
        {
            return Err(ParseError::InvalidChunkOffsets { offset });
        }

        Ok(chunk)
    }
}

/// Reads the headers of all chunks in a recording.
pub fn read_chunks(data: &[u8]) -> Result<Vec<ChunkHeader>, ParseError> {
    let mut chunks = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let chunk = ChunkHeader::read(data, offset)?;
        offset += chunk.chunk_size as usize;
        chunks.push(chunk);
    }

    Ok(chunks)
}

/// Parser for Java Flight Recorder recordings.
///
/// The recording is validated chunk by chunk and forwarded as a single record. Conversion of the
/// contained events into samples happens downstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct JfrParser;

impl Parser for JfrParser {
    fn parse(&self, payload: &[u8], metadata: &Metadata) -> Result<Vec<ProfileRecord>, ParseError> {
        let chunks = read_chunks(payload)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        ember_log::trace!(
            chunks = chunks.len(),
            sample_rate = metadata.sample_rate_hertz,
            "parsed jfr recording"
        );

        Ok(vec![ProfileRecord {
            payload: Bytes::copy_from_slice(payload),
            payload_type: PayloadType::Jfr,
            profile_type: ProfileType {
                kind: "jfr".to_owned(),
                sample_types: Vec::new(),
                sample_units: Vec::new(),
                period_type: "cpu".to_owned(),
                period_unit: "nanoseconds".to_owned(),
            },
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(major: u16, size: u64, start_nanos: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(CHUNK_MAGIC);
        data.extend_from_slice(&major.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(&(CHUNK_HEADER_SIZE as u64).to_be_bytes());
        data.extend_from_slice(&(CHUNK_HEADER_SIZE as u64).to_be_bytes());
        data.extend_from_slice(&start_nanos.to_be_bytes());
        data.extend_from_slice(&1_000_000_000u64.to_be_bytes());
        data.resize(size as usize, 0);
        data
    }

    #[test]
    fn test_read_chunks() {
        let mut data = chunk(2, 100, 1);
        data.extend(chunk(2, 80, 2));

        let chunks = read_chunks(&data).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_size, 100);
        assert_eq!(chunks[1].start_nanos, 2);
        assert_eq!(chunks[1].duration_nanos, 1_000_000_000);
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = chunk(2, 100, 1);
        data[0] = b'X';
        assert!(matches!(
            read_chunks(&data),
            Err(ParseError::InvalidMagic { offset: 0 })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let data = chunk(3, 100, 1);
        assert_eq!(
            read_chunks(&data).unwrap_err().to_string(),
            "unsupported recording version 3.0"
        );
    }

    #[test]
    fn test_chunk_exceeds_payload() {
        let mut data = chunk(1, 100, 1);
        data.truncate(90);
        assert!(matches!(
            read_chunks(&data),
            Err(ParseError::InvalidChunkSize {
                offset: 0,
                size: 100
            })
        ));
    }

    #[test]
    fn test_truncated_second_chunk() {
        let mut data = chunk(2, 100, 1);
        data.extend_from_slice(b"FLR\0");
        assert!(matches!(
            read_chunks(&data),
            Err(ParseError::TruncatedHeader { offset: 100 })
        ));
    }

    #[test]
    fn test_parse_recording() {
        let data = chunk(2, 100, 1);
        let records = JfrParser
            .parse(
                &data,
                &Metadata {
                    sample_rate_hertz: 100,
                },
            )
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], &data[..]);
        assert_eq!(records[0].payload_type, PayloadType::Jfr);
        assert_eq!(records[0].profile_type.kind, "jfr");
        assert_eq!(records[0].profile_type.period_unit, "nanoseconds");
    }

    #[test]
    fn test_parse_empty() {
        let records = JfrParser.parse(&[], &Metadata::default()).unwrap();
        assert!(records.is_empty());
    }
}
