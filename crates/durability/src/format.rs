//! Snapshot file header.
//!
//! # Binary Format (44 bytes, little-endian)
//!
//! ```text
//! magic("VDXS", 4) + format_version(4) + dimension(4) + metric(1) + reserved(3)
//! + sequence(8) + next_id(8) + record_count(8) + header_crc32(4) = 44 bytes
//! ```
//!
//! The header is followed by `record_count` records in ascending id order
//! (see [`crate::codec`]) and a trailing CRC32 over every preceding byte.

use byteorder::{ByteOrder, LittleEndian};
use vecdex_core::DistanceMetric;

/// Magic bytes identifying a snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"VDXS";

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Total size of a serialized `SnapshotHeader` in bytes, including its CRC.
pub const SNAPSHOT_HEADER_SIZE: usize = 44;

/// Size of the trailing body CRC32.
pub const SNAPSHOT_FOOTER_SIZE: usize = 4;

const HEADER_CRC_OFFSET: usize = SNAPSHOT_HEADER_SIZE - 4;

/// Fixed snapshot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Format version the file was written with.
    pub format_version: u32,
    /// Vector dimension of every record.
    pub dimension: u32,
    /// Metric the index was built for.
    pub metric: DistanceMetric,
    /// Monotonically increasing flush sequence number.
    pub sequence: u64,
    /// Next identifier the engine would allocate.
    pub next_id: u64,
    /// Number of records following the header.
    pub record_count: u64,
}

impl SnapshotHeader {
    /// Create a header for the current format version.
    pub fn new(
        dimension: u32,
        metric: DistanceMetric,
        sequence: u64,
        next_id: u64,
        record_count: u64,
    ) -> Self {
        SnapshotHeader {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension,
            metric,
            sequence,
            next_id,
            record_count,
        }
    }

    /// Serialize to the 44-byte on-disk form with header CRC.
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_HEADER_SIZE] {
        let mut buf = [0u8; SNAPSHOT_HEADER_SIZE];
        buf[0..4].copy_from_slice(SNAPSHOT_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.format_version);
        LittleEndian::write_u32(&mut buf[8..12], self.dimension);
        buf[12] = self.metric.to_byte();
        // bytes 13..16 reserved, zero
        LittleEndian::write_u64(&mut buf[16..24], self.sequence);
        LittleEndian::write_u64(&mut buf[24..32], self.next_id);
        LittleEndian::write_u64(&mut buf[32..40], self.record_count);

        let crc = crc32fast::hash(&buf[..HEADER_CRC_OFFSET]);
        LittleEndian::write_u32(&mut buf[HEADER_CRC_OFFSET..], crc);
        buf
    }

    /// Deserialize from bytes, validating magic, header CRC, version and metric.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SnapshotHeaderError> {
        if data.len() < SNAPSHOT_HEADER_SIZE {
            return Err(SnapshotHeaderError::TooShort {
                expected: SNAPSHOT_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotHeaderError::InvalidMagic {
                actual: [data[0], data[1], data[2], data[3]],
            });
        }

        let stored_crc = LittleEndian::read_u32(&data[HEADER_CRC_OFFSET..SNAPSHOT_HEADER_SIZE]);
        let computed_crc = crc32fast::hash(&data[..HEADER_CRC_OFFSET]);
        if stored_crc != computed_crc {
            return Err(SnapshotHeaderError::ChecksumMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        let format_version = LittleEndian::read_u32(&data[4..8]);
        if format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotHeaderError::UnsupportedVersion(format_version));
        }

        let metric = DistanceMetric::from_byte(data[12])
            .ok_or(SnapshotHeaderError::UnknownMetric(data[12]))?;

        Ok(SnapshotHeader {
            format_version,
            dimension: LittleEndian::read_u32(&data[8..12]),
            metric,
            sequence: LittleEndian::read_u64(&data[16..24]),
            next_id: LittleEndian::read_u64(&data[24..32]),
            record_count: LittleEndian::read_u64(&data[32..40]),
        })
    }

    /// Encoded size of one record, excluding its metadata blob.
    pub fn fixed_record_size(&self) -> usize {
        8 + 4 * self.dimension as usize + 4
    }
}

/// Errors decoding a snapshot header.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotHeaderError {
    /// Data too short to contain a header.
    #[error("header too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Required size.
        expected: usize,
        /// Available size.
        actual: usize,
    },

    /// Magic bytes do not match `SNAPSHOT_MAGIC`.
    #[error("invalid magic {actual:?}")]
    InvalidMagic {
        /// Magic bytes found.
        actual: [u8; 4],
    },

    /// Header CRC does not match its contents.
    #[error("header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC stored in the file.
        stored: u32,
        /// CRC computed over the header bytes.
        computed: u32,
    },

    /// Format version this build cannot read.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    /// Metric byte outside the known set.
    #[error("unknown metric identifier {0}")]
    UnknownMetric(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SnapshotHeader {
        SnapshotHeader::new(128, DistanceMetric::Cosine, 7, 42, 3)
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), SNAPSHOT_HEADER_SIZE);
        assert_eq!(SnapshotHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], b"VDXS");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 128);
        assert_eq!(bytes[12], 1);
        assert_eq!(&bytes[13..16], &[0, 0, 0]);
        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 7);
        assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), 42);
        assert_eq!(u64::from_le_bytes(bytes[32..40].try_into().unwrap()), 3);
    }

    #[test]
    fn test_header_too_short() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes[..20]),
            Err(SnapshotHeaderError::TooShort { actual: 20, .. })
        ));
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(SnapshotHeaderError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_header_bit_flip_detected() {
        let mut bytes = sample().to_bytes();
        bytes[9] ^= 0x01;
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(SnapshotHeaderError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_header_unsupported_version() {
        let mut header = sample();
        header.format_version = 99;
        let bytes = header.to_bytes();
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(SnapshotHeaderError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_fixed_record_size() {
        assert_eq!(sample().fixed_record_size(), 8 + 512 + 4);
    }
}
