//! Snapshot reader for recovery
//!
//! Loads and validates snapshot files. Any validation failure rejects the
//! whole file; a partially valid snapshot is never returned.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use vecdex_core::{DistanceMetric, VectorRecord};

use crate::codec::{read_record, CodecError};
use crate::format::{
    SnapshotHeader, SnapshotHeaderError, SNAPSHOT_FOOTER_SIZE, SNAPSHOT_HEADER_SIZE,
};

/// Snapshot reader for recovery
pub struct SnapshotReader {
    path: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
}

impl SnapshotReader {
    /// Create a reader expecting the given dimension and metric
    pub fn new(path: PathBuf, dimension: usize, metric: DistanceMetric) -> Self {
        SnapshotReader {
            path,
            dimension,
            metric,
        }
    }

    /// Get the snapshot path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot
    ///
    /// Returns `Ok(None)` if no snapshot file exists.
    pub fn load(&self) -> Result<Option<LoadedSnapshot>, SnapshotReadError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SnapshotReadError::Io(e)),
        };
        self.decode(&data).map(Some)
    }

    /// Validate and decode snapshot bytes
    pub fn decode(&self, data: &[u8]) -> Result<LoadedSnapshot, SnapshotReadError> {
        if data.len() < SNAPSHOT_HEADER_SIZE + SNAPSHOT_FOOTER_SIZE {
            return Err(SnapshotReadError::FileTooSmall { size: data.len() });
        }

        let header = SnapshotHeader::from_bytes(&data[..SNAPSHOT_HEADER_SIZE])?;

        if header.dimension as usize != self.dimension {
            return Err(SnapshotReadError::DimensionMismatch {
                expected: self.dimension,
                actual: header.dimension as usize,
            });
        }
        if header.metric != self.metric {
            return Err(SnapshotReadError::MetricMismatch {
                expected: self.metric,
                actual: header.metric,
            });
        }

        // Footer CRC covers everything before it
        let body_end = data.len() - SNAPSHOT_FOOTER_SIZE;
        let stored_crc = LittleEndian::read_u32(&data[body_end..]);
        let computed_crc = crc32fast::hash(&data[..body_end]);
        if stored_crc != computed_crc {
            return Err(SnapshotReadError::CrcMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let body = &data[..body_end];
        let available = (body.len() - SNAPSHOT_HEADER_SIZE) as u64;
        let min_needed = header
            .record_count
            .checked_mul(header.fixed_record_size() as u64);
        match min_needed {
            Some(needed) if needed <= available => {}
            _ => {
                return Err(SnapshotReadError::RecordCountTooLarge {
                    count: header.record_count,
                    available,
                })
            }
        }

        let mut cursor = Cursor::new(body);
        cursor.set_position(SNAPSHOT_HEADER_SIZE as u64);

        let mut records: Vec<VectorRecord> = Vec::with_capacity(header.record_count as usize);
        for index in 0..header.record_count {
            let record = read_record(&mut cursor, self.dimension)
                .map_err(|source| SnapshotReadError::Record { index, source })?;

            if let Some(prev) = records.last() {
                if record.id <= prev.id {
                    return Err(SnapshotReadError::OutOfOrder {
                        previous: prev.id.as_u64(),
                        id: record.id.as_u64(),
                    });
                }
            }
            records.push(record);
        }

        let trailing = body.len() - cursor.position() as usize;
        if trailing != 0 {
            return Err(SnapshotReadError::TrailingBytes(trailing));
        }

        if let Some(last) = records.last() {
            if header.next_id <= last.id.as_u64() {
                return Err(SnapshotReadError::NextIdTooSmall {
                    next_id: header.next_id,
                    max_id: last.id.as_u64(),
                });
            }
        }

        Ok(LoadedSnapshot { header, records })
    }
}

/// Loaded snapshot data
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// Validated header
    pub header: SnapshotHeader,
    /// Records in ascending id order
    pub records: Vec<VectorRecord>,
}

impl LoadedSnapshot {
    /// Flush sequence number of this snapshot
    pub fn sequence(&self) -> u64 {
        self.header.sequence
    }

    /// Next identifier to allocate after restoring this snapshot
    pub fn next_id(&self) -> u64 {
        self.header.next_id
    }
}

/// Snapshot read errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotReadError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File too small to hold a header and footer
    #[error("File too small: {size} bytes")]
    FileTooSmall {
        /// Actual file size
        size: usize,
    },

    /// Header failed validation
    #[error("Invalid header: {0}")]
    Header(#[from] SnapshotHeaderError),

    /// Snapshot dimension differs from the configured one
    #[error("Dimension mismatch: expected {expected}, snapshot has {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Dimension in the snapshot
        actual: usize,
    },

    /// Snapshot metric differs from the configured one
    #[error("Metric mismatch: expected {expected}, snapshot has {actual}")]
    MetricMismatch {
        /// Configured metric
        expected: DistanceMetric,
        /// Metric in the snapshot
        actual: DistanceMetric,
    },

    /// Footer CRC mismatch
    #[error("CRC mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    CrcMismatch {
        /// CRC stored in the footer
        expected: u32,
        /// CRC computed over the contents
        actual: u32,
    },

    /// Declared record count cannot fit in the file
    #[error("Record count {count} does not fit in {available} bytes")]
    RecordCountTooLarge {
        /// Declared count
        count: u64,
        /// Bytes available for records
        available: u64,
    },

    /// A record failed to decode
    #[error("Record {index}: {source}")]
    Record {
        /// Position of the record in the file
        index: u64,
        /// Decode failure
        #[source]
        source: CodecError,
    },

    /// Record ids not strictly ascending
    #[error("Record id {id} follows {previous}")]
    OutOfOrder {
        /// Preceding id
        previous: u64,
        /// Offending id
        id: u64,
    },

    /// Bytes between the last record and the footer
    #[error("{0} trailing bytes after last record")]
    TrailingBytes(usize),

    /// Header next_id does not exceed the largest stored id
    #[error("next_id {next_id} must exceed largest id {max_id}")]
    NextIdTooSmall {
        /// next_id from the header
        next_id: u64,
        /// Largest stored id
        max_id: u64,
    },
}

impl SnapshotReadError {
    /// Check if this error means the file contents are invalid
    ///
    /// Everything except an I/O failure is corruption.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, SnapshotReadError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_record;
    use crate::disk_snapshot::SnapshotWriter;
    use vecdex_core::{Metadata, VectorId};

    fn sample_records() -> Vec<VectorRecord> {
        let mut meta = Metadata::new();
        meta.insert("label".into(), "b".into());
        vec![
            VectorRecord::new(VectorId::new(1), vec![0.0, 0.0], None),
            VectorRecord::new(VectorId::new(2), vec![1.0, 0.0], Some(meta)),
            VectorRecord::new(VectorId::new(7), vec![0.5, -2.0], None),
        ]
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("index.vdx");
        let writer = SnapshotWriter::new(path.clone()).unwrap();
        let records = sample_records();
        let header = SnapshotHeader::new(2, DistanceMetric::L2, 3, 8, records.len() as u64);
        writer.write(header, &records, None).unwrap();
        path
    }

    /// Build raw snapshot bytes with a valid footer
    fn raw_snapshot(header: SnapshotHeader, records: &[VectorRecord], extra: &[u8]) -> Vec<u8> {
        let mut data = header.to_bytes().to_vec();
        for record in records {
            write_record(&mut data, record).unwrap();
        }
        data.extend_from_slice(extra);
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        data
    }

    #[test]
    fn test_load_written_snapshot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_sample(temp_dir.path());

        let reader = SnapshotReader::new(path, 2, DistanceMetric::L2);
        let loaded = reader.load().unwrap().unwrap();

        assert_eq!(loaded.sequence(), 3);
        assert_eq!(loaded.next_id(), 8);
        assert_eq!(loaded.records, sample_records());
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let reader = SnapshotReader::new(temp_dir.path().join("absent.vdx"), 2, DistanceMetric::L2);
        assert!(reader.load().unwrap().is_none());
    }

    #[test]
    fn test_truncated_file_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_sample(temp_dir.path());
        let data = std::fs::read(&path).unwrap();

        let reader = SnapshotReader::new(path.clone(), 2, DistanceMetric::L2);
        for cut in [10, SNAPSHOT_HEADER_SIZE, data.len() - 1] {
            let err = reader.decode(&data[..cut]).unwrap_err();
            assert!(err.is_corruption(), "cut at {}: {}", cut, err);
        }
    }

    #[test]
    fn test_bit_flip_in_records_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_sample(temp_dir.path());
        let mut data = std::fs::read(&path).unwrap();
        data[SNAPSHOT_HEADER_SIZE + 9] ^= 0x40;

        let reader = SnapshotReader::new(path, 2, DistanceMetric::L2);
        assert!(matches!(
            reader.decode(&data),
            Err(SnapshotReadError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_sample(temp_dir.path());
        let reader = SnapshotReader::new(path, 3, DistanceMetric::L2);
        assert!(matches!(
            reader.load(),
            Err(SnapshotReadError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_metric_mismatch_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_sample(temp_dir.path());
        let reader = SnapshotReader::new(path, 2, DistanceMetric::Cosine);
        assert!(matches!(
            reader.load(),
            Err(SnapshotReadError::MetricMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![
            VectorRecord::new(VectorId::new(4), vec![1.0], None),
            VectorRecord::new(VectorId::new(4), vec![2.0], None),
        ];
        let data = raw_snapshot(SnapshotHeader::new(1, DistanceMetric::L2, 1, 5, 2), &records, &[]);
        let reader = SnapshotReader::new(PathBuf::from("x"), 1, DistanceMetric::L2);
        assert!(matches!(
            reader.decode(&data),
            Err(SnapshotReadError::OutOfOrder { previous: 4, id: 4 })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let records = vec![VectorRecord::new(VectorId::new(1), vec![1.0], None)];
        let data = raw_snapshot(
            SnapshotHeader::new(1, DistanceMetric::L2, 1, 2, 1),
            &records,
            &[0xAA, 0xBB],
        );
        let reader = SnapshotReader::new(PathBuf::from("x"), 1, DistanceMetric::L2);
        assert!(matches!(
            reader.decode(&data),
            Err(SnapshotReadError::TrailingBytes(2))
        ));
    }

    #[test]
    fn test_next_id_must_exceed_max_id() {
        let records = vec![VectorRecord::new(VectorId::new(9), vec![1.0], None)];
        let data = raw_snapshot(SnapshotHeader::new(1, DistanceMetric::L2, 1, 9, 1), &records, &[]);
        let reader = SnapshotReader::new(PathBuf::from("x"), 1, DistanceMetric::L2);
        assert!(matches!(
            reader.decode(&data),
            Err(SnapshotReadError::NextIdTooSmall { .. })
        ));
    }

    #[test]
    fn test_huge_record_count_rejected_before_allocation() {
        let data = raw_snapshot(
            SnapshotHeader::new(4, DistanceMetric::L2, 1, 1, u64::MAX / 2),
            &[],
            &[],
        );
        let reader = SnapshotReader::new(PathBuf::from("x"), 4, DistanceMetric::L2);
        assert!(matches!(
            reader.decode(&data),
            Err(SnapshotReadError::RecordCountTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_snapshot_loads() {
        let data = raw_snapshot(SnapshotHeader::new(4, DistanceMetric::Cosine, 2, 1, 0), &[], &[]);
        let reader = SnapshotReader::new(PathBuf::from("x"), 4, DistanceMetric::Cosine);
        let loaded = reader.decode(&data).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.sequence(), 2);
    }
}
