//! Persistence manager
//!
//! Owns the snapshot path and the flush sequence counter. Serializes a
//! caller-provided copy of the records to a new snapshot and loads the latest
//! snapshot back during recovery. It never touches a live store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vecdex_core::{DistanceMetric, VecdexError, VecdexResult, VectorRecord};

use crate::disk_snapshot::{
    LoadedSnapshot, SnapshotInfo, SnapshotReadError, SnapshotReader, SnapshotWriteError,
    SnapshotWriter,
};
use crate::format::SnapshotHeader;

/// Writes and loads snapshots for one index
pub struct PersistenceManager {
    writer: SnapshotWriter,
    reader: SnapshotReader,
    dimension: usize,
    metric: DistanceMetric,
    /// Sequence for the next flush; holding the lock serializes flushes
    next_sequence: Mutex<u64>,
    /// Sequence of the latest snapshot written or loaded (0 = none)
    last_sequence: AtomicU64,
}

impl PersistenceManager {
    /// Create a manager for `snapshot_path`
    ///
    /// Creates the parent directory if needed.
    pub fn new(
        snapshot_path: impl Into<PathBuf>,
        dimension: usize,
        metric: DistanceMetric,
    ) -> VecdexResult<Self> {
        let snapshot_path = snapshot_path.into();
        if dimension == 0 || dimension > u32::MAX as usize {
            return Err(VecdexError::invalid_argument(format!(
                "dimension {} cannot be stored in a snapshot",
                dimension
            )));
        }
        let writer = SnapshotWriter::new(snapshot_path.clone()).map_err(|e| {
            VecdexError::io(
                format!("creating snapshot directory for {}", snapshot_path.display()),
                e,
            )
        })?;
        let reader = SnapshotReader::new(snapshot_path, dimension, metric);

        Ok(PersistenceManager {
            writer,
            reader,
            dimension,
            metric,
            next_sequence: Mutex::new(1),
            last_sequence: AtomicU64::new(0),
        })
    }

    /// Path of the live snapshot
    pub fn snapshot_path(&self) -> &Path {
        self.writer.snapshot_path()
    }

    /// Sequence of the latest snapshot written or loaded by this manager
    pub fn last_sequence(&self) -> Option<u64> {
        match self.last_sequence.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Write `records` as the new snapshot
    ///
    /// `records` must be in ascending id order with the manager's dimension;
    /// `next_id` is stored so restored engines never reuse identifiers.
    pub fn flush(&self, records: &[VectorRecord], next_id: u64) -> VecdexResult<SnapshotInfo> {
        self.flush_inner(records, next_id, None)
    }

    /// Write a snapshot, giving up if it takes longer than `timeout`
    ///
    /// On timeout the partial temporary file is removed, the previous
    /// snapshot stays authoritative and `FlushTimedOut` is returned.
    pub fn flush_with_deadline(
        &self,
        records: &[VectorRecord],
        next_id: u64,
        timeout: Duration,
    ) -> VecdexResult<SnapshotInfo> {
        self.flush_inner(records, next_id, Some((Instant::now() + timeout, timeout)))
    }

    fn flush_inner(
        &self,
        records: &[VectorRecord],
        next_id: u64,
        deadline: Option<(Instant, Duration)>,
    ) -> VecdexResult<SnapshotInfo> {
        debug_assert!(records.iter().all(|r| r.vector.len() == self.dimension));

        let mut next_sequence = self.next_sequence.lock();
        let sequence = *next_sequence;
        let header = SnapshotHeader::new(
            self.dimension as u32,
            self.metric,
            sequence,
            next_id,
            records.len() as u64,
        );

        let started = Instant::now();
        match self.writer.write(header, records, deadline.map(|(at, _)| at)) {
            Ok(info) => {
                *next_sequence = sequence + 1;
                self.last_sequence.store(sequence, Ordering::Release);
                info!(
                    target: "vecdex::durability",
                    sequence,
                    records = info.record_count,
                    bytes = info.bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Snapshot written"
                );
                Ok(info)
            }
            Err(SnapshotWriteError::DeadlineExceeded) => {
                let timeout = deadline.map(|(_, t)| t).unwrap_or_default();
                warn!(
                    target: "vecdex::durability",
                    sequence,
                    ?timeout,
                    "Snapshot write exceeded deadline, discarded"
                );
                Err(VecdexError::FlushTimedOut { timeout })
            }
            Err(SnapshotWriteError::Io { stage, source }) => Err(VecdexError::io(
                format!("snapshot {} for {}", stage, self.snapshot_path().display()),
                source,
            )),
        }
    }

    /// Load the latest snapshot
    ///
    /// Returns `Ok(None)` if none exists. A snapshot that exists but fails
    /// validation is `CorruptSnapshot`; it is never partially loaded.
    pub fn load(&self) -> VecdexResult<Option<LoadedSnapshot>> {
        let path = self.snapshot_path().to_path_buf();
        let loaded = match self.reader.load() {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                debug!(target: "vecdex::durability", path = %path.display(), "No snapshot found");
                return Ok(None);
            }
            Err(SnapshotReadError::Io(e)) => {
                return Err(VecdexError::io(
                    format!("reading snapshot {}", path.display()),
                    e,
                ))
            }
            Err(e) => return Err(VecdexError::corrupt(path, e.to_string())),
        };

        let sequence = loaded.sequence();
        {
            let mut next_sequence = self.next_sequence.lock();
            *next_sequence = (*next_sequence).max(sequence + 1);
        }
        self.last_sequence.store(sequence, Ordering::Release);

        info!(
            target: "vecdex::durability",
            path = %path.display(),
            sequence,
            records = loaded.records.len(),
            "Snapshot loaded"
        );
        Ok(Some(loaded))
    }

    /// Remove temporary files left behind by interrupted flushes
    pub fn cleanup_temp_files(&self) -> VecdexResult<usize> {
        let removed = self
            .writer
            .cleanup_temp_files()
            .map_err(|e| VecdexError::io("removing stale snapshot temp files", e))?;
        if removed > 0 {
            info!(target: "vecdex::durability", removed, "Removed stale snapshot temp files");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("snapshot_path", &self.snapshot_path())
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecdex_core::VectorId;

    fn record(id: u64, v: &[f32]) -> VectorRecord {
        VectorRecord::new(VectorId::new(id), v.to_vec(), None)
    }

    #[test]
    fn test_sequence_increments_per_flush() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager =
            PersistenceManager::new(temp_dir.path().join("index.vdx"), 2, DistanceMetric::L2)
                .unwrap();
        assert_eq!(manager.last_sequence(), None);

        let first = manager.flush(&[record(1, &[1.0, 2.0])], 2).unwrap();
        let second = manager.flush(&[record(1, &[1.0, 2.0])], 2).unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(manager.last_sequence(), Some(2));
    }

    #[test]
    fn test_load_resumes_sequence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("index.vdx");
        {
            let manager = PersistenceManager::new(&path, 2, DistanceMetric::L2).unwrap();
            for _ in 0..3 {
                manager.flush(&[record(4, &[0.0, 1.0])], 5).unwrap();
            }
        }

        let manager = PersistenceManager::new(&path, 2, DistanceMetric::L2).unwrap();
        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.sequence(), 3);
        assert_eq!(loaded.next_id(), 5);
        assert_eq!(manager.last_sequence(), Some(3));

        let info = manager.flush(&loaded.records, loaded.next_id()).unwrap();
        assert_eq!(info.sequence, 4);
    }

    #[test]
    fn test_load_absent_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager =
            PersistenceManager::new(temp_dir.path().join("index.vdx"), 8, DistanceMetric::Cosine)
                .unwrap();
        assert!(manager.load().unwrap().is_none());
        assert_eq!(manager.last_sequence(), None);
    }

    #[test]
    fn test_corrupt_snapshot_maps_to_corrupt_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("index.vdx");
        std::fs::write(&path, b"not a snapshot at all, just some bytes here").unwrap();

        let manager = PersistenceManager::new(&path, 2, DistanceMetric::L2).unwrap();
        let err = manager.load().unwrap_err();
        assert!(matches!(err, VecdexError::CorruptSnapshot { .. }), "{}", err);
    }

    #[test]
    fn test_flush_with_zero_timeout_times_out() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager =
            PersistenceManager::new(temp_dir.path().join("index.vdx"), 1, DistanceMetric::L2)
                .unwrap();
        manager.flush(&[record(1, &[1.0])], 2).unwrap();

        let err = manager
            .flush_with_deadline(&[record(1, &[2.0])], 2, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, VecdexError::FlushTimedOut { .. }));
        assert_eq!(manager.last_sequence(), Some(1));

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.records[0].vector, vec![1.0]);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = PersistenceManager::new(temp_dir.path().join("x.vdx"), 0, DistanceMetric::L2)
            .unwrap_err();
        assert!(err.is_validation_error());
    }
}
