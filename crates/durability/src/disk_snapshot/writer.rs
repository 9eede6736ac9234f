//! Crash-safe snapshot writer
//!
//! Uses write-fsync-rename pattern for atomic snapshot replacement.
//!
//! # Crash Safety
//!
//! 1. Write to a temporary sibling (`.index.vdx.000007.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename over the snapshot path
//! 4. fsync the parent directory
//!
//! Either the complete new snapshot is visible at the snapshot path or the
//! previous one still is. A failed or cancelled write removes its temporary
//! file and leaves the previous snapshot untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

use vecdex_core::VectorRecord;

use crate::codec::write_record;
use crate::format::SnapshotHeader;

/// Records written between deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 1024;

/// Snapshot writer with crash-safe semantics
pub struct SnapshotWriter {
    snapshot_path: PathBuf,
}

impl SnapshotWriter {
    /// Create a new snapshot writer for the given snapshot path
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn new(snapshot_path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(SnapshotWriter { snapshot_path })
    }

    /// Get the snapshot path
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Path of the temporary file used while writing `sequence`
    pub fn temp_path(&self, sequence: u64) -> PathBuf {
        let name = file_name(&self.snapshot_path);
        self.snapshot_path
            .with_file_name(format!(".{}.{:06}.tmp", name, sequence))
    }

    /// Write a snapshot using the crash-safe write pattern
    ///
    /// `records` must be in ascending id order and match `header.record_count`.
    /// If `deadline` passes before the rename, the temporary file is removed
    /// and `SnapshotWriteError::DeadlineExceeded` is returned.
    pub fn write(
        &self,
        header: SnapshotHeader,
        records: &[VectorRecord],
        deadline: Option<Instant>,
    ) -> Result<SnapshotInfo, SnapshotWriteError> {
        debug_assert_eq!(header.record_count, records.len() as u64);
        debug_assert!(records.windows(2).all(|w| w[0].id < w[1].id));

        let temp_path = self.temp_path(header.sequence);
        let result = self.write_temp(&temp_path, &header, records, deadline);

        let (crc, bytes) = match result {
            Ok(written) => written,
            Err(e) => {
                // Nothing was renamed; the previous snapshot is still authoritative
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        self.publish(&temp_path, header.sequence, sync_parent_dir)?;

        Ok(SnapshotInfo {
            sequence: header.sequence,
            record_count: header.record_count,
            path: self.snapshot_path.clone(),
            bytes,
            crc,
        })
    }

    /// Rename the finished temp file over the snapshot, then sync the directory
    fn publish(
        &self,
        temp_path: &Path,
        sequence: u64,
        sync_dir: fn(&Path) -> io::Result<()>,
    ) -> Result<(), SnapshotWriteError> {
        if let Err(e) = fs::rename(temp_path, &self.snapshot_path) {
            let _ = fs::remove_file(temp_path);
            return Err(SnapshotWriteError::io("rename", e));
        }

        // The rename already published the snapshot; an error now must not
        // make the caller reuse this sequence for a retry
        if let Err(e) = sync_dir(&self.snapshot_path) {
            warn!(
                target: "vecdex::durability",
                path = %self.snapshot_path.display(),
                sequence,
                error = %e,
                "Snapshot directory sync failed after rename"
            );
        }
        Ok(())
    }

    fn write_temp(
        &self,
        temp_path: &Path,
        header: &SnapshotHeader,
        records: &[VectorRecord],
        deadline: Option<Instant>,
    ) -> Result<(u32, u64), SnapshotWriteError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(temp_path)
            .map_err(|e| SnapshotWriteError::io("create temp", e))?;

        let mut out = CrcWriter::new(BufWriter::new(file));
        out.write_all(&header.to_bytes())
            .map_err(|e| SnapshotWriteError::io("write header", e))?;

        for (i, record) in records.iter().enumerate() {
            if i % DEADLINE_CHECK_INTERVAL == 0 {
                check_deadline(deadline)?;
            }
            write_record(&mut out, record).map_err(|e| SnapshotWriteError::io("write record", e))?;
        }

        // Footer CRC covers header and all records
        let crc = out.hasher.clone().finalize();
        let body_len = out.written;
        let mut buffered = out.inner;
        buffered
            .write_all(&crc.to_le_bytes())
            .map_err(|e| SnapshotWriteError::io("write footer", e))?;

        let file = buffered
            .into_inner()
            .map_err(|e| SnapshotWriteError::io("flush", e.into_error()))?;
        check_deadline(deadline)?;
        file.sync_all()
            .map_err(|e| SnapshotWriteError::io("fsync", e))?;
        drop(file);
        check_deadline(deadline)?;

        Ok((crc, body_len + 4))
    }

    /// Remove temporary files left behind by interrupted writes
    ///
    /// Should be called during recovery, before any new flush.
    pub fn cleanup_temp_files(&self) -> io::Result<usize> {
        let dir = match self.snapshot_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            return Ok(0);
        }

        let prefix = format!(".{}.", file_name(&self.snapshot_path));
        let mut count = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".tmp") {
                fs::remove_file(entry.path())?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Check if a temporary file exists for a given sequence
    pub fn temp_file_exists(&self, sequence: u64) -> bool {
        self.temp_path(sequence).exists()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string())
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), SnapshotWriteError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(SnapshotWriteError::DeadlineExceeded),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Write adapter that checksums everything passing through it
struct CrcWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> CrcWriter<W> {
    fn new(inner: W) -> Self {
        CrcWriter {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Information about a written snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Flush sequence number stored in the header
    pub sequence: u64,
    /// Number of records in the snapshot
    pub record_count: u64,
    /// Path of the snapshot file
    pub path: PathBuf,
    /// Total file size in bytes
    pub bytes: u64,
    /// Footer CRC32 of the snapshot contents
    pub crc: u32,
}

/// Errors that can occur while writing a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotWriteError {
    /// I/O failure at the named stage
    #[error("snapshot {stage} failed: {source}")]
    Io {
        /// Write stage that failed
        stage: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The deadline passed before the snapshot was published
    #[error("snapshot write deadline exceeded")]
    DeadlineExceeded,
}

impl SnapshotWriteError {
    fn io(stage: &'static str, source: io::Error) -> Self {
        SnapshotWriteError::Io { stage, source }
    }
}
