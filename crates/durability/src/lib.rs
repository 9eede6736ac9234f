//! Durability layer for vecdex
//!
//! This crate handles everything that touches disk:
//!
//! - Snapshot binary format (header, records, footer CRC)
//! - Crash-safe snapshot writer (write-fsync-rename)
//! - Validating snapshot reader for recovery
//! - `PersistenceManager`: flush sequencing and error mapping

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Record and metadata encoding
pub mod disk_snapshot; // Crash-safe snapshot I/O
pub mod format; // Snapshot header layout
pub mod manager; // Flush/load coordination

// === Re-exports ===
pub use disk_snapshot::{
    LoadedSnapshot, SnapshotInfo, SnapshotReadError, SnapshotReader, SnapshotWriteError,
    SnapshotWriter,
};
pub use format::{
    SnapshotHeader, SnapshotHeaderError, SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE,
    SNAPSHOT_MAGIC,
};
pub use manager::PersistenceManager;
