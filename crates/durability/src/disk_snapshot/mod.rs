//! On-disk snapshot files
//!
//! - `writer`: crash-safe write-fsync-rename publication
//! - `reader`: validating loader used during recovery

mod reader;
mod writer;

pub use reader::{LoadedSnapshot, SnapshotReadError, SnapshotReader};
pub use writer::{SnapshotInfo, SnapshotWriteError, SnapshotWriter};
