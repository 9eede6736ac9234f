//! vecdex - Embedded exact vector index with crash-safe persistence
//!
//! vecdex stores fixed-dimension `f32` vectors with optional scalar metadata
//! and answers exact k-nearest-neighbor queries under squared L2 distance or
//! cosine similarity. The index lives in memory and is persisted as an
//! atomically replaced snapshot file.
//!
//! # Quick Start
//!
//! ```no_run
//! use vecdex::{DistanceMetric, IndexConfig, IndexEngine};
//!
//! # fn main() -> vecdex::VecdexResult<()> {
//! let config = IndexConfig::new(3, DistanceMetric::L2, "data/index.vdx");
//! let engine = IndexEngine::open(config)?;
//!
//! let id = engine.add_vector(None, &[0.1, 0.2, 0.3], None)?;
//! let hits = engine.search(&[0.1, 0.2, 0.3], 5)?;
//! assert_eq!(hits[0].id, id);
//!
//! engine.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `vecdex-core`: identifiers, metrics, metadata, records, errors
//! - `vecdex-durability`: snapshot format, crash-safe writer, reader
//! - `vecdex-engine`: store, search, lifecycle, background flusher
//!
//! Only the engine-level API is re-exported here.

pub use vecdex_core::{
    metadata_from_json, metadata_to_json, DistanceMetric, Metadata, MetadataValue, VecdexError,
    VecdexResult, VectorId, VectorRecord, MAX_DIMENSION,
};
pub use vecdex_durability::SnapshotInfo;
pub use vecdex_engine::{
    EngineState, EngineStats, IndexConfig, IndexEngine, RecoveryStats, SearchHit,
    CONFIG_FILE_NAME,
};
