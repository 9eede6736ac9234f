//! Vector index engine for vecdex
//!
//! This crate orchestrates the lower layers:
//! - VectorStore: contiguous in-memory record storage
//! - SimilaritySearcher: exact k-NN scan with deterministic ordering
//! - IndexEngine: concurrency discipline, lifecycle, persistence calls
//! - Background flusher for periodic snapshots
//! - Configuration via `vecdex.toml`
//!
//! The engine is the only component that knows about:
//! - Lifecycle gating (Uninitialized → Recovering → Ready → ShuttingDown → Stopped)
//! - When snapshots are taken

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod engine;
pub mod index;
pub mod lifecycle;

pub use config::{IndexConfig, CONFIG_FILE_NAME};
pub use engine::{EngineStats, IndexEngine, RecoveryStats, SearchHit};
pub use index::{RecordRef, SimilaritySearcher, Upsert, VectorStore};
pub use lifecycle::EngineState;
