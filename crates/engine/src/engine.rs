//! IndexEngine: the public façade
//!
//! Composes the record store, the searcher and the persistence manager, and
//! owns the concurrency discipline and lifecycle:
//!
//! - Searches share the store read lock; add/remove/clear take the write lock
//! - A flush copies the records under the read lock, then serializes and
//!   writes with no store lock held
//! - A flush mutex orders flushes so newer content always gets a higher
//!   sequence number
//! - Every operation holds a shared lifecycle guard; shutdown takes it
//!   exclusively, which waits for in-flight operations to drain

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};
use vecdex_core::{
    validate_metadata, DistanceMetric, Metadata, VecdexError, VecdexResult, VectorId,
    VectorRecord,
};
use vecdex_durability::{PersistenceManager, SnapshotInfo};

use crate::background::Flusher;
use crate::config::IndexConfig;
use crate::index::{l2_confidence, SimilaritySearcher, VectorStore};
use crate::lifecycle::EngineState;

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Record identifier
    pub id: VectorId,
    /// Squared L2 distance or cosine similarity, per the engine metric
    pub score: f32,
    /// For L2, `max(0, 1 - score / distance_normalization_factor)`; `None`
    /// for cosine
    pub confidence: Option<f32>,
    /// Metadata stored with the record
    pub metadata: Option<Metadata>,
}

/// Outcome of [`IndexEngine::startup_recover`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records restored from the snapshot
    pub records_loaded: usize,
    /// Sequence of the snapshot loaded, if one existed
    pub snapshot_sequence: Option<u64>,
    /// Next id the engine will allocate
    pub next_id: u64,
    /// Stale temp files removed before loading
    pub temp_files_removed: usize,
    /// Wall time spent recovering
    pub elapsed: Duration,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    /// Lifecycle state
    pub state: EngineState,
    /// Number of records
    pub records: usize,
    /// Vector dimension
    pub dimension: usize,
    /// Scoring metric
    pub metric: DistanceMetric,
    /// Sequence of the latest snapshot written or loaded
    pub last_snapshot_sequence: Option<u64>,
    /// Mutations exist that no snapshot contains yet
    pub dirty: bool,
    /// Flush attempts that failed since the engine was created, retries
    /// included
    pub failed_flush_attempts: u64,
    /// Snapshot file location
    pub snapshot_path: PathBuf,
}

struct EngineInner {
    config: IndexConfig,
    state: RwLock<EngineState>,
    store: RwLock<VectorStore>,
    searcher: SimilaritySearcher,
    persistence: PersistenceManager,
    /// Held across copy + write so snapshot order matches content order
    flush_lock: Mutex<()>,
    /// Store version captured by the latest successful flush or recovery
    flushed_version: AtomicU64,
    failed_flush_attempts: AtomicU64,
}

/// Exact vector index with snapshot persistence
///
/// Construct with [`IndexEngine::open`] (recover and start the flusher) or
/// [`IndexEngine::new`] followed by [`IndexEngine::startup_recover`]. Share
/// across threads with `Arc<IndexEngine>`.
pub struct IndexEngine {
    inner: Arc<EngineInner>,
    flusher: Mutex<Option<Flusher>>,
}

impl IndexEngine {
    /// Create an engine in the `Uninitialized` state
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid, `Io` if the snapshot
    /// directory cannot be created.
    pub fn new(config: IndexConfig) -> VecdexResult<Self> {
        config.validate()?;
        let store = VectorStore::new(config.dimension)?;
        let persistence =
            PersistenceManager::new(&config.snapshot_path, config.dimension, config.metric)?;

        Ok(IndexEngine {
            inner: Arc::new(EngineInner {
                searcher: SimilaritySearcher::new(config.metric),
                state: RwLock::new(EngineState::Uninitialized),
                store: RwLock::new(store),
                persistence,
                flush_lock: Mutex::new(()),
                flushed_version: AtomicU64::new(0),
                failed_flush_attempts: AtomicU64::new(0),
                config,
            }),
            flusher: Mutex::new(None),
        })
    }

    /// Create, recover and start the background flusher if configured
    ///
    /// # Errors
    ///
    /// Any construction error, or the recovery error (`CorruptSnapshot`,
    /// `Io`) that left the engine `Failed`.
    pub fn open(config: IndexConfig) -> VecdexResult<Self> {
        let engine = Self::new(config)?;
        engine.startup_recover()?;
        engine.start_flusher()?;
        Ok(engine)
    }

    fn start_flusher(&self) -> VecdexResult<()> {
        let Some(interval) = self.inner.config.flush_interval() else {
            return Ok(());
        };
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let flusher = Flusher::spawn(interval, move || match weak.upgrade() {
            Some(inner) => inner.background_flush(),
            None => false,
        })
        .map_err(|e| VecdexError::io("spawning flusher thread", e))?;
        *self.flusher.lock() = Some(flusher);
        Ok(())
    }

    fn stop_flusher(&self) {
        let flusher = self.flusher.lock().take();
        if let Some(flusher) = flusher {
            flusher.stop();
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.inner.state.read()
    }

    /// Engine configuration
    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    /// Rebuild the store from the latest snapshot and become `Ready`
    ///
    /// With no snapshot the engine starts empty. A snapshot that fails
    /// validation, or an I/O failure while reading it, moves the engine to
    /// `Failed` and returns the error.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the engine is not `Uninitialized`.
    pub fn startup_recover(&self) -> VecdexResult<RecoveryStats> {
        {
            let mut state = self.inner.state.write();
            if *state != EngineState::Uninitialized {
                return Err(VecdexError::invalid_argument(format!(
                    "startup_recover requires an uninitialized engine (state: {})",
                    *state
                )));
            }
            *state = EngineState::Recovering;
        }

        let started = Instant::now();
        info!(
            target: "vecdex::engine",
            path = %self.inner.persistence.snapshot_path().display(),
            dimension = self.inner.config.dimension,
            metric = %self.inner.config.metric,
            "Recovering index"
        );

        match self.inner.recover(started) {
            Ok(stats) => {
                *self.inner.state.write() = EngineState::Ready;
                info!(
                    target: "vecdex::engine",
                    records = stats.records_loaded,
                    sequence = ?stats.snapshot_sequence,
                    elapsed_ms = stats.elapsed.as_millis() as u64,
                    "Recovery complete"
                );
                Ok(stats)
            }
            Err(e) => {
                *self.inner.state.write() = EngineState::Failed;
                error!(target: "vecdex::engine", error = %e, "Recovery failed");
                Err(e)
            }
        }
    }

    /// Drain operations, write a final snapshot and stop
    ///
    /// Returns the final snapshot, or `None` when nothing was written: the
    /// engine was never recovered, is already shutting down or stopped, or
    /// is `Failed` (the existing snapshot is left untouched).
    ///
    /// # Errors
    ///
    /// `EngineNotReady` while recovering. A failed final save moves the
    /// engine to `Failed` and is returned.
    pub fn shutdown(&self) -> VecdexResult<Option<SnapshotInfo>> {
        {
            let mut state = self.inner.state.write();
            match *state {
                EngineState::Ready => *state = EngineState::ShuttingDown,
                EngineState::Uninitialized => {
                    *state = EngineState::Stopped;
                    return Ok(None);
                }
                EngineState::Recovering => {
                    return Err(VecdexError::EngineNotReady {
                        state: state.to_string(),
                    })
                }
                EngineState::ShuttingDown | EngineState::Stopped | EngineState::Failed => {
                    return Ok(None)
                }
            }
        }
        info!(target: "vecdex::engine", "Shutting down");

        // The flusher takes the lifecycle read lock, so stop it before
        // holding the write lock across the final save
        self.stop_flusher();

        let mut state = self.inner.state.write();
        match self.inner.flush_with_retries(None) {
            Ok(info) => {
                *state = EngineState::Stopped;
                info!(target: "vecdex::engine", sequence = info.sequence, "Shutdown complete");
                Ok(Some(info))
            }
            Err(e) => {
                *state = EngineState::Failed;
                error!(target: "vecdex::engine", error = %e, "Final save failed");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Insert or overwrite a record; returns its id
    ///
    /// Without `id` the next unused identifier is assigned. The record is
    /// durable after the next successful flush.
    pub fn add_vector(
        &self,
        id: Option<VectorId>,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> VecdexResult<VectorId> {
        let _guard = self.inner.ready()?;
        if let Some(meta) = &metadata {
            validate_metadata(meta)?;
        }

        let mut store = self.inner.store.write();
        store.validate_vector(vector)?;
        let id = match id {
            Some(id) => id,
            None => store.allocate_id()?,
        };
        let outcome = store.add(id, vector, metadata)?;
        drop(store);

        debug!(target: "vecdex::engine", %id, replaced = outcome.is_replaced(), "Vector added");
        Ok(id)
    }

    /// The `min(k, len)` best records for `query`
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` for a wrong-length query; `InvalidArgument` for
    /// `k == 0` or non-finite query components.
    pub fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<SearchHit>> {
        let _guard = self.inner.ready()?;
        let store = self.inner.store.read();
        let ranked = self.inner.searcher.search(&store, query, k)?;
        let metric = self.inner.config.metric;
        let factor = self.inner.config.distance_normalization_factor;
        Ok(ranked
            .into_iter()
            .map(|(id, score)| SearchHit {
                id,
                score,
                confidence: metric.is_distance().then(|| l2_confidence(score, factor)),
                metadata: store.metadata(id).cloned(),
            })
            .collect())
    }

    /// Remove a record; `false` if it did not exist
    pub fn remove_vector(&self, id: VectorId) -> VecdexResult<bool> {
        let _guard = self.inner.ready()?;
        let removed = self.inner.store.write().remove(id);
        debug!(target: "vecdex::engine", %id, removed, "Vector removed");
        Ok(removed)
    }

    /// Copy of a record
    pub fn get_vector(&self, id: VectorId) -> VecdexResult<Option<VectorRecord>> {
        let _guard = self.inner.ready()?;
        Ok(self.inner.store.read().get(id))
    }

    /// Remove every record; returns how many were removed
    ///
    /// Identifiers keep increasing afterwards.
    pub fn clear(&self) -> VecdexResult<usize> {
        let _guard = self.inner.ready()?;
        let removed = self.inner.store.write().clear();
        info!(target: "vecdex::engine", removed, "Index cleared");
        Ok(removed)
    }

    /// Write a snapshot of the current contents
    ///
    /// I/O failures are retried per the configured policy; the previous
    /// snapshot stays intact on failure.
    pub fn save(&self) -> VecdexResult<SnapshotInfo> {
        let _guard = self.inner.ready()?;
        self.inner.flush_with_retries(None)
    }

    /// Like [`save`](Self::save), but give up after `timeout`
    ///
    /// # Errors
    ///
    /// `FlushTimedOut` if the deadline passes; the partial write is
    /// discarded and the previous snapshot stays authoritative.
    pub fn save_with_timeout(&self, timeout: Duration) -> VecdexResult<SnapshotInfo> {
        let _guard = self.inner.ready()?;
        self.inner.flush_with_retries(Some(timeout))
    }

    // ========================================================================
    // Introspection (available in every state)
    // ========================================================================

    /// Number of records
    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.inner.config.dimension
    }

    /// Scoring metric
    pub fn metric(&self) -> DistanceMetric {
        self.inner.config.metric
    }

    /// True if mutations exist that no snapshot contains yet
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> EngineStats {
        let state = self.state();
        let records = self.len();
        EngineStats {
            state,
            records,
            dimension: self.dimension(),
            metric: self.metric(),
            last_snapshot_sequence: self.inner.persistence.last_sequence(),
            dirty: self.is_dirty(),
            failed_flush_attempts: self.inner.failed_flush_attempts.load(Ordering::Relaxed),
            snapshot_path: self.inner.persistence.snapshot_path().to_path_buf(),
        }
    }
}

impl Drop for IndexEngine {
    fn drop(&mut self) {
        self.stop_flusher();
        if self.state() == EngineState::Ready && self.is_dirty() {
            warn!(
                target: "vecdex::engine",
                "Engine dropped with unsaved changes; call shutdown() to persist them"
            );
        }
    }
}

impl std::fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine")
            .field("state", &self.state())
            .field("records", &self.len())
            .field("dimension", &self.dimension())
            .field("metric", &self.metric())
            .finish()
    }
}

impl EngineInner {
    /// Shared lifecycle guard, or `EngineNotReady`
    fn ready(&self) -> VecdexResult<RwLockReadGuard<'_, EngineState>> {
        let state = self.state.read();
        if state.accepts_operations() {
            Ok(state)
        } else {
            Err(VecdexError::EngineNotReady {
                state: state.to_string(),
            })
        }
    }

    fn is_dirty(&self) -> bool {
        self.store.read().version() != self.flushed_version.load(Ordering::Acquire)
    }

    fn recover(&self, started: Instant) -> VecdexResult<RecoveryStats> {
        let temp_files_removed = if self.config.cleanup_temp_on_recover {
            self.persistence.cleanup_temp_files()?
        } else {
            0
        };

        let (store, snapshot_sequence) = match self.persistence.load()? {
            Some(loaded) => {
                let sequence = loaded.sequence();
                let next_id = loaded.next_id();
                let store = VectorStore::from_records(self.config.dimension, loaded.records, next_id)
                    .map_err(|e| {
                        // Records that pass the checksum but not store validation
                        VecdexError::corrupt(self.persistence.snapshot_path(), e.to_string())
                    })?;
                (store, Some(sequence))
            }
            None => (VectorStore::new(self.config.dimension)?, None),
        };

        let stats = RecoveryStats {
            records_loaded: store.len(),
            snapshot_sequence,
            next_id: store.next_id(),
            temp_files_removed,
            elapsed: started.elapsed(),
        };
        self.flushed_version.store(store.version(), Ordering::Release);
        *self.store.write() = store;
        Ok(stats)
    }

    /// Flush, retrying I/O failures with linear backoff
    ///
    /// Callers hold the lifecycle guard (shared or exclusive).
    fn flush_with_retries(&self, timeout: Option<Duration>) -> VecdexResult<SnapshotInfo> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let _flush = self.flush_lock.lock();

        let (records, next_id, version) = {
            let store = self.store.read();
            (store.records(), store.next_id(), store.version())
        };

        let mut attempt: u32 = 0;
        loop {
            let result = match (deadline, timeout) {
                (Some(deadline), Some(timeout)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        Err(VecdexError::FlushTimedOut { timeout })
                    } else {
                        self.persistence
                            .flush_with_deadline(&records, next_id, remaining)
                            .map_err(|e| match e {
                                VecdexError::FlushTimedOut { .. } => {
                                    VecdexError::FlushTimedOut { timeout }
                                }
                                other => other,
                            })
                    }
                }
                _ => self.persistence.flush(&records, next_id),
            };

            if result.is_err() {
                self.failed_flush_attempts.fetch_add(1, Ordering::Relaxed);
            }
            match result {
                Ok(info) => {
                    self.flushed_version.fetch_max(version, Ordering::AcqRel);
                    return Ok(info);
                }
                Err(e) if e.is_retryable() && attempt < self.config.flush_retries => {
                    attempt += 1;
                    let backoff = self.config.retry_backoff(attempt);
                    warn!(
                        target: "vecdex::engine",
                        attempt,
                        max_retries = self.config.flush_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Flush failed, retrying"
                    );
                    thread::sleep(backoff);
                }
                Err(e) => {
                    warn!(target: "vecdex::engine", attempts = attempt + 1, error = %e, "Flush failed");
                    return Err(e);
                }
            }
        }
    }

    /// One flusher tick; `false` stops the flusher
    fn background_flush(&self) -> bool {
        let state = self.state.read();
        match *state {
            EngineState::Ready => {}
            EngineState::Uninitialized | EngineState::Recovering => return true,
            EngineState::ShuttingDown | EngineState::Stopped | EngineState::Failed => {
                return false
            }
        }
        if !self.is_dirty() {
            return true;
        }
        match self.flush_with_retries(None) {
            Ok(info) => {
                debug!(target: "vecdex::engine", sequence = info.sequence, "Background flush complete");
            }
            Err(e) => {
                error!(target: "vecdex::engine", error = %e, "Background flush failed");
            }
        }
        true
    }
}
