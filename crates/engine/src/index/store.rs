//! Vector Store - Contiguous embedding storage
//!
//! VectorStore keeps every embedding in one contiguous Vec<f32> for
//! cache-friendly scans. A BTreeMap from id to slot gives deterministic,
//! ascending-id iteration.
//!
//! # Invariants
//!
//! - Every stored vector has exactly `dimension` finite components
//! - `slots` is the sole source of truth for live records
//! - Storage slots are reused after removal; identifiers handed out by
//!   `allocate_id` are never reused
//! - `next_id` is always greater than every id ever inserted

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use vecdex_core::{
    validate_metadata, Metadata, VecdexError, VecdexResult, VectorId, VectorRecord,
    MAX_DIMENSION,
};

/// Outcome of [`VectorStore::add`]
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// The id was not present
    Inserted,
    /// An existing record was overwritten
    Replaced {
        /// Metadata the record carried before the overwrite
        previous_metadata: Option<Metadata>,
    },
}

impl Upsert {
    /// True if an existing record was overwritten
    pub fn is_replaced(&self) -> bool {
        matches!(self, Upsert::Replaced { .. })
    }
}

/// Borrowed view of one stored record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordRef<'a> {
    /// Record identifier
    pub id: VectorId,
    /// Vector components
    pub vector: &'a [f32],
    /// Metadata, if any
    pub metadata: Option<&'a Metadata>,
}

impl RecordRef<'_> {
    /// Copy into an owned record
    pub fn to_record(&self) -> VectorRecord {
        VectorRecord::new(self.id, self.vector.to_vec(), self.metadata.cloned())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    /// Offset into `data`, in floats
    offset: usize,
    metadata: Option<Metadata>,
}

/// In-memory record collection with a fixed dimension
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,

    /// Layout: [v0_c0, v0_c1, ..., v0_cN, v1_c0, ...]
    data: Vec<f32>,

    /// VectorId -> slot; BTreeMap for ascending-id iteration
    slots: BTreeMap<VectorId, Slot>,

    /// Offsets of removed slots, available for reuse
    free_slots: Vec<usize>,

    /// Next id `allocate_id` hands out
    next_id: AtomicU64,

    /// Bumped on every mutation
    version: AtomicU64,
}

impl VectorStore {
    /// Create an empty store
    ///
    /// Fails `InvalidArgument` if `dimension` is 0 or exceeds `MAX_DIMENSION`.
    pub fn new(dimension: usize) -> VecdexResult<Self> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(VecdexError::invalid_argument(format!(
                "dimension must be between 1 and {}, got {}",
                MAX_DIMENSION, dimension
            )));
        }
        Ok(VectorStore {
            dimension,
            data: Vec::new(),
            slots: BTreeMap::new(),
            free_slots: Vec::new(),
            next_id: AtomicU64::new(1),
            version: AtomicU64::new(0),
        })
    }

    /// Rebuild a store from recovered records
    ///
    /// `next_id` is raised if needed so it exceeds every restored id.
    pub fn from_records(
        dimension: usize,
        records: Vec<VectorRecord>,
        next_id: u64,
    ) -> VecdexResult<Self> {
        let mut store = VectorStore::new(dimension)?;
        store.data.reserve(records.len() * dimension);
        for record in records {
            store.add(record.id, &record.vector, record.metadata)?;
        }
        store.raise_next_id(next_id);
        store.version.store(0, Ordering::Release);
        Ok(store)
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Mutation counter
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Next id `allocate_id` would return
    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Allocate a new id (monotonically increasing, never reused)
    ///
    /// # Errors
    ///
    /// `InvalidArgument` once the id space is exhausted; `next_id` never
    /// wraps and the reserved id `u64::MAX` is never handed out.
    pub fn allocate_id(&self) -> VecdexResult<VectorId> {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (current < u64::MAX).then_some(current + 1)
            })
            .map(VectorId::new)
            .map_err(|_| VecdexError::invalid_argument("vector id space exhausted"))
    }

    fn raise_next_id(&self, at_least: u64) {
        let mut current = self.next_id.load(Ordering::Relaxed);
        while current < at_least {
            match self.next_id.compare_exchange(
                current,
                at_least,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Check a vector against the dimension and finiteness rules
    pub fn validate_vector(&self, vector: &[f32]) -> VecdexResult<()> {
        if vector.len() != self.dimension {
            return Err(VecdexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        if let Some(pos) = vector.iter().position(|c| !c.is_finite()) {
            return Err(VecdexError::invalid_argument(format!(
                "component {} is not finite ({})",
                pos, vector[pos]
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert or overwrite a record (upsert)
    ///
    /// Validation happens before any mutation; a rejected call leaves the
    /// store unchanged.
    pub fn add(
        &mut self,
        id: VectorId,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> VecdexResult<Upsert> {
        self.validate_vector(vector)?;
        if id.as_u64() == u64::MAX {
            return Err(VecdexError::invalid_argument(format!(
                "id {} is reserved",
                u64::MAX
            )));
        }
        if let Some(meta) = &metadata {
            validate_metadata(meta)?;
        }
        let metadata = metadata.filter(|m| !m.is_empty());

        let outcome = if let Some(slot) = self.slots.get_mut(&id) {
            let offset = slot.offset;
            self.data[offset..offset + self.dimension].copy_from_slice(vector);
            let previous_metadata = std::mem::replace(&mut slot.metadata, metadata);
            Upsert::Replaced { previous_metadata }
        } else {
            let offset = if let Some(offset) = self.free_slots.pop() {
                self.data[offset..offset + self.dimension].copy_from_slice(vector);
                offset
            } else {
                let offset = self.data.len();
                self.data.extend_from_slice(vector);
                offset
            };
            self.slots.insert(id, Slot { offset, metadata });
            Upsert::Inserted
        };

        self.raise_next_id(id.as_u64() + 1);
        self.version.fetch_add(1, Ordering::Release);
        Ok(outcome)
    }

    /// Remove a record
    ///
    /// Returns true if it existed. The slot is zeroed and queued for reuse.
    pub fn remove(&mut self, id: VectorId) -> bool {
        match self.slots.remove(&id) {
            Some(slot) => {
                self.data[slot.offset..slot.offset + self.dimension].fill(0.0);
                self.free_slots.push(slot.offset);
                self.version.fetch_add(1, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Remove every record
    ///
    /// `next_id` is NOT reset; ids are never reused.
    pub fn clear(&mut self) -> usize {
        let removed = self.slots.len();
        self.data.clear();
        self.slots.clear();
        self.free_slots.clear();
        self.version.fetch_add(1, Ordering::Release);
        removed
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a copy of a record
    pub fn get(&self, id: VectorId) -> Option<VectorRecord> {
        self.get_ref(id).map(|r| r.to_record())
    }

    /// Borrow a record
    pub fn get_ref(&self, id: VectorId) -> Option<RecordRef<'_>> {
        self.slots.get(&id).map(|slot| self.record_ref(id, slot))
    }

    /// Metadata of a record
    pub fn metadata(&self, id: VectorId) -> Option<&Metadata> {
        self.slots.get(&id).and_then(|slot| slot.metadata.as_ref())
    }

    /// Check if a record exists
    pub fn contains(&self, id: VectorId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Iterate records in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = RecordRef<'_>> + '_ {
        self.slots.iter().map(|(&id, slot)| self.record_ref(id, slot))
    }

    /// Owned copy of every record in ascending id order
    pub fn records(&self) -> Vec<VectorRecord> {
        self.iter().map(|r| r.to_record()).collect()
    }

    fn record_ref<'a>(&'a self, id: VectorId, slot: &'a Slot) -> RecordRef<'a> {
        RecordRef {
            id,
            vector: &self.data[slot.offset..slot.offset + self.dimension],
            metadata: slot.metadata.as_ref(),
        }
    }

    #[cfg(test)]
    fn raw_data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, value: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(key.to_string(), value.into());
        m
    }

    #[test]
    fn test_basic_operations() {
        let mut store = VectorStore::new(3).unwrap();

        let id = store.allocate_id().unwrap();
        assert_eq!(
            store.add(id, &[0.1, 0.2, 0.3], None).unwrap(),
            Upsert::Inserted
        );

        let record = store.get(id).unwrap();
        assert_eq!(record.vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(record.metadata, None);

        assert!(store.remove(id));
        assert!(store.get(id).is_none());
        assert!(!store.remove(id));
    }

    #[test]
    fn test_invalid_dimension_rejected() {
        assert!(VectorStore::new(0).unwrap_err().is_validation_error());
        assert!(VectorStore::new(MAX_DIMENSION + 1).is_err());
        assert!(VectorStore::new(MAX_DIMENSION).is_ok());
    }

    #[test]
    fn test_dimension_mismatch_leaves_store_unchanged() {
        let mut store = VectorStore::new(4).unwrap();
        store.add(VectorId::new(1), &[1.0; 4], None).unwrap();
        let version = store.version();

        let err = store.add(VectorId::new(2), &[1.0; 3], None).unwrap_err();
        assert!(matches!(
            err,
            VecdexError::DimensionMismatch {
                expected: 4,
                got: 3
            }
        ));
        assert_eq!(store.len(), 1);
        assert!(!store.contains(VectorId::new(2)));
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut store = VectorStore::new(2).unwrap();
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = store.add(VectorId::new(1), &[0.0, bad], None).unwrap_err();
            assert!(err.is_validation_error());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_overwrites_and_reports_previous_metadata() {
        let mut store = VectorStore::new(2).unwrap();
        let id = VectorId::new(7);

        store.add(id, &[1.0, 0.0], Some(meta("v", "1"))).unwrap();
        let outcome = store.add(id, &[0.0, 1.0], Some(meta("v", "2"))).unwrap();

        assert_eq!(
            outcome,
            Upsert::Replaced {
                previous_metadata: Some(meta("v", "1"))
            }
        );
        assert_eq!(store.len(), 1);
        let record = store.get(id).unwrap();
        assert_eq!(record.vector, vec![0.0, 1.0]);
        assert_eq!(record.metadata, Some(meta("v", "2")));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = VectorStore::new(2).unwrap();
        let id = VectorId::new(3);
        store.add(id, &[0.5, 0.5], Some(meta("k", "v"))).unwrap();
        let before = store.records();
        store.add(id, &[0.5, 0.5], Some(meta("k", "v"))).unwrap();
        assert_eq!(store.records(), before);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut store = VectorStore::new(2).unwrap();

        let id1 = store.allocate_id().unwrap();
        store.add(id1, &[1.0, 1.0], None).unwrap();
        store.remove(id1);

        let id2 = store.allocate_id().unwrap();
        store.add(id2, &[1.0, 1.0], None).unwrap();
        store.remove(id2);

        let id3 = store.allocate_id().unwrap();
        assert!(id1 < id2 && id2 < id3);
    }

    #[test]
    fn test_explicit_id_advances_next_id() {
        let mut store = VectorStore::new(1).unwrap();
        store.add(VectorId::new(100), &[1.0], None).unwrap();
        assert_eq!(store.next_id(), 101);
        assert_eq!(store.allocate_id().unwrap(), VectorId::new(101));

        // Lower explicit ids do not move it backwards
        store.add(VectorId::new(5), &[1.0], None).unwrap();
        assert_eq!(store.next_id(), 102);
    }

    #[test]
    fn test_reserved_id_rejected() {
        let mut store = VectorStore::new(1).unwrap();
        assert!(store.add(VectorId::new(u64::MAX), &[1.0], None).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_allocate_id_never_wraps() {
        let mut store = VectorStore::new(1).unwrap();
        store.add(VectorId::new(u64::MAX - 1), &[1.0], None).unwrap();
        assert_eq!(store.next_id(), u64::MAX);

        for _ in 0..3 {
            let err = store.allocate_id().unwrap_err();
            assert!(matches!(err, VecdexError::InvalidArgument(_)));
            assert_eq!(store.next_id(), u64::MAX);
        }
    }

    #[test]
    fn test_slot_reuse() {
        let mut store = VectorStore::new(4).unwrap();
        store.add(VectorId::new(1), &[0.1; 4], None).unwrap();
        let initial_len = store.raw_data().len();
        store.remove(VectorId::new(1));

        store.add(VectorId::new(2), &[0.2; 4], None).unwrap();
        assert_eq!(store.raw_data().len(), initial_len);
        assert_eq!(store.get(VectorId::new(2)).unwrap().vector, vec![0.2; 4]);
    }

    #[test]
    fn test_removed_slot_is_zeroed() {
        let mut store = VectorStore::new(3).unwrap();
        store.add(VectorId::new(1), &[0.5; 3], None).unwrap();
        store.remove(VectorId::new(1));
        assert!(store.raw_data().iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_iteration_in_id_order() {
        let mut store = VectorStore::new(1).unwrap();
        for id in [9, 2, 5, 1] {
            store.add(VectorId::new(id), &[id as f32], None).unwrap();
        }
        let ids: Vec<u64> = store.iter().map(|r| r.id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 5, 9]);
        assert_eq!(store.records()[2].vector, vec![5.0]);
    }

    #[test]
    fn test_clear_preserves_next_id() {
        let mut store = VectorStore::new(1).unwrap();
        let id = store.allocate_id().unwrap();
        store.add(id, &[1.0], None).unwrap();
        store.add(store.allocate_id().unwrap(), &[1.0], None).unwrap();
        let next_before = store.next_id();

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(store.next_id(), next_before);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn test_empty_metadata_stored_as_none() {
        let mut store = VectorStore::new(1).unwrap();
        store.add(VectorId::new(1), &[1.0], Some(Metadata::new())).unwrap();
        assert_eq!(store.get(VectorId::new(1)).unwrap().metadata, None);
    }

    #[test]
    fn test_from_records_restores_state() {
        let records = vec![
            VectorRecord::new(VectorId::new(2), vec![1.0, 2.0], Some(meta("a", "b"))),
            VectorRecord::new(VectorId::new(4), vec![3.0, 4.0], None),
        ];
        let store = VectorStore::from_records(2, records.clone(), 10).unwrap();

        assert_eq!(store.records(), records);
        assert_eq!(store.next_id(), 10);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_from_records_next_id_never_below_max_id() {
        let records = vec![VectorRecord::new(VectorId::new(50), vec![1.0], None)];
        let store = VectorStore::from_records(1, records, 3).unwrap();
        assert_eq!(store.next_id(), 51);
    }
}
