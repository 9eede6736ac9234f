//! The stored unit of an index

use crate::metadata::Metadata;
use crate::types::VectorId;
use serde::{Deserialize, Serialize};

/// A vector with its identifier and optional metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Record identifier (unique within an index)
    pub id: VectorId,
    /// Vector components; length equals the index dimension
    pub vector: Vec<f32>,
    /// Opaque metadata carried through, never interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorRecord {
    /// Create a new record
    pub fn new(id: VectorId, vector: Vec<f32>, metadata: Option<Metadata>) -> Self {
        VectorRecord {
            id,
            vector,
            metadata,
        }
    }

    /// Dimension of this record's vector
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}
