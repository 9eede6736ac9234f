//! Identifier and metric types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record identifier
///
/// Either supplied by the caller or allocated by the engine. Engine-allocated
/// identifiers are always greater than every identifier already inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(pub u64);

impl VectorId {
    /// Create a new VectorId
    pub fn new(id: u64) -> Self {
        VectorId(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VectorId {
    fn from(id: u64) -> Self {
        VectorId(id)
    }
}

/// Scoring function of an index
///
/// Fixed per engine instance at construction. Scores are NOT normalized to a
/// common direction: `L2` is a distance (lower is better), `Cosine` is a
/// similarity (higher is better). Use [`DistanceMetric::is_better`] to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance: sum((a_i - b_i)^2)
    /// Range: [0, inf), lower = more similar
    #[default]
    L2,

    /// Cosine similarity: dot(a,b) / (||a|| * ||b||)
    /// Range: [-1, 1], higher = more similar
    /// Zero-norm vectors score 0.0
    Cosine,
}

impl DistanceMetric {
    /// Human-readable name, also the configuration spelling
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Some(DistanceMetric::L2),
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }

    /// Serialization value for the snapshot header
    pub fn to_byte(&self) -> u8 {
        match self {
            DistanceMetric::L2 => 0,
            DistanceMetric::Cosine => 1,
        }
    }

    /// Deserialization from the snapshot header
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(DistanceMetric::L2),
            1 => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }

    /// True when lower scores rank first
    pub fn is_distance(&self) -> bool {
        matches!(self, DistanceMetric::L2)
    }

    /// True if score `a` ranks strictly ahead of score `b`
    pub fn is_better(&self, a: f32, b: f32) -> bool {
        if self.is_distance() {
            a < b
        } else {
            a > b
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
