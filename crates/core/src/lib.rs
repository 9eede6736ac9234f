//! Core types for vecdex
//!
//! This crate defines the foundational types shared by the durability and
//! engine crates:
//! - VectorId: caller-supplied or engine-assigned record identifier
//! - DistanceMetric: the fixed scoring function of an index (`l2`, `cosine`)
//! - MetadataValue / Metadata: tagged scalar metadata carried with a record
//! - VectorRecord: the stored unit
//! - VecdexError: error type hierarchy
//! - Limits: hard bounds enforced at validation time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod metadata;
pub mod record;
pub mod types;

pub use error::{VecdexError, VecdexResult};
pub use limits::{
    MAX_DIMENSION, MAX_METADATA_ENTRIES, MAX_METADATA_KEY_BYTES, MAX_METADATA_STRING_BYTES,
};
pub use metadata::{
    metadata_from_json, metadata_to_json, validate_metadata, Metadata, MetadataValue,
};
pub use record::VectorRecord;
pub use types::{DistanceMetric, VectorId};
