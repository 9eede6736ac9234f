//! In-memory index: record storage, distance functions and exact search

pub mod distance;
pub mod search;
pub mod store;

pub use distance::l2_confidence;
pub use search::SimilaritySearcher;
pub use store::{RecordRef, Upsert, VectorStore};
