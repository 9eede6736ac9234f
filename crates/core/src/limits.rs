//! Hard limits enforced at validation time
//!
//! These bound what a snapshot may legally contain, so the reader can reject
//! absurd header values before allocating for them.

/// Maximum vector dimension accepted by an index
pub const MAX_DIMENSION: usize = 65_536;

/// Maximum number of metadata entries on a single record
pub const MAX_METADATA_ENTRIES: usize = 1_024;

/// Maximum metadata key length in bytes
pub const MAX_METADATA_KEY_BYTES: usize = 1_024;

/// Maximum metadata string value length in bytes (16MB)
pub const MAX_METADATA_STRING_BYTES: usize = 16 * 1024 * 1024;
