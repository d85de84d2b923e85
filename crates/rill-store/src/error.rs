//! Error types for content storage operations.

use rill_types::EntryHash;

/// Errors that can occur during content storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entry was not found.
    #[error("entry not found: {0}")]
    NotFound(EntryHash),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has reached its capacity limit.
    #[error("store capacity exceeded: need {needed} bytes, only {available} available")]
    CapacityExceeded {
        /// Bytes needed for the operation.
        needed: u64,
        /// Bytes currently available.
        available: u64,
    },

    /// Stored or received bytes do not hash to the expected address.
    #[error("content corruption detected: expected {expected}, actual hash {actual}")]
    CorruptContent {
        /// The hash that was requested or announced.
        expected: EntryHash,
        /// The hash computed from the bytes actually seen.
        actual: EntryHash,
    },
}
