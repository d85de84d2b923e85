//! Core trait and types for content storage.

use bytes::Bytes;
use rill_types::EntryHash;

use crate::error::StoreError;

/// Size information for a content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of distinct entries stored.
    pub entries: u64,
    /// Bytes used by entry payloads.
    pub used_bytes: u64,
}

/// Append-only, content-addressed storage for entry payloads.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// There is deliberately no delete: content lives for the node's lifetime.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their address. Storing the same bytes twice
    /// returns the same hash and keeps a single copy.
    async fn put(&self, data: Bytes) -> Result<EntryHash, StoreError>;

    /// Retrieve bytes by address. Returns `None` if not stored locally.
    async fn get(&self, hash: EntryHash) -> Result<Option<Bytes>, StoreError>;

    /// Check whether an entry exists.
    async fn contains(&self, hash: EntryHash) -> Result<bool, StoreError>;

    /// List all stored entry hashes.
    async fn list(&self) -> Result<Vec<EntryHash>, StoreError>;

    /// Report how much is stored.
    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Bytes still available, or `None` if the backend is not bounded.
    async fn capacity(&self) -> Result<Option<u64>, StoreError>;

    /// Verify an entry by re-hashing it and comparing to its address.
    async fn verify(&self, hash: EntryHash) -> Result<bool, StoreError>;

    /// Store bytes received from a peer under an announced address.
    ///
    /// Rejects the bytes with [`StoreError::CorruptContent`] if they do not
    /// hash to `expected`.
    async fn put_expected(&self, expected: EntryHash, data: Bytes) -> Result<(), StoreError> {
        let actual = EntryHash::from_data(&data);

        if actual != expected {
            return Err(StoreError::CorruptContent { expected, actual });
        }

        self.put(data).await?;
        Ok(())
    }
}
