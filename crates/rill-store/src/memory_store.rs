//! In-memory content storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use rill_types::EntryHash;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::traits::{ContentStore, StoreStats};

/// In-memory content store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for nodes configured to run in memory-only mode.
/// Tracks total bytes stored against a configurable maximum.
pub struct MemoryStore {
    entries: RwLock<HashMap<EntryHash, Bytes>>,
    max_bytes: u64,
}

impl MemoryStore {
    /// Create a new in-memory store with the given capacity limit.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_bytes,
        }
    }

    /// Return a reference to the inner map (for testing purposes).
    #[cfg(test)]
    pub(crate) fn inner(&self) -> &RwLock<HashMap<EntryHash, Bytes>> {
        &self.entries
    }

    fn used_bytes_unlocked(map: &HashMap<EntryHash, Bytes>) -> u64 {
        map.values().map(|v| v.len() as u64).sum()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, data: Bytes) -> Result<EntryHash, StoreError> {
        let hash = EntryHash::from_data(&data);
        let mut map = self.entries.write().expect("lock poisoned");

        if map.contains_key(&hash) {
            trace!(%hash, "entry already stored");
            return Ok(hash);
        }

        let used = Self::used_bytes_unlocked(&map);
        let needed = data.len() as u64;

        if used + needed > self.max_bytes {
            return Err(StoreError::CapacityExceeded {
                needed,
                available: self.max_bytes.saturating_sub(used),
            });
        }

        debug!(%hash, size = data.len(), "storing entry in memory");
        map.insert(hash, data);
        Ok(hash)
    }

    async fn get(&self, hash: EntryHash) -> Result<Option<Bytes>, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(&hash).cloned())
    }

    async fn contains(&self, hash: EntryHash) -> Result<bool, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.contains_key(&hash))
    }

    async fn list(&self) -> Result<Vec<EntryHash>, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.keys().copied().collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(StoreStats {
            entries: map.len() as u64,
            used_bytes: Self::used_bytes_unlocked(&map),
        })
    }

    async fn capacity(&self) -> Result<Option<u64>, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(Some(
            self.max_bytes
                .saturating_sub(Self::used_bytes_unlocked(&map)),
        ))
    }

    async fn verify(&self, hash: EntryHash) -> Result<bool, StoreError> {
        let map = self.entries.read().expect("lock poisoned");
        match map.get(&hash) {
            Some(data) => Ok(EntryHash::from_data(data) == hash),
            None => Err(StoreError::NotFound(hash)),
        }
    }
}
