//! File-based content storage backend.
//!
//! Stores one file per entry with a 2-level fan-out directory structure:
//! `{base_dir}/{hex[0..2]}/{hex[2..4]}/{hex}`.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use rill_types::EntryHash;
use tracing::{debug, error, trace};

use crate::error::StoreError;
use crate::traits::{ContentStore, StoreStats};

/// File-based content store with 2-level fan-out directory layout.
///
/// Writes are atomic: data is written to a temporary file first, then
/// renamed into place, so a crash never leaves a half-written entry.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Compute the full file path for an entry hash.
    fn entry_path(&self, hash: &EntryHash) -> PathBuf {
        let hex = hash.to_string();
        self.base_dir.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    /// Walk the fan-out and collect `(hash, size)` for every stored file.
    async fn scan(&self) -> Result<Vec<(EntryHash, u64)>, StoreError> {
        let mut found = Vec::new();

        let mut level0 = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(d0) = level0.next_entry().await? {
            if !d0.file_type().await?.is_dir() {
                continue;
            }
            let mut level1 = tokio::fs::read_dir(d0.path()).await?;
            while let Some(d1) = level1.next_entry().await? {
                if !d1.file_type().await?.is_dir() {
                    continue;
                }
                let mut files = tokio::fs::read_dir(d1.path()).await?;
                while let Some(entry) = files.next_entry().await? {
                    let meta = entry.metadata().await?;
                    if !meta.is_file() {
                        continue;
                    }
                    if let Some(name) = entry.file_name().to_str()
                        && let Some(bytes) = hex_to_bytes(name)
                    {
                        found.push((EntryHash::from(bytes), meta.len()));
                    }
                }
            }
        }

        Ok(found)
    }
}

#[async_trait::async_trait]
impl ContentStore for FileStore {
    async fn put(&self, data: Bytes) -> Result<EntryHash, StoreError> {
        let hash = EntryHash::from_data(&data);
        let path = self.entry_path(&hash);

        if tokio::fs::try_exists(&path).await? {
            trace!(%hash, "entry already on disk");
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(%hash, path = %path.display(), size = data.len(), "stored entry to file");
        Ok(hash)
    }

    async fn get(&self, hash: EntryHash) -> Result<Option<Bytes>, StoreError> {
        let path = self.entry_path(&hash);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                // Verify-on-read: a corrupt file is never handed to the caller.
                let actual = EntryHash::from_data(&data);
                if actual != hash {
                    error!(expected = %hash, %actual, "entry corruption detected on read");
                    return Err(StoreError::CorruptContent {
                        expected: hash,
                        actual,
                    });
                }
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn contains(&self, hash: EntryHash) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.entry_path(&hash)).await?)
    }

    async fn list(&self) -> Result<Vec<EntryHash>, StoreError> {
        Ok(self.scan().await?.into_iter().map(|(h, _)| h).collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let found = self.scan().await?;
        Ok(StoreStats {
            entries: found.len() as u64,
            used_bytes: found.iter().map(|(_, size)| size).sum(),
        })
    }

    async fn capacity(&self) -> Result<Option<u64>, StoreError> {
        // Bounded only by the filesystem.
        Ok(None)
    }

    async fn verify(&self, hash: EntryHash) -> Result<bool, StoreError> {
        match tokio::fs::read(self.entry_path(&hash)).await {
            Ok(data) => Ok(EntryHash::from_data(&data) == hash),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(hash)),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Decode a 64-character hex file name into a `[u8; 32]`.
fn hex_to_bytes(hex: &str) -> Option<[u8; 32]> {
    if hex.len() != 64 {
        return None;
    }
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let hi = hex_nibble(hex.as_bytes()[i * 2])?;
        let lo = hex_nibble(hex.as_bytes()[i * 2 + 1])?;
        *byte = (hi << 4) | lo;
    }
    Some(bytes)
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
