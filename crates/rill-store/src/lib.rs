//! Content-addressed blob storage.
//!
//! This crate defines the [`ContentStore`] trait: entry payloads are keyed by
//! `blake3(bytes)`, writes are idempotent and nothing is ever updated or
//! removed. Two backends are provided:
//!
//! - [`MemoryStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileStore`]: file-based storage with a 2-level fan-out directory layout.

mod error;
mod file_store;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use traits::{ContentStore, StoreStats};
