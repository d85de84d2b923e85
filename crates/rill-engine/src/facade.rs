//! [`EntryEngine`]: the versioned-entry API.
//!
//! Applications depend on this trait rather than on the concrete
//! [`RillNode`](crate::RillNode).

use bytes::Bytes;
use rill_types::ActionHash;

use crate::error::EngineError;
use crate::record::{DeleteRecord, Record, UpdateEntryInput};

/// Write and read operations on versioned entries.
///
/// Writes are validated before anything is committed and are published to
/// peers on a best-effort basis. Reads only consult local state; absence is
/// reported as `None` (or an empty list), never as an error.
#[async_trait::async_trait]
pub trait EntryEngine: Send + Sync {
    /// Store new content and commit a `Create`. Returns the origin hash.
    async fn create_entry(&self, content: Bytes) -> Result<ActionHash, EngineError>;

    /// Commit an `Update` superseding `previous_hash` in the lineage of
    /// `original_hash`, plus an update link from the original.
    async fn update_entry(&self, input: UpdateEntryInput) -> Result<ActionHash, EngineError>;

    /// Tombstone a `Create` or `Update`.
    async fn delete_entry(&self, target: ActionHash) -> Result<ActionHash, EngineError>;

    /// Tip of the lineage's winning path.
    async fn get_latest(&self, original_hash: ActionHash) -> Result<Option<Record>, EngineError>;

    /// The entry written by exactly this action.
    async fn get_original(&self, original_hash: ActionHash)
    -> Result<Option<Record>, EngineError>;

    /// The winning path, create first. Empty if the origin is unknown.
    async fn get_all_revisions(&self, original_hash: ActionHash)
    -> Result<Vec<Record>, EngineError>;

    /// Earliest delete of the action or of any revision superseding it.
    async fn get_oldest_delete(
        &self,
        action_hash: ActionHash,
    ) -> Result<Option<DeleteRecord>, EngineError>;

    /// Deletes of exactly this action, oldest first. `None` if the action
    /// is not known locally.
    async fn get_all_deletes(
        &self,
        action_hash: ActionHash,
    ) -> Result<Option<Vec<DeleteRecord>>, EngineError>;
}
