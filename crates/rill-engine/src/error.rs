//! Error types for the engine.

use rill_chain::ChainError;
use rill_types::{ActionHash, EntryHash, NodeId};

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The referenced action is not known locally. It may arrive with the
    /// next sync.
    #[error("action not found: {0}")]
    NotFound(ActionHash),

    /// An action is known but its content is not stored locally.
    #[error("content not found: {0}")]
    ContentNotFound(EntryHash),

    /// The request was rejected before any state was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A fork or tampered action was detected; the chain is unchanged.
    #[error("chain integrity violation: {0}")]
    ChainIntegrity(ChainError),

    /// Peers did not converge on a lineage in time.
    #[error("sync timed out after {waited_ms}ms waiting on {origin}: {lagging} peer(s) disagree")]
    SyncTimeout {
        /// The lineage being awaited.
        origin: ActionHash,
        /// How long we waited.
        waited_ms: u64,
        /// Number of peers still disagreeing.
        lagging: usize,
        /// The disagreeing peers.
        peers: Vec<NodeId>,
    },

    /// Chain storage error.
    #[error("chain error: {0}")]
    Chain(ChainError),

    /// Content store error.
    #[error("store error: {0}")]
    Store(#[from] rill_store::StoreError),

    /// Network transport error.
    #[error("network error: {0}")]
    Net(#[from] rill_net::NetError),

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No transport configured.
    #[error("no transport configured")]
    NoTransport,

    /// A transport was already attached to this node.
    #[error("transport already configured")]
    TransportAlreadySet,
}

impl EngineError {
    /// Whether retrying later (after more sync) may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound(_)
                | EngineError::ContentNotFound(_)
                | EngineError::SyncTimeout { .. }
                | EngineError::Net(_)
        )
    }
}

impl From<ChainError> for EngineError {
    fn from(e: ChainError) -> Self {
        if e.is_integrity_violation() {
            Self::ChainIntegrity(e)
        } else {
            Self::Chain(e)
        }
    }
}

impl From<postcard::Error> for EngineError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
