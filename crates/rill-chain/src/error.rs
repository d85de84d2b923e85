//! Error types for the chain crate.

use rill_types::{ActionHash, AgentId};

/// Errors that can occur during chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Action hash verification failed.
    #[error("invalid action hash: {0}")]
    InvalidHash(ActionHash),

    /// Action signature verification failed.
    #[error("invalid action signature: {0}")]
    InvalidSignature(ActionHash),

    /// A local action does not extend the author's current head.
    #[error("action {action} does not extend head of {author}: expected prev {expected:?}, got {found:?}")]
    HeadMismatch {
        author: AgentId,
        action: ActionHash,
        expected: Option<ActionHash>,
        found: Option<ActionHash>,
    },

    /// Two different actions by one author claim the same chain position.
    #[error("fork detected for {author}: {existing} and {incoming} share prev {prev:?}")]
    Fork {
        author: AgentId,
        prev: Option<ActionHash>,
        existing: ActionHash,
        incoming: ActionHash,
    },

    /// An action's `seq`, timestamp or author is inconsistent with its predecessor.
    #[error("broken chain link at {action}: {reason}")]
    BrokenLink {
        action: ActionHash,
        reason: String,
    },

    /// A chain walk hit an action that is not stored locally.
    #[error("missing action in chain: {0}")]
    MissingAction(ActionHash),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ChainError {
    /// Whether this error means the chain was forked or tampered with.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidHash(_)
                | ChainError::InvalidSignature(_)
                | ChainError::HeadMismatch { .. }
                | ChainError::Fork { .. }
                | ChainError::BrokenLink { .. }
        )
    }
}

impl From<postcard::Error> for ChainError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
