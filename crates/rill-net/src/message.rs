//! Protocol messages exchanged between Rill nodes.
//!
//! Actions travel as postcard-encoded bytes so this crate stays independent
//! of the chain types; content blobs travel alongside them keyed by their
//! entry hash.

use rill_types::{ActionHash, EntryHash};
use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// A node's view of one lineage, compared during convergence checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageStatus {
    /// Tip of the winning path.
    pub latest: ActionHash,
    /// Length of the winning path, including the create.
    pub revisions: u32,
    /// Sorted hashes of every delete targeting a member of the lineage.
    pub deletes: Vec<ActionHash>,
}

/// Protocol messages exchanged between Rill nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RillMessage {
    /// Push newly committed actions to a peer (uni-directional).
    Publish {
        /// Postcard-serialized actions.
        actions: Vec<Vec<u8>>,
        /// Content referenced by the actions: `(entry hash, bytes)`.
        blobs: Vec<(EntryHash, Vec<u8>)>,
    },

    /// Ask for the actions of a lineage the sender is missing.
    LineageRequest {
        /// Origin (Create action hash) of the lineage.
        origin: ActionHash,
        /// Lineage actions the sender already holds.
        have: Vec<ActionHash>,
    },

    /// Response to a [`RillMessage::LineageRequest`].
    LineageResponse {
        /// Postcard-serialized actions, oldest first.
        actions: Vec<Vec<u8>>,
        /// Content referenced by the actions.
        blobs: Vec<(EntryHash, Vec<u8>)>,
    },

    /// Ask for the responder's view of a lineage.
    StatusRequest {
        /// Origin of the lineage.
        origin: ActionHash,
    },

    /// Response to a [`RillMessage::StatusRequest`]. `None` if the
    /// responder doesn't know the origin's create.
    StatusResponse {
        status: Option<LineageStatus>,
    },
}

impl RillMessage {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, NetError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, NetError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RillMessage::Publish { .. } => "publish",
            RillMessage::LineageRequest { .. } => "lineage_request",
            RillMessage::LineageResponse { .. } => "lineage_response",
            RillMessage::StatusRequest { .. } => "status_request",
            RillMessage::StatusResponse { .. } => "status_response",
        }
    }
}
