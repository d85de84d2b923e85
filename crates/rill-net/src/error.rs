//! Error types for network operations.

use rill_types::NodeId;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The peer is not registered on the network.
    #[error("unknown peer: {0}")]
    UnknownPeer(NodeId),

    /// The peer is down or partitioned away.
    #[error("peer unreachable: {0}")]
    Unreachable(NodeId),

    /// The peer did not answer within the request timeout.
    #[error("request to {0} timed out")]
    Timeout(NodeId),

    /// The message or its response was lost in transit.
    #[error("message to {0} was lost")]
    Lost(NodeId),

    /// The peer answered with a message of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for NetError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
