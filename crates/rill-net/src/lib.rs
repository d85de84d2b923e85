//! Network layer for Rill nodes.
//!
//! - [`RillMessage`]: the wire protocol (postcard-serialized).
//! - [`Transport`]: the async message primitive the engine replicates over.
//! - [`MessageHandler`]: the receiving side, implemented by the node.
//! - [`SimNetwork`]: an in-process network of tokio channels with failure
//!   injection (down nodes, partitions, dropped messages, jitter).

mod error;
mod message;
mod sim;

use std::time::Duration;

use rill_types::NodeId;

pub use error::NetError;
pub use message::{LineageStatus, RillMessage};
pub use sim::{SimNetwork, SimStats, SimTransport};

/// Trait abstracting the network operations used by the engine.
///
/// Delivery is at-least-once and unordered; receivers must merge
/// idempotently.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Identity of the local node.
    fn local_id(&self) -> NodeId;

    /// Send a message to a remote node (uni-directional, no response).
    async fn send_to(&self, peer: NodeId, msg: &RillMessage) -> Result<(), NetError>;

    /// Send a request and wait up to `timeout` for the response.
    async fn request(
        &self,
        peer: NodeId,
        msg: &RillMessage,
        timeout: Duration,
    ) -> Result<RillMessage, NetError>;
}

/// Receiving side of a [`Transport`].
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message. The returned message, if any, is sent
    /// back as the response to a request.
    async fn handle(&self, from: NodeId, msg: RillMessage) -> Option<RillMessage>;
}
