//! Shared test utilities for rill-engine tests.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use rill_chain::ChainStore;
use rill_net::{MessageHandler, SimNetwork};
use rill_store::MemoryStore;
use rill_types::NodeId;

use crate::node::{RillNode, RillNodeConfig};
use crate::record::TextEntry;
use crate::sync::ConvergencePolicy;

pub const TEST_MAX_BYTES: u64 = 64 * 1024 * 1024;

pub const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

/// Postcard-encoded text entry.
pub fn text(content: &str) -> Bytes {
    TextEntry::new(content).to_bytes().unwrap()
}

pub fn node_config(seed: u8) -> RillNodeConfig {
    RillNodeConfig {
        node_id: NodeId::from([seed; 32]),
        ..RillNodeConfig::default()
    }
}

/// A node with in-memory stores and no transport.
pub fn single_node(seed: u8) -> RillNode {
    RillNode::new(
        node_config(seed),
        SigningKey::from_bytes(&[seed; 32]),
        Arc::new(MemoryStore::new(TEST_MAX_BYTES)),
        ChainStore::in_memory(),
    )
    .unwrap()
}

/// `n` in-memory nodes joined to one sim network, every node a peer of
/// every other.
pub fn networked_nodes(n: u8) -> (SimNetwork, Vec<Arc<RillNode>>) {
    let net = SimNetwork::new();
    let nodes: Vec<Arc<RillNode>> = (1..=n).map(|seed| Arc::new(single_node(seed))).collect();

    for node in &nodes {
        let weak: Weak<dyn MessageHandler> = Arc::downgrade(node) as Weak<dyn MessageHandler>;
        let transport = net.join(node.node_id(), weak);
        node.set_transport(Arc::new(transport)).unwrap();
        for other in &nodes {
            node.add_peer(other.node_id());
        }
    }
    (net, nodes)
}

/// Fast polling with a generous deadline.
pub fn test_policy() -> ConvergencePolicy {
    ConvergencePolicy {
        timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(10),
        backoff: 2,
        max_interval: Duration::from_millis(100),
    }
}

pub fn ids(nodes: &[Arc<RillNode>]) -> Vec<NodeId> {
    nodes.iter().map(|n| n.node_id()).collect()
}
