//! Shared test harness for Rill integration tests.
//!
//! Provides [`IntegrationCluster`]: N in-memory nodes joined to one
//! [`SimNetwork`], every node a peer of every other, with helpers for
//! failure injection and convergence.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use rill_chain::ChainStore;
use rill_engine::{
    ConvergencePolicy, EngineError, EntryEngine, RillNode, RillNodeConfig, TextEntry,
};
use rill_net::{MessageHandler, SimNetwork};
use rill_store::MemoryStore;
use rill_types::{ActionHash, NodeId};

/// Maximum content store capacity for test nodes.
const MAX_BYTES: u64 = 256 * 1024 * 1024;

pub const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

/// Postcard-encoded text entry.
pub fn text(content: &str) -> Bytes {
    TextEntry::new(content)
        .to_bytes()
        .expect("text entries always encode")
}

/// N-node cluster over an in-process network.
pub struct IntegrationCluster {
    net: SimNetwork,
    nodes: Vec<Arc<RillNode>>,
    policy: ConvergencePolicy,
}

impl IntegrationCluster {
    /// Create an `n`-node cluster. Must be called inside a tokio runtime.
    pub fn new(n: usize) -> Self {
        let net = SimNetwork::new();
        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let seed = (i + 1) as u8;
            let node = Arc::new(
                RillNode::new(
                    RillNodeConfig {
                        node_id: NodeId::from([seed; 32]),
                        ..RillNodeConfig::default()
                    },
                    SigningKey::from_bytes(&[seed; 32]),
                    Arc::new(MemoryStore::new(MAX_BYTES)),
                    ChainStore::in_memory(),
                )
                .expect("in-memory node"),
            );
            let handler: Weak<dyn MessageHandler> =
                Arc::downgrade(&node) as Weak<dyn MessageHandler>;
            node.set_transport(Arc::new(net.join(node.node_id(), handler)))
                .expect("fresh node has no transport");
            nodes.push(node);
        }
        for node in &nodes {
            for other in &nodes {
                node.add_peer(other.node_id());
            }
        }

        Self {
            net,
            nodes,
            policy: ConvergencePolicy {
                timeout: Duration::from_secs(20),
                poll_interval: Duration::from_millis(10),
                backoff: 2,
                max_interval: Duration::from_millis(200),
            },
        }
    }

    /// Get node `i`.
    pub fn node(&self, i: usize) -> &Arc<RillNode> {
        &self.nodes[i]
    }

    /// Get the NodeId of node `i`.
    pub fn node_id(&self, i: usize) -> NodeId {
        self.nodes[i].node_id()
    }

    /// Number of nodes in the cluster.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the cluster has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The shared network, for failure injection.
    pub fn network(&self) -> &SimNetwork {
        &self.net
    }

    /// The polling policy used by the convergence helpers.
    pub fn policy(&self) -> ConvergencePolicy {
        self.policy
    }

    /// Ids of every node except `i`.
    pub fn others(&self, i: usize) -> Vec<NodeId> {
        (0..self.len())
            .filter(|&j| j != i)
            .map(|j| self.node_id(j))
            .collect()
    }

    /// Mark a node as down: all traffic to and from it fails.
    pub fn kill_node(&self, i: usize) {
        self.net.set_down(self.node_id(i), true);
    }

    /// Bring a killed node back.
    pub fn revive_node(&self, i: usize) {
        self.net.set_down(self.node_id(i), false);
    }

    /// Block traffic between every node of `a` and every node of `b`.
    pub fn partition(&self, a: &[usize], b: &[usize]) {
        for &i in a {
            for &j in b {
                self.net.partition(self.node_id(i), self.node_id(j));
            }
        }
    }

    /// Remove every partition.
    pub fn heal(&self) {
        self.net.heal_all();
    }

    /// Wait until every other node agrees with node `from` on `origin`.
    pub async fn converge_from(&self, from: usize, origin: ActionHash) -> Result<(), EngineError> {
        self.nodes[from]
            .await_convergence(&self.others(from), origin, self.policy)
            .await
    }

    /// Wait until every node agrees with every other on `origin`.
    pub async fn converge_all(&self, origin: ActionHash) -> Result<(), EngineError> {
        for i in 0..self.len() {
            self.converge_from(i, origin).await?;
        }
        Ok(())
    }

    /// Text of the latest revision of `origin` as seen by node `i`.
    pub async fn latest_text(&self, i: usize, origin: ActionHash) -> Option<String> {
        let record = self.nodes[i].get_latest(origin).await.ok()??;
        record.entry::<TextEntry>().ok().map(|e| e.content)
    }
}
