//! In-process simulated network.
//!
//! A shared [`SimNetwork`] broker routes postcard-encoded messages between
//! [`SimTransport`] instances over tokio mpsc inboxes; requests carry a
//! oneshot reply channel. Each delivered message is handled on its own task,
//! so handlers may issue requests of their own and messages can overtake one
//! another.
//!
//! Failure injection: nodes can be marked down, pairs of nodes partitioned,
//! the next N messages dropped, and random delivery jitter added.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use rand::Rng;
use rill_types::NodeId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::NetError;
use crate::message::RillMessage;
use crate::{MessageHandler, Transport};

const INBOX_CAPACITY: usize = 1024;

/// A message in flight.
struct Envelope {
    from: NodeId,
    bytes: Vec<u8>,
    reply: Option<oneshot::Sender<Vec<u8>>>,
}

#[derive(Default)]
struct SimInner {
    inboxes: RwLock<HashMap<NodeId, mpsc::Sender<Envelope>>>,
    down: RwLock<HashSet<NodeId>>,
    /// Blocked links, stored with the lower id first.
    partitions: RwLock<HashSet<(NodeId, NodeId)>>,
    drop_next: AtomicUsize,
    /// Maximum delivery delay in milliseconds (0 = none).
    jitter_ms: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Counters for messages routed through a [`SimNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Shared network broker connecting [`SimTransport`]s.
#[derive(Clone, Default)]
pub struct SimNetwork {
    inner: Arc<SimInner>,
}

impl SimNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and start delivering its messages to `handler`.
    ///
    /// The handler is held weakly: once it is dropped the node's inbox task
    /// exits. Must be called from within a tokio runtime.
    pub fn join(&self, node_id: NodeId, handler: Weak<dyn MessageHandler>) -> SimTransport {
        let (tx, mut rx) = mpsc::channel::<Envelope>(INBOX_CAPACITY);
        self.inner
            .inboxes
            .write()
            .expect("inbox lock poisoned")
            .insert(node_id, tx);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let Some(handler) = handler.upgrade() else {
                    break;
                };
                let jitter = inner.jitter_ms.load(Ordering::Relaxed);
                tokio::spawn(async move {
                    if jitter > 0 {
                        let delay = rand::rng().random_range(0..=jitter);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    deliver(node_id, handler, envelope).await;
                });
            }
            debug!(node = %node_id.short(), "sim inbox closed");
        });

        debug!(node = %node_id.short(), "node joined sim network");
        SimTransport {
            node_id,
            network: self.clone(),
        }
    }

    /// Remove a node from the network.
    pub fn leave(&self, node_id: &NodeId) {
        self.inner
            .inboxes
            .write()
            .expect("inbox lock poisoned")
            .remove(node_id);
    }

    /// Mark a node as down (unreachable) or back up.
    pub fn set_down(&self, node_id: NodeId, down: bool) {
        let mut set = self.inner.down.write().expect("down lock poisoned");
        if down {
            set.insert(node_id);
        } else {
            set.remove(&node_id);
        }
    }

    /// Block all traffic between `a` and `b`.
    pub fn partition(&self, a: NodeId, b: NodeId) {
        self.inner
            .partitions
            .write()
            .expect("partition lock poisoned")
            .insert(link(a, b));
    }

    /// Restore traffic between `a` and `b`.
    pub fn heal(&self, a: NodeId, b: NodeId) {
        self.inner
            .partitions
            .write()
            .expect("partition lock poisoned")
            .remove(&link(a, b));
    }

    /// Restore every partitioned link.
    pub fn heal_all(&self) {
        self.inner
            .partitions
            .write()
            .expect("partition lock poisoned")
            .clear();
    }

    /// Silently drop the next `n` messages sent on the network.
    pub fn drop_next(&self, n: usize) {
        self.inner.drop_next.store(n, Ordering::SeqCst);
    }

    /// Delay every delivery by a random amount up to `max`.
    pub fn set_jitter(&self, max: Duration) {
        self.inner
            .jitter_ms
            .store(max.as_millis() as u64, Ordering::Relaxed);
    }

    /// Message counters so far.
    pub fn stats(&self) -> SimStats {
        SimStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    fn reachable(&self, from: NodeId, to: NodeId) -> bool {
        let down = self.inner.down.read().expect("down lock poisoned");
        if down.contains(&from) || down.contains(&to) {
            return false;
        }
        !self
            .inner
            .partitions
            .read()
            .expect("partition lock poisoned")
            .contains(&link(from, to))
    }

    /// Consume one unit of the drop budget, if any is left.
    fn take_drop(&self) -> bool {
        self.inner
            .drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Route an envelope to `to`. Returns `Ok(false)` if it was dropped.
    async fn route(&self, to: NodeId, envelope: Envelope) -> Result<bool, NetError> {
        if !self.reachable(envelope.from, to) {
            return Err(NetError::Unreachable(to));
        }

        let inbox = self
            .inner
            .inboxes
            .read()
            .expect("inbox lock poisoned")
            .get(&to)
            .cloned()
            .ok_or(NetError::UnknownPeer(to))?;

        if self.take_drop() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(from = %envelope.from.short(), to = %to.short(), "sim network dropped message");
            return Ok(false);
        }

        inbox
            .send(envelope)
            .await
            .map_err(|_| NetError::Unreachable(to))?;
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

fn link(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}

async fn deliver(node_id: NodeId, handler: Arc<dyn MessageHandler>, envelope: Envelope) {
    let msg = match RillMessage::decode(&envelope.bytes) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(node = %node_id.short(), %e, "dropping undecodable message");
            return;
        }
    };
    trace!(node = %node_id.short(), from = %envelope.from.short(), kind = msg.kind(), "delivering");

    let response = handler.handle(envelope.from, msg).await;

    if let (Some(reply), Some(response)) = (envelope.reply, response) {
        match response.encode() {
            Ok(bytes) => {
                let _ = reply.send(bytes);
            }
            Err(e) => warn!(node = %node_id.short(), %e, "failed to encode response"),
        }
    }
}

/// One node's handle on a [`SimNetwork`].
#[derive(Clone)]
pub struct SimTransport {
    node_id: NodeId,
    network: SimNetwork,
}

impl SimTransport {
    /// The network this transport belongs to.
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }
}

#[async_trait::async_trait]
impl Transport for SimTransport {
    fn local_id(&self) -> NodeId {
        self.node_id
    }

    async fn send_to(&self, peer: NodeId, msg: &RillMessage) -> Result<(), NetError> {
        let envelope = Envelope {
            from: self.node_id,
            bytes: msg.encode()?,
            reply: None,
        };
        // A dropped one-way message is indistinguishable from a delivered one.
        self.network.route(peer, envelope).await?;
        Ok(())
    }

    async fn request(
        &self,
        peer: NodeId,
        msg: &RillMessage,
        timeout: Duration,
    ) -> Result<RillMessage, NetError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            from: self.node_id,
            bytes: msg.encode()?,
            reply: Some(reply_tx),
        };

        if !self.network.route(peer, envelope).await? {
            return Err(NetError::Lost(peer));
        }

        let bytes = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(_)) => {
                return Err(NetError::UnexpectedResponse(format!(
                    "{} sent no response to {}",
                    peer.short(),
                    msg.kind()
                )));
            }
            Err(_) => return Err(NetError::Timeout(peer)),
        };

        // A reply is lost if the link went down while the request was handled.
        if !self.network.reachable(peer, self.node_id) {
            return Err(NetError::Lost(peer));
        }

        RillMessage::decode(&bytes)
    }
}
