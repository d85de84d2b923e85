//! Replication between nodes: push, pull and convergence polling.
//!
//! Writes are pushed to every peer as a `Publish`; anything lost on the way
//! is repaired by pulling a lineage with `LineageRequest`. Merging is by
//! hash, so redelivery and reordering are harmless.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rill_chain::{Action, ActionKind, LinkType};
use rill_net::{RillMessage, Transport};
use rill_types::{ActionHash, EntryHash, NodeId, SyncConfig};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::EngineError;
use crate::node::{RillNode, validate_link_shape};

/// How [`RillNode::await_convergence`] polls its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay before the second poll.
    pub poll_interval: Duration,
    /// Factor the delay grows by after each poll.
    pub backoff: u32,
    /// Upper bound on the delay between polls.
    pub max_interval: Duration,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for ConvergencePolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.convergence_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            backoff: 2,
            max_interval: Duration::from_millis(config.max_poll_interval_ms),
        }
    }
}

impl ConvergencePolicy {
    /// Same policy with a different timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.backoff.max(1))
            .min(self.max_interval)
    }
}

impl RillNode {
    fn transport(&self) -> Result<Arc<dyn Transport>, EngineError> {
        self.transport.get().cloned().ok_or(EngineError::NoTransport)
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Apply one remote action.
    ///
    /// Entry content must already be stored or be supplied in `blob`.
    /// Returns `false` if the action was already known.
    pub async fn ingest_action(
        &self,
        action: &Action,
        blob: Option<Bytes>,
    ) -> Result<bool, EngineError> {
        if self.graph.contains(&action.hash) {
            return Ok(false);
        }

        match &action.kind {
            ActionKind::CreateLink {
                base,
                target,
                link_type,
                ..
            } => validate_link_shape(base, target, *link_type)?,
            ActionKind::DeleteLink { link_add_hash, .. } => {
                if let Some(link) = self.graph.link_action(link_add_hash)
                    && matches!(
                        link.kind,
                        ActionKind::CreateLink {
                            link_type: LinkType::EntryUpdates,
                            ..
                        }
                    )
                {
                    return Err(EngineError::Validation(format!(
                        "{} deletes update link {link_add_hash}",
                        action.hash
                    )));
                }
            }
            _ => {}
        }

        if let Some(entry_hash) = action.entry_hash()
            && !self.content.contains(entry_hash).await?
        {
            let data = blob.ok_or(EngineError::ContentNotFound(entry_hash))?;
            self.content.put_expected(entry_hash, data).await?;
        }

        let new = self.chain.ingest(action)?;
        self.graph.record(action);
        if let Some(origin) = action.origin() {
            self.watch(origin);
        }

        if new {
            trace!(hash = %action.hash, kind = action.kind.name(), "applied remote action");
        }
        Ok(new)
    }

    /// Apply a batch of remote actions, oldest first.
    ///
    /// Invalid actions are logged and skipped; the rest still apply.
    /// Returns the number of new actions.
    pub async fn ingest_actions(
        &self,
        mut actions: Vec<Action>,
        blobs: &HashMap<EntryHash, Bytes>,
    ) -> usize {
        actions.sort_by_key(|a| (a.timestamp, a.hash));
        let mut applied = 0;
        for action in &actions {
            let blob = action.entry_hash().and_then(|h| blobs.get(&h).cloned());
            match self.ingest_action(action, blob).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(hash = %action.hash, %e, "skipping remote action"),
            }
        }
        applied
    }

    /// Decode and apply actions as they arrive on the wire.
    pub(crate) async fn ingest_wire(
        &self,
        actions: Vec<Vec<u8>>,
        blobs: Vec<(EntryHash, Vec<u8>)>,
    ) -> Result<usize, EngineError> {
        let decoded = actions
            .iter()
            .map(|bytes| postcard::from_bytes::<Action>(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        let blobs: HashMap<EntryHash, Bytes> = blobs
            .into_iter()
            .map(|(hash, data)| (hash, Bytes::from(data)))
            .collect();
        Ok(self.ingest_actions(decoded, &blobs).await)
    }

    // ------------------------------------------------------------------
    // Wire payloads
    // ------------------------------------------------------------------

    /// Encode actions with the content they reference.
    async fn payload(
        &self,
        actions: &[Action],
    ) -> Result<(Vec<Vec<u8>>, Vec<(EntryHash, Vec<u8>)>), EngineError> {
        let mut encoded = Vec::with_capacity(actions.len());
        let mut blobs = Vec::new();
        let mut included = HashSet::new();
        for action in actions {
            encoded.push(postcard::to_allocvec(action)?);
            if let Some(entry_hash) = action.entry_hash()
                && included.insert(entry_hash)
            {
                match self.content.get(entry_hash).await? {
                    Some(data) => blobs.push((entry_hash, data.to_vec())),
                    None => warn!(entry = %entry_hash, "content missing for outgoing action"),
                }
            }
        }
        Ok((encoded, blobs))
    }

    /// Answer a `LineageRequest`: every lineage action the peer lacks.
    pub(crate) async fn lineage_response(
        &self,
        origin: &ActionHash,
        have: &[ActionHash],
    ) -> Result<RillMessage, EngineError> {
        let have: HashSet<&ActionHash> = have.iter().collect();
        let missing: Vec<Action> = self
            .graph
            .lineage_actions(origin)
            .into_iter()
            .filter(|a| !have.contains(&a.hash))
            .collect();
        let (actions, blobs) = self.payload(&missing).await?;
        Ok(RillMessage::LineageResponse { actions, blobs })
    }

    // ------------------------------------------------------------------
    // Push / pull
    // ------------------------------------------------------------------

    /// Publish actions and their content to every peer.
    ///
    /// Unreachable peers are skipped; a later pull repairs them.
    pub async fn push(&self, actions: &[Action]) -> Result<(), EngineError> {
        let transport = self.transport()?;
        if actions.is_empty() {
            return Ok(());
        }
        let (encoded, blobs) = self.payload(actions).await?;
        let msg = RillMessage::Publish {
            actions: encoded,
            blobs,
        };

        for peer in self.peers() {
            if let Err(e) = transport.send_to(peer, &msg).await {
                debug!(peer = %peer.short(), %e, "publish failed, peer will pull later");
            }
        }
        Ok(())
    }

    /// Send our view of a lineage to one peer.
    async fn push_lineage_to(
        &self,
        transport: &dyn Transport,
        peer: NodeId,
        origin: &ActionHash,
    ) -> Result<(), EngineError> {
        let actions = self.graph.lineage_actions(origin);
        if actions.is_empty() {
            return Ok(());
        }
        let (encoded, blobs) = self.payload(&actions).await?;
        let msg = RillMessage::Publish {
            actions: encoded,
            blobs,
        };
        transport.send_to(peer, &msg).await?;
        Ok(())
    }

    /// Pull every origin in the interest set from every peer.
    pub async fn pull(&self) -> Result<usize, EngineError> {
        let mut applied = 0;
        for origin in self.interests() {
            applied += self.pull_origin(origin).await?;
        }
        Ok(applied)
    }

    /// Pull one origin from every peer. Returns the number of new actions.
    pub async fn pull_origin(&self, origin: ActionHash) -> Result<usize, EngineError> {
        let transport = self.transport()?;
        self.watch(origin);

        let mut applied = 0;
        for peer in self.peers() {
            match self.pull_from(transport.as_ref(), peer, origin).await {
                Ok(n) => applied += n,
                Err(e) => debug!(peer = %peer.short(), %origin, %e, "pull failed"),
            }
        }
        if applied > 0 {
            debug!(%origin, applied, "pulled lineage");
        }
        Ok(applied)
    }

    async fn pull_from(
        &self,
        transport: &dyn Transport,
        peer: NodeId,
        origin: ActionHash,
    ) -> Result<usize, EngineError> {
        let have = self
            .graph
            .lineage_actions(&origin)
            .into_iter()
            .map(|a| a.hash)
            .collect();
        let request = RillMessage::LineageRequest { origin, have };
        let response = transport
            .request(peer, &request, self.config.sync.request_timeout())
            .await?;

        match response {
            RillMessage::LineageResponse { actions, blobs } => {
                self.ingest_wire(actions, blobs).await
            }
            other => Err(rill_net::NetError::UnexpectedResponse(format!(
                "expected lineage_response, got {}",
                other.kind()
            ))
            .into()),
        }
    }

    // ------------------------------------------------------------------
    // Convergence
    // ------------------------------------------------------------------

    /// Wait until every peer in `peers` reports the same view of `origin`
    /// as this node.
    ///
    /// Between polls, disagreeing peers are pulled from and sent our own
    /// lineage. The whole wait, including requests in flight, is bounded by
    /// `policy.timeout`; past it the call fails with
    /// [`EngineError::SyncTimeout`].
    pub async fn await_convergence(
        &self,
        peers: &[NodeId],
        origin: ActionHash,
        policy: ConvergencePolicy,
    ) -> Result<(), EngineError> {
        let transport = self.transport()?;
        let started = Instant::now();
        self.watch(origin);

        // Peers that disagreed in the last completed poll.
        let mut lagging = peers.to_vec();
        let outcome = tokio::time::timeout(
            policy.timeout,
            self.convergence_rounds(transport.as_ref(), peers, origin, policy, &mut lagging),
        )
        .await;

        match outcome {
            Ok(()) => {
                info!(
                    %origin,
                    peers = peers.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "lineage converged"
                );
                Ok(())
            }
            Err(_) => {
                warn!(%origin, lagging = lagging.len(), "convergence timed out");
                Err(EngineError::SyncTimeout {
                    origin,
                    waited_ms: started.elapsed().as_millis() as u64,
                    lagging: lagging.len(),
                    peers: lagging,
                })
            }
        }
    }

    /// Poll until every peer agrees. Runs until cancelled otherwise.
    async fn convergence_rounds(
        &self,
        transport: &dyn Transport,
        peers: &[NodeId],
        origin: ActionHash,
        policy: ConvergencePolicy,
        lagging: &mut Vec<NodeId>,
    ) {
        let mut interval = policy.poll_interval;

        loop {
            let local = self.lineage_status(&origin);
            let mut disagreeing = Vec::new();
            for &peer in peers {
                let request = RillMessage::StatusRequest { origin };
                let agrees = match transport
                    .request(peer, &request, self.config.sync.request_timeout())
                    .await
                {
                    Ok(RillMessage::StatusResponse { status }) => {
                        local.is_some() && status == local
                    }
                    Ok(other) => {
                        warn!(peer = %peer.short(), kind = other.kind(), "unexpected status reply");
                        false
                    }
                    Err(e) => {
                        trace!(peer = %peer.short(), %e, "status request failed");
                        false
                    }
                };
                if !agrees {
                    disagreeing.push(peer);
                }
            }
            *lagging = disagreeing;

            if local.is_some() && lagging.is_empty() {
                return;
            }

            // Without the create locally, anyone may have it.
            let sources = if local.is_none() { peers } else { &lagging[..] };
            for &peer in sources {
                if let Err(e) = self.pull_from(transport, peer, origin).await {
                    trace!(peer = %peer.short(), %e, "pull during convergence failed");
                }
            }
            for &peer in lagging.iter() {
                if let Err(e) = self.push_lineage_to(transport, peer, &origin).await {
                    trace!(peer = %peer.short(), %e, "push during convergence failed");
                }
            }

            tokio::time::sleep(interval).await;
            interval = policy.next_interval(interval);
        }
    }
}
