//! [`RillNode`]: the node orchestrator that ties all components together.
//!
//! A `RillNode` owns the content store, the action chain, the revision
//! graph and an optional network transport, and implements the
//! [`EntryEngine`] write/read API on top of them.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock, RwLock};

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use rill_chain::{Action, ActionChain, ActionKind, ChainStore, LinkType};
use rill_graph::RevisionGraph;
use rill_net::{LineageStatus, MessageHandler, RillMessage, Transport};
use rill_store::ContentStore;
use rill_types::{ActionHash, AgentId, AnyHash, NodeId, SyncConfig};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::facade::EntryEngine;
use crate::record::{DeleteRecord, Record, Signal, UpdateEntryInput};

/// Configuration for creating a [`RillNode`].
#[derive(Debug, Clone)]
pub struct RillNodeConfig {
    /// Node identifier on the network.
    pub node_id: NodeId,
    /// Largest accepted entry payload, in bytes.
    pub max_entry_bytes: usize,
    /// Replication timing.
    pub sync: SyncConfig,
    /// Buffered signals per subscriber before the oldest are dropped.
    pub signal_capacity: usize,
}

impl Default for RillNodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from([0u8; 32]),
            max_entry_bytes: 1024 * 1024,
            sync: SyncConfig::default(),
            signal_capacity: 256,
        }
    }
}

/// The node orchestrator: one agent's view of the replicated entries.
pub struct RillNode {
    /// This node's network identifier.
    node_id: NodeId,
    /// Key signing this node's actions.
    signing_key: SigningKey,
    /// Author id derived from `signing_key`.
    agent: AgentId,
    pub(crate) config: RillNodeConfig,
    /// Immutable entry payloads.
    pub(crate) content: Arc<dyn ContentStore>,
    /// Per-author signed action chains.
    pub(crate) chain: ActionChain,
    /// Derived index over `chain`.
    pub(crate) graph: RevisionGraph,
    /// Network transport, attached after construction.
    pub(crate) transport: OnceLock<Arc<dyn Transport>>,
    /// Peers to publish to and pull from.
    pub(crate) peers: RwLock<BTreeSet<NodeId>>,
    /// Origins this node keeps in sync.
    pub(crate) interests: RwLock<BTreeSet<ActionHash>>,
    signals: broadcast::Sender<Signal>,
}

impl RillNode {
    /// Create a node over the given stores.
    ///
    /// The revision graph is rebuilt from every action already in
    /// `chain_store`, and every known origin joins the interest set.
    pub fn new(
        config: RillNodeConfig,
        signing_key: SigningKey,
        content: Arc<dyn ContentStore>,
        chain_store: ChainStore,
    ) -> Result<Self, EngineError> {
        let chain = ActionChain::new(chain_store);
        let existing = chain.all_actions()?;
        let graph = RevisionGraph::from_actions(&existing);
        if let Some(max_ts) = existing.iter().map(|a| a.timestamp).max() {
            chain.witness(max_ts);
        }
        let interests: BTreeSet<ActionHash> = graph.origins().into_iter().collect();

        let agent = AgentId::from(signing_key.verifying_key().to_bytes());
        let (signals, _) = broadcast::channel(config.signal_capacity.max(1));

        info!(
            node = %config.node_id.short(),
            agent = %agent.short(),
            actions = existing.len(),
            origins = interests.len(),
            "rill node opened"
        );

        Ok(Self {
            node_id: config.node_id,
            signing_key,
            agent,
            config,
            content,
            chain,
            graph,
            transport: OnceLock::new(),
            peers: RwLock::new(BTreeSet::new()),
            interests: RwLock::new(interests),
            signals,
        })
    }

    /// Attach the network transport. Can only be done once.
    pub fn set_transport(&self, transport: Arc<dyn Transport>) -> Result<(), EngineError> {
        self.transport
            .set(transport)
            .map_err(|_| EngineError::TransportAlreadySet)
    }

    /// Return this node's ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Return the author id this node signs with.
    pub fn agent_id(&self) -> AgentId {
        self.agent
    }

    /// Return a reference to the action chain.
    pub fn chain(&self) -> &ActionChain {
        &self.chain
    }

    /// Return a reference to the revision graph.
    pub fn graph(&self) -> &RevisionGraph {
        &self.graph
    }

    /// Return a reference to the content store.
    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    /// Add a peer to publish to and pull from.
    pub fn add_peer(&self, peer: NodeId) {
        if peer != self.node_id {
            self.peers.write().expect("peer lock poisoned").insert(peer);
        }
    }

    /// Forget a peer.
    pub fn remove_peer(&self, peer: &NodeId) {
        self.peers.write().expect("peer lock poisoned").remove(peer);
    }

    /// Current peer set.
    pub fn peers(&self) -> Vec<NodeId> {
        self.peers
            .read()
            .expect("peer lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Keep `origin` in sync on the next [`pull`](Self::pull).
    pub fn watch(&self, origin: ActionHash) {
        self.interests
            .write()
            .expect("interest lock poisoned")
            .insert(origin);
    }

    /// Origins kept in sync.
    pub fn interests(&self) -> Vec<ActionHash> {
        self.interests
            .read()
            .expect("interest lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Subscribe to signals for local writes.
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    /// Live `EntryUpdates` links from an original, oldest first.
    pub fn get_update_links(&self, original_hash: ActionHash) -> Vec<Action> {
        self.graph
            .links(&AnyHash::from(original_hash), LinkType::EntryUpdates)
    }

    /// This node's view of a lineage, or `None` if its create is unknown.
    pub fn lineage_status(&self, origin: &ActionHash) -> Option<LineageStatus> {
        let revisions = self.graph.all_revisions(origin);
        let latest = revisions.last()?.hash;
        Some(LineageStatus {
            latest,
            revisions: revisions.len() as u32,
            deletes: self.graph.lineage_delete_hashes(origin),
        })
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Link `base` to `target`.
    ///
    /// `EntryUpdates` links are written by `update_entry` and must join
    /// two action hashes.
    pub async fn create_link(
        &self,
        base: AnyHash,
        target: AnyHash,
        link_type: LinkType,
        tag: Vec<u8>,
    ) -> Result<ActionHash, EngineError> {
        validate_link_shape(&base, &target, link_type)?;
        let action = self.commit(ActionKind::CreateLink {
            base,
            target,
            link_type,
            tag,
        })?;
        self.emit(Signal::LinkCreated {
            action: action.clone(),
            link_type,
        });
        self.publish(vec![action.clone()]).await;
        Ok(action.hash)
    }

    /// Remove a link. Update links cannot be removed.
    pub async fn delete_link(&self, link_add_hash: ActionHash) -> Result<ActionHash, EngineError> {
        let link = self
            .graph
            .link_action(&link_add_hash)
            .ok_or(EngineError::NotFound(link_add_hash))?;
        let ActionKind::CreateLink {
            base, link_type, ..
        } = link.kind
        else {
            return Err(EngineError::Validation(format!(
                "{link_add_hash} is not a link"
            )));
        };
        if link_type == LinkType::EntryUpdates {
            return Err(EngineError::Validation(
                "update links cannot be deleted".into(),
            ));
        }

        let action = self.commit(ActionKind::DeleteLink {
            link_add_hash,
            base,
        })?;
        self.emit(Signal::LinkDeleted {
            action: action.clone(),
            link_type,
        });
        self.publish(vec![action.clone()]).await;
        Ok(action.hash)
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn check_size(&self, content: &Bytes) -> Result<(), EngineError> {
        if content.len() > self.config.max_entry_bytes {
            return Err(EngineError::Validation(format!(
                "entry is {} bytes, limit is {}",
                content.len(),
                self.config.max_entry_bytes
            )));
        }
        Ok(())
    }

    /// Append to our own chain and index the result.
    fn commit(&self, kind: ActionKind) -> Result<Action, EngineError> {
        let action = self.chain.append(&self.signing_key, kind)?;
        self.graph.record(&action);
        if let Some(origin) = action.origin() {
            self.watch(origin);
        }
        Ok(action)
    }

    fn emit(&self, signal: Signal) {
        // No subscribers is not an error.
        let _ = self.signals.send(signal);
    }

    /// Push to peers if a transport is attached; failures are only logged.
    async fn publish(&self, actions: Vec<Action>) {
        if self.transport.get().is_none() {
            return;
        }
        if let Err(e) = self.push(&actions).await {
            warn!(%e, "failed to publish actions");
        }
    }

    /// Load the content for an entry-writing action.
    pub(crate) async fn record_for(&self, action: Action) -> Result<Record, EngineError> {
        let entry_hash = action.entry_hash().ok_or_else(|| {
            EngineError::Validation(format!("{} does not write an entry", action.hash))
        })?;
        let content = self
            .content
            .get(entry_hash)
            .await?
            .ok_or(EngineError::ContentNotFound(entry_hash))?;
        Ok(Record { action, content })
    }
}

/// Shape rules every `CreateLink` must satisfy, local or remote.
pub(crate) fn validate_link_shape(
    base: &AnyHash,
    target: &AnyHash,
    link_type: LinkType,
) -> Result<(), EngineError> {
    if link_type == LinkType::EntryUpdates
        && (base.into_action_hash().is_none() || target.into_action_hash().is_none())
    {
        return Err(EngineError::Validation(
            "update links must join two actions".into(),
        ));
    }
    Ok(())
}

#[async_trait::async_trait]
impl EntryEngine for RillNode {
    async fn create_entry(&self, content: Bytes) -> Result<ActionHash, EngineError> {
        self.check_size(&content)?;

        let entry_hash = self.content.put(content).await?;
        let action = self.commit(ActionKind::Create { entry_hash })?;

        debug!(hash = %action.hash, entry = %entry_hash, "created entry");
        self.emit(Signal::EntryCreated {
            action: action.clone(),
        });
        self.publish(vec![action.clone()]).await;
        Ok(action.hash)
    }

    async fn update_entry(&self, input: UpdateEntryInput) -> Result<ActionHash, EngineError> {
        let UpdateEntryInput {
            original_hash,
            previous_hash,
            updated_content,
        } = input;
        self.check_size(&updated_content)?;

        let original = self
            .graph
            .entry_action(&original_hash)
            .ok_or(EngineError::NotFound(original_hash))?;
        if !matches!(original.kind, ActionKind::Create { .. }) {
            return Err(EngineError::Validation(format!(
                "original {original_hash} is not a create"
            )));
        }
        if self.graph.entry_action(&previous_hash).is_none() {
            return Err(EngineError::NotFound(previous_hash));
        }
        if self.graph.origin_of(&previous_hash) != Some(original_hash) {
            return Err(EngineError::Validation(format!(
                "previous {previous_hash} is not in the lineage of {original_hash}"
            )));
        }

        let entry_hash = self.content.put(updated_content).await?;
        let (update, link) = self.chain.append_pair(
            &self.signing_key,
            ActionKind::Update {
                original_hash,
                previous_hash,
                entry_hash,
            },
            |update| ActionKind::CreateLink {
                base: AnyHash::from(original_hash),
                target: AnyHash::from(update.hash),
                link_type: LinkType::EntryUpdates,
                tag: Vec::new(),
            },
        )?;
        self.graph.record(&update);
        self.graph.record(&link);
        self.watch(original_hash);

        debug!(hash = %update.hash, original = %original_hash, previous = %previous_hash, "updated entry");
        self.emit(Signal::EntryUpdated {
            action: update.clone(),
            original_hash,
        });
        self.emit(Signal::LinkCreated {
            action: link.clone(),
            link_type: LinkType::EntryUpdates,
        });
        self.publish(vec![update.clone(), link]).await;
        Ok(update.hash)
    }

    async fn delete_entry(&self, target: ActionHash) -> Result<ActionHash, EngineError> {
        if self.graph.entry_action(&target).is_none() {
            return match self.chain.get(&target)? {
                Some(other) => Err(EngineError::Validation(format!(
                    "cannot delete a {} action",
                    other.kind.name()
                ))),
                None => Err(EngineError::NotFound(target)),
            };
        }

        let action = self.commit(ActionKind::Delete {
            deletes_hash: target,
        })?;

        debug!(hash = %action.hash, target = %target, "deleted entry");
        self.emit(Signal::EntryDeleted {
            action: action.clone(),
            deletes_hash: target,
        });
        self.publish(vec![action.clone()]).await;
        Ok(action.hash)
    }

    async fn get_latest(&self, original_hash: ActionHash) -> Result<Option<Record>, EngineError> {
        match self.graph.latest_revision(&original_hash) {
            Some(action) => Ok(Some(self.record_for(action).await?)),
            None => Ok(None),
        }
    }

    async fn get_original(
        &self,
        original_hash: ActionHash,
    ) -> Result<Option<Record>, EngineError> {
        match self.graph.entry_action(&original_hash) {
            Some(action) => Ok(Some(self.record_for(action).await?)),
            None => Ok(None),
        }
    }

    async fn get_all_revisions(
        &self,
        original_hash: ActionHash,
    ) -> Result<Vec<Record>, EngineError> {
        let mut records = Vec::new();
        for action in self.graph.all_revisions(&original_hash) {
            records.push(self.record_for(action).await?);
        }
        Ok(records)
    }

    async fn get_oldest_delete(
        &self,
        action_hash: ActionHash,
    ) -> Result<Option<DeleteRecord>, EngineError> {
        Ok(self
            .graph
            .oldest_delete_for(&action_hash)
            .map(|action| DeleteRecord { action }))
    }

    async fn get_all_deletes(
        &self,
        action_hash: ActionHash,
    ) -> Result<Option<Vec<DeleteRecord>>, EngineError> {
        if self.graph.entry_action(&action_hash).is_none() {
            return Ok(None);
        }
        Ok(Some(
            self.graph
                .all_deletes_for(&action_hash)
                .into_iter()
                .map(|action| DeleteRecord { action })
                .collect(),
        ))
    }
}

#[async_trait::async_trait]
impl MessageHandler for RillNode {
    async fn handle(&self, from: NodeId, msg: RillMessage) -> Option<RillMessage> {
        match msg {
            RillMessage::Publish { actions, blobs } => {
                match self.ingest_wire(actions, blobs).await {
                    Ok(applied) if applied > 0 => {
                        debug!(from = %from.short(), applied, "applied published actions");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(from = %from.short(), %e, "rejected publish"),
                }
                None
            }
            RillMessage::LineageRequest { origin, have } => {
                match self.lineage_response(&origin, &have).await {
                    Ok(response) => Some(response),
                    Err(e) => {
                        warn!(from = %from.short(), %origin, %e, "failed to answer lineage request");
                        None
                    }
                }
            }
            RillMessage::StatusRequest { origin } => Some(RillMessage::StatusResponse {
                status: self.lineage_status(&origin),
            }),
            other => {
                warn!(from = %from.short(), kind = other.kind(), "unsolicited response");
                None
            }
        }
    }
}
