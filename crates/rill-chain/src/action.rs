//! Action types for the per-author chains.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rill_types::{ActionHash, AgentId, AnyHash, EntryHash};
use serde::{Deserialize, Serialize};

/// A single signed action in an author's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Author of this action (ed25519 verifying key bytes).
    pub author: AgentId,
    /// Position in the author's chain, starting at 0.
    pub seq: u32,
    /// Hash of the author's previous action (`None` for the first one).
    pub prev_action: Option<ActionHash>,
    /// Hybrid logical clock timestamp.
    pub timestamp: u64,
    /// The mutation being recorded.
    pub kind: ActionKind,
    /// blake3 hash of `(author, seq, prev_action, timestamp, kind)`.
    pub hash: ActionHash,
    /// ed25519 signature over the hash, by `author`.
    /// Stored as two 32-byte halves for serde compatibility.
    pub signature_r: [u8; 32],
    pub signature_s: [u8; 32],
}

/// Kinds of link an action can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum LinkType {
    /// From an entry's original action to each of its updates.
    EntryUpdates,
    /// Application-defined link type.
    App(u8),
}

/// The mutation carried by an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Create a new entry.
    Create {
        /// Address of the entry content.
        entry_hash: EntryHash,
    },
    /// Revise an existing entry.
    Update {
        /// The `Create` action that started this entry's lineage.
        original_hash: ActionHash,
        /// The revision this update supersedes (may equal `original_hash`).
        previous_hash: ActionHash,
        /// Address of the new content.
        entry_hash: EntryHash,
    },
    /// Tombstone a `Create` or `Update`.
    Delete {
        /// The action being deleted.
        deletes_hash: ActionHash,
    },
    /// Link `base` to `target`.
    CreateLink {
        base: AnyHash,
        target: AnyHash,
        link_type: LinkType,
        tag: Vec<u8>,
    },
    /// Remove a link created by `link_add_hash`.
    DeleteLink {
        /// The `CreateLink` action being removed.
        link_add_hash: ActionHash,
        /// Base of the removed link, so the delete can be indexed without it.
        base: AnyHash,
    },
}

impl ActionKind {
    /// Short lowercase name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Create { .. } => "create",
            ActionKind::Update { .. } => "update",
            ActionKind::Delete { .. } => "delete",
            ActionKind::CreateLink { .. } => "create_link",
            ActionKind::DeleteLink { .. } => "delete_link",
        }
    }
}

/// Hashable content of an [`Action`] (excludes `hash` and signature).
#[derive(Serialize)]
struct HashableContent<'a> {
    author: AgentId,
    seq: u32,
    prev_action: Option<ActionHash>,
    timestamp: u64,
    kind: &'a ActionKind,
}

impl Action {
    /// Compute the blake3 hash of the action's content.
    pub fn compute_hash(
        author: AgentId,
        seq: u32,
        prev_action: Option<ActionHash>,
        timestamp: u64,
        kind: &ActionKind,
    ) -> ActionHash {
        let content = HashableContent {
            author,
            seq,
            prev_action,
            timestamp,
            kind,
        };
        let bytes = postcard::to_allocvec(&content).expect("serialization should not fail");
        ActionHash::from_data(&bytes)
    }

    /// Verify that the stored hash matches the action's content.
    pub fn verify_hash(&self) -> bool {
        let expected = Self::compute_hash(
            self.author,
            self.seq,
            self.prev_action,
            self.timestamp,
            &self.kind,
        );
        self.hash == expected
    }

    /// Reconstruct the 64-byte signature from its two halves.
    pub fn signature_bytes(&self) -> [u8; 64] {
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&self.signature_r);
        sig[32..].copy_from_slice(&self.signature_s);
        sig
    }

    /// Verify the ed25519 signature over the hash.
    ///
    /// Returns `false` if the author bytes are not a valid key or the
    /// signature doesn't match.
    pub fn verify_signature(&self) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(self.author.as_bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&self.signature_bytes());
        verifying_key.verify(self.hash.as_bytes(), &signature).is_ok()
    }

    /// Create a new signed action. The author is derived from `signing_key`.
    pub fn new_signed(
        seq: u32,
        prev_action: Option<ActionHash>,
        timestamp: u64,
        kind: ActionKind,
        signing_key: &SigningKey,
    ) -> Self {
        let author = AgentId::from(signing_key.verifying_key().to_bytes());
        let hash = Self::compute_hash(author, seq, prev_action, timestamp, &kind);
        let signature: Signature = signing_key.sign(hash.as_bytes());
        let sig_bytes = signature.to_bytes();
        let mut signature_r = [0u8; 32];
        let mut signature_s = [0u8; 32];
        signature_r.copy_from_slice(&sig_bytes[..32]);
        signature_s.copy_from_slice(&sig_bytes[32..]);

        Self {
            author,
            seq,
            prev_action,
            timestamp,
            kind,
            hash,
            signature_r,
            signature_s,
        }
    }

    /// Address of the content this action writes, for `Create` and `Update`.
    pub fn entry_hash(&self) -> Option<EntryHash> {
        match &self.kind {
            ActionKind::Create { entry_hash } | ActionKind::Update { entry_hash, .. } => {
                Some(*entry_hash)
            }
            _ => None,
        }
    }

    /// Origin of the lineage this action belongs to, for `Create` and `Update`.
    pub fn origin(&self) -> Option<ActionHash> {
        match &self.kind {
            ActionKind::Create { .. } => Some(self.hash),
            ActionKind::Update { original_hash, .. } => Some(*original_hash),
            _ => None,
        }
    }

    /// Whether this action writes an entry (`Create` or `Update`).
    pub fn is_entry_creation(&self) -> bool {
        self.entry_hash().is_some()
    }
}
