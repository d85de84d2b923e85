//! Records returned by the facade, write inputs and local signals.

use bytes::Bytes;
use rill_chain::{Action, ActionKind, LinkType};
use rill_types::ActionHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// An entry-writing action (`Create` or `Update`) with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub action: Action,
    pub content: Bytes,
}

impl Record {
    /// Hash of the action.
    pub fn hash(&self) -> ActionHash {
        self.action.hash
    }

    /// Decode the content as a postcard-encoded application entry.
    pub fn entry<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        Ok(postcard::from_bytes(&self.content)?)
    }
}

/// A `Delete` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRecord {
    pub action: Action,
}

impl DeleteRecord {
    /// Hash of the delete action.
    pub fn hash(&self) -> ActionHash {
        self.action.hash
    }

    /// The action this delete tombstones.
    pub fn deletes_hash(&self) -> Option<ActionHash> {
        match &self.action.kind {
            ActionKind::Delete { deletes_hash } => Some(*deletes_hash),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.action.timestamp
    }
}

/// Input for [`EntryEngine::update_entry`](crate::EntryEngine::update_entry).
#[derive(Debug, Clone)]
pub struct UpdateEntryInput {
    /// The `Create` that started the lineage.
    pub original_hash: ActionHash,
    /// The revision being superseded (the original for a first update).
    pub previous_hash: ActionHash,
    pub updated_content: Bytes,
}

/// A plain text entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntry {
    pub content: String,
}

impl TextEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Postcard encoding, ready for `create_entry` / `update_entry`.
    pub fn to_bytes(&self) -> Result<Bytes, EngineError> {
        Ok(Bytes::from(postcard::to_allocvec(self)?))
    }
}

/// Notifications for local writes, delivered on
/// [`RillNode::subscribe`](crate::RillNode::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    EntryCreated {
        action: Action,
    },
    EntryUpdated {
        action: Action,
        original_hash: ActionHash,
    },
    EntryDeleted {
        action: Action,
        deletes_hash: ActionHash,
    },
    LinkCreated {
        action: Action,
        link_type: LinkType,
    },
    LinkDeleted {
        action: Action,
        link_type: LinkType,
    },
}

impl Signal {
    /// The action that triggered the signal.
    pub fn action(&self) -> &Action {
        match self {
            Signal::EntryCreated { action }
            | Signal::EntryUpdated { action, .. }
            | Signal::EntryDeleted { action, .. }
            | Signal::LinkCreated { action, .. }
            | Signal::LinkDeleted { action, .. } => action,
        }
    }
}
