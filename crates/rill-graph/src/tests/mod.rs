//! Tests for the revision graph.


use ed25519_dalek::SigningKey;
use rill_chain::{Action, ActionKind, LinkType};
use rill_types::{ActionHash, AnyHash, EntryHash};

/// Builds signed actions with explicit timestamps.
///
/// The graph does not look at chain positions, so every action is built as
/// a genesis action; distinct timestamps or kinds keep the hashes distinct.
struct Author {
    key: SigningKey,
}

impl Author {
    fn new(seed: u8) -> Self {
        Self {
            key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    fn sign(&self, ts: u64, kind: ActionKind) -> Action {
        Action::new_signed(0, None, ts, kind, &self.key)
    }

    fn create(&self, ts: u64, content: &str) -> Action {
        self.sign(
            ts,
            ActionKind::Create {
                entry_hash: EntryHash::from_data(content.as_bytes()),
            },
        )
    }

    fn update(&self, ts: u64, original: &Action, previous: &Action, content: &str) -> Action {
        self.sign(
            ts,
            ActionKind::Update {
                original_hash: original.hash,
                previous_hash: previous.hash,
                entry_hash: EntryHash::from_data(content.as_bytes()),
            },
        )
    }

    fn delete(&self, ts: u64, target: &Action) -> Action {
        self.delete_hash(ts, target.hash)
    }

    fn delete_hash(&self, ts: u64, target: ActionHash) -> Action {
        self.sign(
            ts,
            ActionKind::Delete {
                deletes_hash: target,
            },
        )
    }

    fn link(&self, ts: u64, base: &Action, target: &Action, link_type: LinkType) -> Action {
        self.sign(
            ts,
            ActionKind::CreateLink {
                base: AnyHash::from(base.hash),
                target: AnyHash::from(target.hash),
                link_type,
                tag: vec![],
            },
        )
    }

    fn delete_link(&self, ts: u64, link: &Action, base: &Action) -> Action {
        self.sign(
            ts,
            ActionKind::DeleteLink {
                link_add_hash: link.hash,
                base: AnyHash::from(base.hash),
            },
        )
    }
}

fn hashes(actions: &[Action]) -> Vec<ActionHash> {
    actions.iter().map(|a| a.hash).collect()
}
