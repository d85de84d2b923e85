//! Tests for the chain crate.


use ed25519_dalek::SigningKey;
use rill_types::{AgentId, EntryHash};

use crate::action::ActionKind;
use crate::chain::ActionChain;
use crate::store::ChainStore;

/// Create a test (AgentId, SigningKey) pair from a seed.
///
/// The AgentId is the ed25519 public key so that
/// `Action::verify_signature()` works.
fn test_identity(seed: u8) -> (AgentId, SigningKey) {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    let agent = AgentId::from(signing_key.verifying_key().to_bytes());
    (agent, signing_key)
}

/// Create a test chain with an in-memory store.
fn test_chain() -> ActionChain {
    ActionChain::new(ChainStore::in_memory())
}

fn create_kind(content: &[u8]) -> ActionKind {
    ActionKind::Create {
        entry_hash: EntryHash::from_data(content),
    }
}
