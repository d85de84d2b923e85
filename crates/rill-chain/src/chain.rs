//! Per-author action chains: local append and remote ingest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ed25519_dalek::SigningKey;
use rill_types::{ActionHash, AgentId, HybridClock};
use tracing::{debug, warn};

use crate::action::{Action, ActionKind};
use crate::error::ChainError;
use crate::store::ChainStore;

type Result<T> = std::result::Result<T, ChainError>;

/// Append-only, hash-linked, signed chains, one per author.
///
/// Local commits for an author are serialized by a per-author writer lock:
/// each new action is built against the head observed under that lock, so
/// two concurrent local writes can never claim the same position.
///
/// Remote actions are verified and stored as they arrive. Gaps are tolerated
/// (a peer may only send the actions of one lineage), but two different
/// actions claiming the same `(author, prev)` position are a fork and are
/// rejected.
pub struct ActionChain {
    store: ChainStore,
    clock: HybridClock,
    writers: Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
}

impl ActionChain {
    /// Create a chain over the given store.
    pub fn new(store: ChainStore) -> Self {
        Self {
            store,
            clock: HybridClock::new(),
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Build, sign and commit a new action at the head of the signer's chain.
    pub fn append(&self, signer: &SigningKey, kind: ActionKind) -> Result<Action> {
        let author = AgentId::from(signer.verifying_key().to_bytes());
        let writer = self.writer(&author);
        let _guard = writer.lock().expect("lock poisoned");

        let head = self.head(&author)?;
        let (seq, prev) = match &head {
            Some(h) => {
                self.clock.witness(h.timestamp);
                (h.seq + 1, Some(h.hash))
            }
            None => (0, None),
        };

        let action = Action::new_signed(seq, prev, self.clock.tick(), kind, signer);
        self.commit(&action)?;

        debug!(
            hash = %action.hash,
            author = %author.short(),
            seq,
            kind = action.kind.name(),
            "appended action"
        );

        Ok(action)
    }

    /// Append two actions back to back under one writer lock.
    ///
    /// `then` builds the second action's kind from the first action. Either
    /// both actions are committed or neither is: if the second commit fails,
    /// the first is rolled back and the head restored.
    pub fn append_pair(
        &self,
        signer: &SigningKey,
        first: ActionKind,
        then: impl FnOnce(&Action) -> ActionKind,
    ) -> Result<(Action, Action)> {
        let author = AgentId::from(signer.verifying_key().to_bytes());
        let writer = self.writer(&author);
        let _guard = writer.lock().expect("lock poisoned");

        let head = self.head(&author)?;
        let (seq, prev) = match &head {
            Some(h) => {
                self.clock.witness(h.timestamp);
                (h.seq + 1, Some(h.hash))
            }
            None => (0, None),
        };

        let a = Action::new_signed(seq, prev, self.clock.tick(), first, signer);
        let b = Action::new_signed(seq + 1, Some(a.hash), self.clock.tick(), then(&a), signer);

        self.commit(&a)?;
        if let Err(e) = self.commit(&b) {
            warn!(hash = %a.hash, %e, "second action failed to commit, rolling back");
            if let Err(undo) = self.rollback(&b, &a, prev.as_ref()) {
                warn!(hash = %a.hash, %undo, "rollback failed");
            }
            return Err(e);
        }

        debug!(
            first = %a.hash,
            second = %b.hash,
            author = %author.short(),
            seq,
            "appended action pair"
        );

        Ok((a, b))
    }

    /// Commit an action built and signed elsewhere, which must extend the
    /// author's current head.
    pub fn append_signed(&self, action: &Action) -> Result<()> {
        Self::verify(action)?;

        let writer = self.writer(&action.author);
        let _guard = writer.lock().expect("lock poisoned");

        let head = self.head(&action.author)?;
        let expected = head.as_ref().map(|h| h.hash);
        if action.prev_action != expected {
            return Err(ChainError::HeadMismatch {
                author: action.author,
                action: action.hash,
                expected,
                found: action.prev_action,
            });
        }
        Self::check_link(head.as_ref(), action)?;

        self.clock.witness(action.timestamp);
        self.commit(action)?;

        debug!(hash = %action.hash, seq = action.seq, "appended pre-signed action");
        Ok(())
    }

    /// Verify and store an action received from a peer.
    ///
    /// Returns `true` if the action was new.
    pub fn ingest(&self, action: &Action) -> Result<bool> {
        if self.store.has_action(&action.hash)? {
            return Ok(false);
        }

        Self::verify(action)?;

        let writer = self.writer(&action.author);
        let _guard = writer.lock().expect("lock poisoned");

        if self.store.has_action(&action.hash)? {
            return Ok(false);
        }

        if let Some(existing) = self
            .store
            .get_slot(&action.author, action.prev_action.as_ref())?
            && existing != action.hash
        {
            warn!(
                author = %action.author.short(),
                %existing,
                incoming = %action.hash,
                "rejecting forked action"
            );
            return Err(ChainError::Fork {
                author: action.author,
                prev: action.prev_action,
                existing,
                incoming: action.hash,
            });
        }

        match action.prev_action {
            Some(prev_hash) => {
                if let Some(prev) = self.store.get_action(&prev_hash)? {
                    Self::check_link(Some(&prev), action)?;
                }
            }
            None => Self::check_link(None, action)?,
        }

        self.clock.witness(action.timestamp);
        self.commit(action)?;

        debug!(
            hash = %action.hash,
            author = %action.author.short(),
            seq = action.seq,
            kind = action.kind.name(),
            "ingested remote action"
        );

        Ok(true)
    }

    /// Retrieve an action by hash.
    pub fn get(&self, hash: &ActionHash) -> Result<Option<Action>> {
        self.store.get_action(hash)
    }

    /// Whether an action is stored locally.
    pub fn contains(&self, hash: &ActionHash) -> Result<bool> {
        self.store.has_action(hash)
    }

    /// The highest-seq action known for `author`.
    pub fn head(&self, author: &AgentId) -> Result<Option<Action>> {
        match self.store.get_head(author)? {
            Some(hash) => self.store.get_action(&hash),
            None => Ok(None),
        }
    }

    /// All authors with at least one stored action.
    pub fn authors(&self) -> Result<Vec<AgentId>> {
        self.store.authors()
    }

    /// Every stored action, in no particular order.
    pub fn all_actions(&self) -> Result<Vec<Action>> {
        self.store.all_actions()
    }

    /// The author's chain, oldest first.
    ///
    /// Returns `MissingAction` if an action between the head and genesis is
    /// not stored locally.
    pub fn chain_of(&self, author: &AgentId) -> Result<Vec<Action>> {
        let mut chain = Vec::new();
        let mut next = self.store.get_head(author)?;

        while let Some(hash) = next {
            let action = self
                .store
                .get_action(&hash)?
                .ok_or(ChainError::MissingAction(hash))?;
            next = action.prev_action;
            chain.push(action);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Re-verify every hash, signature and link in the author's chain.
    ///
    /// Returns the chain length.
    pub fn verify_chain(&self, author: &AgentId) -> Result<usize> {
        let chain = self.chain_of(author)?;
        let mut prev: Option<&Action> = None;

        for action in &chain {
            Self::verify(action)?;
            if action.author != *author {
                return Err(ChainError::BrokenLink {
                    action: action.hash,
                    reason: format!("authored by {} in chain of {}", action.author, author),
                });
            }
            Self::check_link(prev, action)?;
            prev = Some(action);
        }

        Ok(chain.len())
    }

    /// Advance the clock past a remote timestamp.
    pub fn witness(&self, timestamp: u64) {
        self.clock.witness(timestamp);
    }

    /// Return a reference to the underlying store.
    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    // ----- Internal -----

    fn writer(&self, author: &AgentId) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().expect("lock poisoned");
        writers.entry(*author).or_default().clone()
    }

    fn verify(action: &Action) -> Result<()> {
        if !action.verify_hash() {
            return Err(ChainError::InvalidHash(action.hash));
        }
        if !action.verify_signature() {
            return Err(ChainError::InvalidSignature(action.hash));
        }
        Ok(())
    }

    /// Check `action` against its predecessor (or against genesis rules).
    fn check_link(prev: Option<&Action>, action: &Action) -> Result<()> {
        let broken = |reason: String| ChainError::BrokenLink {
            action: action.hash,
            reason,
        };

        match prev {
            None => {
                if action.seq != 0 {
                    return Err(broken(format!("genesis action has seq {}", action.seq)));
                }
            }
            Some(prev) => {
                if prev.author != action.author {
                    return Err(broken(format!("predecessor authored by {}", prev.author)));
                }
                if action.seq != prev.seq + 1 {
                    return Err(broken(format!(
                        "seq {} does not follow {}",
                        action.seq, prev.seq
                    )));
                }
                if action.timestamp <= prev.timestamp {
                    return Err(broken(format!(
                        "timestamp {} not after {}",
                        action.timestamp, prev.timestamp
                    )));
                }
            }
        }
        Ok(())
    }

    /// Undo a partial [`append_pair`](Self::append_pair): drop whatever of
    /// `second` was written, then `first`, and point the head back at `prev`.
    fn rollback(&self, second: &Action, first: &Action, prev: Option<&ActionHash>) -> Result<()> {
        for action in [second, first] {
            if self.store.get_slot(&action.author, action.prev_action.as_ref())?
                == Some(action.hash)
            {
                self.store
                    .remove_slot(&action.author, action.prev_action.as_ref())?;
            }
            self.store.remove_action(&action.hash)?;
        }
        match prev {
            Some(hash) => self.store.set_head(&first.author, hash),
            None => self.store.remove_head(&first.author),
        }
    }

    /// Store the action, claim its chain position and advance the head.
    fn commit(&self, action: &Action) -> Result<()> {
        self.store.put_action(action)?;
        self.store
            .put_slot(&action.author, action.prev_action.as_ref(), &action.hash)?;

        let advance = match self.head(&action.author)? {
            Some(head) => action.seq > head.seq,
            None => true,
        };
        if advance {
            self.store.set_head(&action.author, &action.hash)?;
        }
        Ok(())
    }
}
