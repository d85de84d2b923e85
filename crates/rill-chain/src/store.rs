//! Storage backend for action chains (Fjall disk or pure in-memory).

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use rill_types::{ActionHash, AgentId};

use crate::action::Action;
use crate::error::ChainError;

type Result<T> = std::result::Result<T, ChainError>;

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        actions: Keyspace,
        heads: Keyspace,
        slots: Keyspace,
        /// Keeps the directory of a temporary store alive.
        #[allow(dead_code)]
        tmp: Option<tempfile::TempDir>,
    },
    Memory(Box<MemoryBackend>),
}

/// Pure in-memory storage.
struct MemoryBackend {
    /// action hash → serialized Action.
    actions: RwLock<HashMap<[u8; 32], Vec<u8>>>,
    /// author → hash of the highest-seq action known for that author.
    heads: RwLock<HashMap<[u8; 32], [u8; 32]>>,
    /// (author ‖ prev) → action occupying that chain position.
    slots: RwLock<HashMap<Vec<u8>, [u8; 32]>>,
}

/// Persistent storage for actions, per-author heads and chain positions.
pub struct ChainStore {
    backend: Backend,
    /// Action writes still allowed before `put_action` starts failing.
    write_budget: AtomicU64,
}

fn storage_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::Storage(e.to_string())
}

/// Key for the chain position following `prev` in `author`'s chain.
///
/// The genesis position uses an all-zero predecessor.
fn slot_key(author: &AgentId, prev: Option<&ActionHash>) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(author.as_bytes());
    match prev {
        Some(p) => key.extend_from_slice(p.as_bytes()),
        None => key.extend_from_slice(&[0u8; 32]),
    }
    key
}

fn to_hash(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| storage_err(format!("expected 32-byte hash, got {} bytes", bytes.len())))
}

impl ChainStore {
    /// Open a persistent store at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open().map_err(storage_err)?;
        let backend = Self::init_fjall(db, None)?;
        Ok(Self::with_backend(backend))
    }

    /// Open a temporary store backed by Fjall (cleaned up on drop).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(storage_err)?;
        let db = Database::builder(tmp.path())
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        let backend = Self::init_fjall(db, Some(tmp))?;
        Ok(Self::with_backend(backend))
    }

    /// Create a pure in-memory store.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(Box::new(MemoryBackend {
            actions: RwLock::new(HashMap::new()),
            heads: RwLock::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
        })))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            write_budget: AtomicU64::new(u64::MAX),
        }
    }

    /// Let `n` more action writes succeed, then fail every later one with
    /// a storage error. Used to exercise partial-write failures.
    pub fn fail_action_writes_after(&self, n: u64) {
        self.write_budget.store(n, Ordering::SeqCst);
    }

    /// Lift a limit set by [`fail_action_writes_after`](Self::fail_action_writes_after).
    pub fn allow_action_writes(&self) {
        self.write_budget.store(u64::MAX, Ordering::SeqCst);
    }

    fn take_write(&self) -> Result<()> {
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                u64::MAX => Some(u64::MAX),
                0 => None,
                n => Some(n - 1),
            })
            .map(|_| ())
            .map_err(|_| storage_err("action writes disabled"))
    }

    fn init_fjall(db: Database, tmp: Option<tempfile::TempDir>) -> Result<Backend> {
        let actions = db
            .keyspace("chain_actions", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        let heads = db
            .keyspace("chain_heads", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        let slots = db
            .keyspace("chain_slots", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        Ok(Backend::Fjall {
            db,
            actions,
            heads,
            slots,
            tmp,
        })
    }

    // ----- Actions -----

    /// Store an action by its hash.
    pub fn put_action(&self, action: &Action) -> Result<()> {
        self.take_write()?;
        let bytes = postcard::to_allocvec(action)?;
        let key = *action.hash.as_bytes();

        match &self.backend {
            Backend::Fjall { actions, .. } => {
                actions.insert(key, bytes).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.actions.write().expect("lock poisoned").insert(key, bytes);
            }
        }
        Ok(())
    }

    /// Retrieve an action by hash.
    pub fn get_action(&self, hash: &ActionHash) -> Result<Option<Action>> {
        let key = hash.as_bytes();
        let bytes = match &self.backend {
            Backend::Fjall { actions, .. } => {
                actions.get(key).map_err(storage_err)?.map(|v| v.to_vec())
            }
            Backend::Memory(m) => m.actions.read().expect("lock poisoned").get(key).cloned(),
        };

        match bytes {
            Some(b) => Ok(Some(postcard::from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// Delete an action by hash.
    pub fn remove_action(&self, hash: &ActionHash) -> Result<()> {
        match &self.backend {
            Backend::Fjall { actions, .. } => {
                actions.remove(hash.as_bytes()).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.actions.write().expect("lock poisoned").remove(hash.as_bytes());
            }
        }
        Ok(())
    }

    /// Check if an action exists.
    pub fn has_action(&self, hash: &ActionHash) -> Result<bool> {
        let key = hash.as_bytes();
        match &self.backend {
            Backend::Fjall { actions, .. } => Ok(actions.get(key).map_err(storage_err)?.is_some()),
            Backend::Memory(m) => Ok(m.actions.read().expect("lock poisoned").contains_key(key)),
        }
    }

    /// Load every stored action, in no particular order.
    pub fn all_actions(&self) -> Result<Vec<Action>> {
        match &self.backend {
            Backend::Fjall { actions, .. } => {
                let mut result = Vec::new();
                for guard in actions.iter() {
                    let (_, value) = guard.into_inner().map_err(storage_err)?;
                    result.push(postcard::from_bytes(&value)?);
                }
                Ok(result)
            }
            Backend::Memory(m) => {
                let map = m.actions.read().expect("lock poisoned");
                map.values()
                    .map(|b| postcard::from_bytes(b).map_err(ChainError::from))
                    .collect()
            }
        }
    }

    /// Number of stored actions.
    pub fn action_count(&self) -> Result<usize> {
        match &self.backend {
            Backend::Fjall { actions, .. } => {
                let mut count = 0;
                for guard in actions.iter() {
                    guard.key().map_err(storage_err)?;
                    count += 1;
                }
                Ok(count)
            }
            Backend::Memory(m) => Ok(m.actions.read().expect("lock poisoned").len()),
        }
    }

    // ----- Heads -----

    /// Record `hash` as the head of `author`'s chain.
    pub fn set_head(&self, author: &AgentId, hash: &ActionHash) -> Result<()> {
        match &self.backend {
            Backend::Fjall { heads, .. } => {
                heads
                    .insert(*author.as_bytes(), *hash.as_bytes())
                    .map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.heads
                    .write()
                    .expect("lock poisoned")
                    .insert(*author.as_bytes(), *hash.as_bytes());
            }
        }
        Ok(())
    }

    /// Forget the head of `author`'s chain.
    pub fn remove_head(&self, author: &AgentId) -> Result<()> {
        match &self.backend {
            Backend::Fjall { heads, .. } => {
                heads.remove(author.as_bytes()).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.heads.write().expect("lock poisoned").remove(author.as_bytes());
            }
        }
        Ok(())
    }

    /// Hash of the head of `author`'s chain, if any action is known.
    pub fn get_head(&self, author: &AgentId) -> Result<Option<ActionHash>> {
        match &self.backend {
            Backend::Fjall { heads, .. } => match heads.get(author.as_bytes()).map_err(storage_err)? {
                Some(v) => Ok(Some(ActionHash::from(to_hash(&v)?))),
                None => Ok(None),
            },
            Backend::Memory(m) => Ok(m
                .heads
                .read()
                .expect("lock poisoned")
                .get(author.as_bytes())
                .map(|h| ActionHash::from(*h))),
        }
    }

    /// All authors with at least one known action.
    pub fn authors(&self) -> Result<Vec<AgentId>> {
        match &self.backend {
            Backend::Fjall { heads, .. } => {
                let mut result = Vec::new();
                for guard in heads.iter() {
                    let k = guard.key().map_err(storage_err)?;
                    result.push(AgentId::from(to_hash(&k)?));
                }
                Ok(result)
            }
            Backend::Memory(m) => Ok(m
                .heads
                .read()
                .expect("lock poisoned")
                .keys()
                .map(|k| AgentId::from(*k))
                .collect()),
        }
    }

    // ----- Chain positions -----

    /// Action occupying the position after `prev` in `author`'s chain.
    pub fn get_slot(
        &self,
        author: &AgentId,
        prev: Option<&ActionHash>,
    ) -> Result<Option<ActionHash>> {
        let key = slot_key(author, prev);
        match &self.backend {
            Backend::Fjall { slots, .. } => match slots.get(&key).map_err(storage_err)? {
                Some(v) => Ok(Some(ActionHash::from(to_hash(&v)?))),
                None => Ok(None),
            },
            Backend::Memory(m) => Ok(m
                .slots
                .read()
                .expect("lock poisoned")
                .get(&key)
                .map(|h| ActionHash::from(*h))),
        }
    }

    /// Claim the position after `prev` in `author`'s chain for `hash`.
    pub fn put_slot(
        &self,
        author: &AgentId,
        prev: Option<&ActionHash>,
        hash: &ActionHash,
    ) -> Result<()> {
        let key = slot_key(author, prev);
        match &self.backend {
            Backend::Fjall { slots, .. } => {
                slots.insert(key, *hash.as_bytes()).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.slots
                    .write()
                    .expect("lock poisoned")
                    .insert(key, *hash.as_bytes());
            }
        }
        Ok(())
    }

    /// Release the position after `prev` in `author`'s chain.
    pub fn remove_slot(&self, author: &AgentId, prev: Option<&ActionHash>) -> Result<()> {
        let key = slot_key(author, prev);
        match &self.backend {
            Backend::Fjall { slots, .. } => {
                slots.remove(key).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.slots.write().expect("lock poisoned").remove(&key);
            }
        }
        Ok(())
    }
}
