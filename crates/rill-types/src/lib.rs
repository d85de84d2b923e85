//! Shared types and identifiers for Rill.
//!
//! This crate defines the core types used across the Rill workspace:
//! identifiers ([`ActionHash`], [`EntryHash`], [`AgentId`], [`NodeId`]),
//! the polymorphic [`AnyHash`] used by links, the [`HybridClock`] that
//! timestamps every action, and the replication tuning knobs in
//! [`SyncConfig`].

mod clock;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use clock::HybridClock;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First eight hex characters, for log lines.
            pub fn short(&self) -> String {
                self.to_string()[..8].to_string()
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Identity of an action: `blake3(postcard(author, seq, prev, timestamp, kind))`.
    ActionHash
);

define_id!(
    /// Content-addressed identifier for an entry payload: `blake3(bytes)`.
    EntryHash
);

define_id!(
    /// An author, i.e. the raw bytes of its ed25519 verifying key.
    AgentId
);

define_id!(
    /// Identifier for a replica node on the network.
    NodeId
);

/// Either kind of hash a link may point from or to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub enum AnyHash {
    /// An action in some author's chain.
    Action(ActionHash),
    /// A content entry.
    Entry(EntryHash),
}

impl AnyHash {
    /// Return the action hash, if this is one.
    pub fn into_action_hash(self) -> Option<ActionHash> {
        match self {
            AnyHash::Action(hash) => Some(hash),
            AnyHash::Entry(_) => None,
        }
    }
}

impl From<ActionHash> for AnyHash {
    fn from(hash: ActionHash) -> Self {
        AnyHash::Action(hash)
    }
}

impl From<EntryHash> for AnyHash {
    fn from(hash: EntryHash) -> Self {
        AnyHash::Entry(hash)
    }
}

impl fmt::Display for AnyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyHash::Action(h) => write!(f, "action:{h}"),
            AnyHash::Entry(h) => write!(f, "entry:{h}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Replication tuning shared by the engine and the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long `await_convergence` waits before giving up.
    pub convergence_timeout_ms: u64,
    /// First delay between convergence polls.
    pub poll_interval_ms: u64,
    /// Upper bound for the backed-off poll delay.
    pub max_poll_interval_ms: u64,
    /// Per-request timeout when talking to a single peer.
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            convergence_timeout_ms: 30_000,
            poll_interval_ms: 50,
            max_poll_interval_ms: 1_000,
            request_timeout_ms: 2_000,
        }
    }
}

impl SyncConfig {
    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
