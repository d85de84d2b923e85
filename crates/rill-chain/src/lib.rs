//! Append-only, hash-linked, signed action chains.
//!
//! Every mutation in Rill is an [`Action`] authored by an agent. Each agent's
//! actions form a strictly ordered chain: an action carries its position
//! (`seq`) and the hash of the previous action by the same author, and is
//! ed25519-signed over its blake3 hash. Anyone holding the actions can
//! re-derive the hashes and check the chain.
//!
//! [`ActionChain`] commits local actions under a per-author writer lock and
//! ingests remote ones, rejecting forks and tampering with
//! [`ChainError`]. Actions are persisted in a [`ChainStore`] (Fjall on disk or
//! pure in-memory).

mod action;
mod chain;
mod error;
mod store;

#[cfg(test)]
mod tests;

pub use action::{Action, ActionKind, LinkType};
pub use chain::ActionChain;
pub use error::ChainError;
pub use store::ChainStore;
