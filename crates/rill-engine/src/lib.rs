//! Node orchestrator tying all Rill components together.
//!
//! A [`RillNode`] owns a content store, an action chain and the revision
//! graph derived from it, and replicates over a [`rill_net::Transport`].
//! Callers use the [`EntryEngine`] trait: create, update and delete
//! entries, and read back the latest revision, the full history and the
//! deletes.

pub mod error;
pub mod facade;
pub mod node;
pub mod record;
pub mod sync;

pub use error::EngineError;
pub use facade::EntryEngine;
pub use node::{RillNode, RillNodeConfig};
pub use record::{DeleteRecord, Record, Signal, TextEntry, UpdateEntryInput};
pub use sync::ConvergencePolicy;

#[cfg(test)]
mod tests;
