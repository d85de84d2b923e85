//! Derived index over actions: revision lineages, deletes and links.
//!
//! The [`RevisionGraph`] is rebuilt from the action chains on startup and
//! updated incrementally as actions are committed or ingested. It never
//! stores anything the chains don't already hold.
//!
//! A *lineage* is everything descending from one `Create` (its origin):
//! updates form a DAG through `previous_hash`, and the *winning path* walks
//! that DAG forward from the origin, taking at each branch the child with the
//! latest timestamp (ties go to the lowest hash).

mod graph;
mod lineage;

#[cfg(test)]
mod tests;

pub use graph::RevisionGraph;
