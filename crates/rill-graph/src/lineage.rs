//! One origin's revision DAG and its winning path.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};

use rill_chain::Action;
use rill_types::ActionHash;

/// Revisions descending from a single `Create`.
///
/// Updates may arrive before the `Create` or before the revision they
/// supersede. They are kept as dangling edges in `children` and become
/// reachable as soon as their predecessor is recorded.
#[derive(Debug, Default)]
pub(crate) struct Lineage {
    create: Option<Action>,
    updates: HashMap<ActionHash, Action>,
    /// previous_hash → updates that supersede it.
    children: HashMap<ActionHash, Vec<ActionHash>>,
    /// Origin first, latest revision last. Empty until the `Create` is known.
    winning_path: Vec<ActionHash>,
}

impl Lineage {
    pub(crate) fn set_create(&mut self, action: Action) {
        self.create = Some(action);
        self.recompute();
    }

    pub(crate) fn add_update(&mut self, action: Action, previous_hash: ActionHash) {
        let hash = action.hash;
        self.updates.insert(hash, action);
        self.children.entry(previous_hash).or_default().push(hash);
        self.recompute();
    }

    pub(crate) fn get(&self, hash: &ActionHash) -> Option<&Action> {
        match &self.create {
            Some(create) if create.hash == *hash => Some(create),
            _ => self.updates.get(hash),
        }
    }

    pub(crate) fn create(&self) -> Option<&Action> {
        self.create.as_ref()
    }

    pub(crate) fn latest(&self) -> Option<&Action> {
        self.winning_path.last().and_then(|h| self.get(h))
    }

    pub(crate) fn winning_path(&self) -> Vec<Action> {
        self.winning_path
            .iter()
            .filter_map(|h| self.get(h).cloned())
            .collect()
    }

    /// The create plus every recorded update, reachable or not.
    pub(crate) fn members(&self) -> impl Iterator<Item = &Action> {
        self.create.iter().chain(self.updates.values())
    }

    /// `start` and every update reachable forward from it.
    pub(crate) fn descendants(&self, start: ActionHash) -> HashSet<ActionHash> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(hash) = queue.pop_front() {
            for child in self.children.get(&hash).into_iter().flatten() {
                if seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }

        seen
    }

    /// Walk forward from the origin, taking the latest child at each branch.
    fn recompute(&mut self) {
        self.winning_path.clear();

        let Some(create) = &self.create else {
            return;
        };

        let mut current = create.hash;
        self.winning_path.push(current);

        // A path can't be longer than the number of updates.
        for _ in 0..self.updates.len() {
            let next = self
                .children
                .get(&current)
                .into_iter()
                .flatten()
                .filter_map(|h| self.updates.get(h))
                .max_by_key(|a| (a.timestamp, Reverse(a.hash)));

            match next {
                Some(action) => {
                    current = action.hash;
                    self.winning_path.push(current);
                }
                None => break,
            }
        }
    }
}
