//! The revision graph: lineages, delete index and link index.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use rill_chain::{Action, ActionKind, LinkType};
use rill_types::{ActionHash, AnyHash};
use tracing::{debug, trace};

use crate::lineage::Lineage;

/// In-memory index answering revision, delete and link queries.
///
/// Lock layout: the outer `lineages` map is only held long enough to find
/// or insert a lineage; each lineage then has its own `RwLock`, and its
/// winning path is recomputed while the write lock is held. The delete and
/// link indexes are independent maps.
#[derive(Default)]
pub struct RevisionGraph {
    /// origin → lineage.
    lineages: RwLock<HashMap<ActionHash, Arc<RwLock<Lineage>>>>,
    /// Create/Update hash → origin of its lineage.
    origins: RwLock<HashMap<ActionHash, ActionHash>>,
    /// Delete target → deletes, ordered by `(timestamp, hash)`.
    deletes: RwLock<HashMap<ActionHash, Vec<Action>>>,
    /// (base, link type) → CreateLink actions.
    links: RwLock<HashMap<(AnyHash, LinkType), Vec<Action>>>,
    /// link_add_hash → DeleteLink actions removing it.
    link_deletes: RwLock<HashMap<ActionHash, Vec<Action>>>,
    /// Every action recorded so far.
    seen: RwLock<HashSet<ActionHash>>,
}

impl RevisionGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a set of actions, in any order.
    pub fn from_actions<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Self {
        let graph = Self::new();
        let mut count = 0usize;
        for action in actions {
            if graph.record(action) {
                count += 1;
            }
        }
        debug!(actions = count, "rebuilt revision graph");
        graph
    }

    /// Incorporate an action. Returns `false` if it was already recorded.
    pub fn record(&self, action: &Action) -> bool {
        if !self
            .seen
            .write()
            .expect("seen lock poisoned")
            .insert(action.hash)
        {
            return false;
        }

        match &action.kind {
            ActionKind::Create { .. } => {
                self.set_origin(action.hash, action.hash);
                let lineage = self.lineage_or_insert(action.hash);
                lineage
                    .write()
                    .expect("lineage lock poisoned")
                    .set_create(action.clone());
            }
            ActionKind::Update {
                original_hash,
                previous_hash,
                ..
            } => {
                self.set_origin(action.hash, *original_hash);
                let lineage = self.lineage_or_insert(*original_hash);
                lineage
                    .write()
                    .expect("lineage lock poisoned")
                    .add_update(action.clone(), *previous_hash);
            }
            ActionKind::Delete { deletes_hash } => {
                let mut deletes = self.deletes.write().expect("delete lock poisoned");
                let list = deletes.entry(*deletes_hash).or_default();
                list.push(action.clone());
                list.sort_by_key(|a| (a.timestamp, a.hash));
            }
            ActionKind::CreateLink {
                base, link_type, ..
            } => {
                self.links
                    .write()
                    .expect("link lock poisoned")
                    .entry((*base, *link_type))
                    .or_default()
                    .push(action.clone());
            }
            ActionKind::DeleteLink { link_add_hash, .. } => {
                self.link_deletes
                    .write()
                    .expect("link lock poisoned")
                    .entry(*link_add_hash)
                    .or_default()
                    .push(action.clone());
            }
        }

        trace!(hash = %action.hash, kind = action.kind.name(), "recorded action");
        true
    }

    /// Whether an action has been recorded.
    pub fn contains(&self, hash: &ActionHash) -> bool {
        self.seen.read().expect("seen lock poisoned").contains(hash)
    }

    /// Origin of the lineage a Create or Update belongs to.
    pub fn origin_of(&self, hash: &ActionHash) -> Option<ActionHash> {
        self.origins
            .read()
            .expect("origin lock poisoned")
            .get(hash)
            .copied()
    }

    /// A recorded Create or Update by hash.
    pub fn entry_action(&self, hash: &ActionHash) -> Option<Action> {
        let origin = self.origin_of(hash)?;
        let lineage = self.lineage(&origin)?;
        let guard = lineage.read().expect("lineage lock poisoned");
        guard.get(hash).cloned()
    }

    /// Origins whose `Create` has been recorded.
    pub fn origins(&self) -> Vec<ActionHash> {
        let lineages: Vec<_> = {
            let map = self.lineages.read().expect("lineage map lock poisoned");
            map.iter().map(|(o, l)| (*o, l.clone())).collect()
        };
        lineages
            .into_iter()
            .filter(|(_, l)| l.read().expect("lineage lock poisoned").create().is_some())
            .map(|(o, _)| o)
            .collect()
    }

    /// Tip of the winning path, or `None` if the origin's `Create` is unknown.
    pub fn latest_revision(&self, origin: &ActionHash) -> Option<Action> {
        let lineage = self.lineage(origin)?;
        let guard = lineage.read().expect("lineage lock poisoned");
        guard.latest().cloned()
    }

    /// The winning path, `Create` first.
    pub fn all_revisions(&self, origin: &ActionHash) -> Vec<Action> {
        match self.lineage(origin) {
            Some(lineage) => lineage
                .read()
                .expect("lineage lock poisoned")
                .winning_path(),
            None => Vec::new(),
        }
    }

    /// Deletes targeting exactly `target`, ordered by `(timestamp, hash)`.
    pub fn all_deletes_for(&self, target: &ActionHash) -> Vec<Action> {
        self.deletes
            .read()
            .expect("delete lock poisoned")
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Earliest delete targeting `target` or any of its revisions.
    ///
    /// For an origin this covers the whole lineage; for an update, the
    /// update and everything that supersedes it.
    pub fn oldest_delete_for(&self, target: &ActionHash) -> Option<Action> {
        let covered = self.covered_by(target);
        let deletes = self.deletes.read().expect("delete lock poisoned");

        covered
            .iter()
            .filter_map(|h| deletes.get(h))
            .flatten()
            .min_by_key(|a| (a.timestamp, a.hash))
            .cloned()
    }

    /// Live links from `base` of the given type, ordered by `(timestamp, hash)`.
    ///
    /// `EntryUpdates` links are permanent: a `DeleteLink` never hides them.
    pub fn links(&self, base: &AnyHash, link_type: LinkType) -> Vec<Action> {
        let permanent = link_type == LinkType::EntryUpdates;
        let removed = self.link_deletes.read().expect("link lock poisoned");
        let mut live: Vec<Action> = self
            .links
            .read()
            .expect("link lock poisoned")
            .get(&(*base, link_type))
            .into_iter()
            .flatten()
            .filter(|a| permanent || !removed.contains_key(&a.hash))
            .cloned()
            .collect();
        live.sort_by_key(|a| (a.timestamp, a.hash));
        live
    }

    /// A recorded CreateLink by hash, if it is still live or not.
    pub fn link_action(&self, hash: &ActionHash) -> Option<Action> {
        self.links
            .read()
            .expect("link lock poisoned")
            .values()
            .flatten()
            .find(|a| a.hash == *hash)
            .cloned()
    }

    /// Everything a peer needs to reproduce this lineage: the create,
    /// every update, deletes of any of them, links based on the origin and
    /// removals of those links. Ordered by `(timestamp, hash)`.
    pub fn lineage_actions(&self, origin: &ActionHash) -> Vec<Action> {
        let mut result: Vec<Action> = match self.lineage(origin) {
            Some(lineage) => lineage
                .read()
                .expect("lineage lock poisoned")
                .members()
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        {
            let deletes = self.deletes.read().expect("delete lock poisoned");
            let mut targets: Vec<ActionHash> = result.iter().map(|a| a.hash).collect();
            targets.push(*origin);
            targets.dedup();
            for target in targets {
                result.extend(deletes.get(&target).into_iter().flatten().cloned());
            }
        }

        let base = AnyHash::from(*origin);
        let links: Vec<Action> = self
            .links
            .read()
            .expect("link lock poisoned")
            .iter()
            .filter(|((b, _), _)| *b == base)
            .flat_map(|(_, v)| v.iter().cloned())
            .collect();
        {
            let removed = self.link_deletes.read().expect("link lock poisoned");
            for link in &links {
                result.extend(removed.get(&link.hash).into_iter().flatten().cloned());
            }
        }
        result.extend(links);

        let mut seen = HashSet::new();
        result.retain(|a| seen.insert(a.hash));
        result.sort_by_key(|a| (a.timestamp, a.hash));
        result
    }

    /// Hashes of deletes targeting any member of the lineage, sorted.
    pub fn lineage_delete_hashes(&self, origin: &ActionHash) -> Vec<ActionHash> {
        let members: Vec<ActionHash> = match self.lineage(origin) {
            Some(lineage) => lineage
                .read()
                .expect("lineage lock poisoned")
                .members()
                .map(|a| a.hash)
                .collect(),
            None => return Vec::new(),
        };

        let deletes = self.deletes.read().expect("delete lock poisoned");
        let mut hashes: Vec<ActionHash> = members
            .iter()
            .filter_map(|m| deletes.get(m))
            .flatten()
            .map(|a| a.hash)
            .collect();
        hashes.sort();
        hashes.dedup();
        hashes
    }

    // ----- Internal -----

    fn lineage(&self, origin: &ActionHash) -> Option<Arc<RwLock<Lineage>>> {
        self.lineages
            .read()
            .expect("lineage map lock poisoned")
            .get(origin)
            .cloned()
    }

    fn lineage_or_insert(&self, origin: ActionHash) -> Arc<RwLock<Lineage>> {
        self.lineages
            .write()
            .expect("lineage map lock poisoned")
            .entry(origin)
            .or_default()
            .clone()
    }

    fn set_origin(&self, hash: ActionHash, origin: ActionHash) {
        self.origins
            .write()
            .expect("origin lock poisoned")
            .insert(hash, origin);
    }

    /// `target` plus the revisions a delete of it also covers.
    fn covered_by(&self, target: &ActionHash) -> HashSet<ActionHash> {
        let Some(origin) = self.origin_of(target) else {
            return HashSet::from([*target]);
        };
        let Some(lineage) = self.lineage(&origin) else {
            return HashSet::from([*target]);
        };
        let guard = lineage.read().expect("lineage lock poisoned");

        if *target == origin {
            let mut all: HashSet<ActionHash> = guard.members().map(|a| a.hash).collect();
            all.insert(origin);
            all
        } else {
            guard.descendants(*target)
        }
    }
}
