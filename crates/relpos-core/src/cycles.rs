//! Edge, forest and cycle-basis manager.
//!
//! This is the structural core of the engine: a labeled graph of interned
//! edges, a spanning forest over the edges flagged `in_forest`, and a maximal
//! independent set of cycle vectors and watched-path vectors maintained
//! incrementally under edge additions and removals.
//!
//! # Orientation conventions
//!
//! Every edge has a canonical direction (first-insertion endpoint order) and
//! its variable denotes the offset from the canonical start to the canonical
//! end. A cycle vector carries `+1` on its non-forest edge and the signed
//! forest path from that edge's canonical end back to its canonical start,
//! so the oriented component sum of a cycle is identically zero. A
//! watched-path vector for a watched edge `w` carries the signed forest path
//! from `w`'s canonical start to its canonical end — the watched edge itself
//! is never a component — so `offset(w)` equals the vector's weighted
//! component sum.
//!
//! # Edge classification
//!
//! *Normal* edges are first-class constraints and have priority for forest
//! membership: the engine evicts a watched-only forest edge to admit a normal
//! one, and when a normal forest edge is removed it is preferentially
//! replaced by the normal non-forest edge of a cycle through it. *Watched*
//! edges model unknowns whose offset is determined by the path they close.

use indexmap::IndexMap;

use crate::changes::{ChangeKind, ChangeMap, record_change};
use crate::edge_table::EdgeTable;
use crate::forest::{Forest, ForestListener};
use crate::ids::{EdgeId, VectorId};
use crate::vector_set::VectorSet;

/// Per-edge flag state. An edge exists while any flag is set; when the last
/// flag clears, the id is released back to the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EdgeFlags {
    in_forest: bool,
    normal: bool,
    watched: bool,
}

impl EdgeFlags {
    fn dead(self) -> bool {
        !self.in_forest && !self.normal && !self.watched
    }
}

/// Maintains the spanning forest and a maximal independent set of cycle and
/// watched-path vectors over the current graph.
#[derive(Debug)]
pub struct Cycles {
    edges: EdgeTable,
    forest: Forest,
    cycles: VectorSet,
    watched: VectorSet,
    flags: IndexMap<EdgeId, EdgeFlags>,
    /// `cycle vector → its non-forest edge` and the reverse binding.
    cycle_edge: IndexMap<VectorId, EdgeId>,
    edge_cycle: IndexMap<EdgeId, VectorId>,
    /// `watched-path vector → its watched edge` and the reverse binding.
    watched_edge: IndexMap<VectorId, EdgeId>,
    edge_watched: IndexMap<EdgeId, VectorId>,
    changes: ChangeMap,
    watched_changes: ChangeMap,
}

impl Default for Cycles {
    fn default() -> Self {
        Self::new()
    }
}

impl Cycles {
    /// Creates an engine with a fresh edge table.
    pub fn new() -> Self {
        Self::with_edge_table(EdgeTable::new())
    }

    /// Creates an engine over a caller-supplied edge table, so one id space
    /// can be shared with other components.
    pub fn with_edge_table(edges: EdgeTable) -> Self {
        Self {
            edges,
            forest: Forest::new(),
            cycles: VectorSet::unrounded(),
            watched: VectorSet::unrounded(),
            flags: IndexMap::new(),
            cycle_edge: IndexMap::new(),
            edge_cycle: IndexMap::new(),
            watched_edge: IndexMap::new(),
            edge_watched: IndexMap::new(),
            changes: ChangeMap::new(),
            watched_changes: ChangeMap::new(),
        }
    }

    // -- accessors ----------------------------------------------------------

    /// The shared edge table.
    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    /// The spanning forest.
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Installs a forest structural-change listener.
    pub fn set_forest_listener(&mut self, listener: Box<dyn ForestListener>) {
        self.forest.set_listener(listener);
    }

    /// The cycle-basis vector set.
    pub fn cycles(&self) -> &VectorSet {
        &self.cycles
    }

    /// The watched-path vector set.
    pub fn watched_cycles(&self) -> &VectorSet {
        &self.watched
    }

    /// Pending cycle-set change records.
    pub fn changes(&self) -> &ChangeMap {
        &self.changes
    }

    /// Pending watched-set change records.
    pub fn watched_changes(&self) -> &ChangeMap {
        &self.watched_changes
    }

    /// Drains the cycle-set change records.
    pub fn clear_changes(&mut self) -> ChangeMap {
        std::mem::take(&mut self.changes)
    }

    /// Drains the watched-set change records.
    pub fn clear_watched_changes(&mut self) -> ChangeMap {
        std::mem::take(&mut self.watched_changes)
    }

    /// Returns `true` when an edge exists between `a` and `b`.
    pub fn edge_exists(&self, a: &str, b: &str) -> bool {
        self.edges.edge_id(a, b).is_some()
    }

    /// Returns `true` when the edge between `a` and `b` is normal.
    pub fn is_normal(&self, a: &str, b: &str) -> bool {
        self.edges
            .edge_id(a, b)
            .is_some_and(|id| self.is_normal_id(id))
    }

    /// Returns `true` when the edge between `a` and `b` is watched.
    pub fn is_watched(&self, a: &str, b: &str) -> bool {
        self.edges
            .edge_id(a, b)
            .is_some_and(|id| self.is_watched_id(id))
    }

    /// Returns `true` when the edge between `a` and `b` is a forest edge.
    pub fn in_forest(&self, a: &str, b: &str) -> bool {
        self.edges
            .edge_id(a, b)
            .is_some_and(|id| self.in_forest_id(id))
    }

    /// Flag queries by edge id.
    pub fn is_normal_id(&self, id: EdgeId) -> bool {
        self.flags.get(&id).is_some_and(|f| f.normal)
    }

    /// Returns `true` when edge `id` is watched.
    pub fn is_watched_id(&self, id: EdgeId) -> bool {
        self.flags.get(&id).is_some_and(|f| f.watched)
    }

    /// Returns `true` when edge `id` is a forest edge.
    pub fn in_forest_id(&self, id: EdgeId) -> bool {
        self.flags.get(&id).is_some_and(|f| f.in_forest)
    }

    /// Returns `true` when edge `id` participates in any basis cycle.
    pub fn edge_in_cycle(&self, id: EdgeId) -> bool {
        self.cycles.component_count(id) > 0
    }

    /// The canonical endpoints of edge `id`.
    pub fn get_edge_points(&self, id: EdgeId) -> Option<(&str, &str)> {
        self.edges.endpoints(id)
    }

    /// The endpoint of edge `id` opposite to `label`.
    pub fn edge_other_end(&self, id: EdgeId, label: &str) -> Option<&str> {
        self.edges.opposite(label, id)
    }

    /// The root label of the tree containing edge `id`'s endpoints.
    pub fn get_edge_tree_id(&self, id: EdgeId) -> Option<String> {
        let (from, _) = self.edges.endpoints(id)?;
        self.forest.root_of(from)
    }

    /// The non-forest edge bound to cycle vector `cycle`.
    pub fn cycle_non_forest_edge(&self, cycle: VectorId) -> Option<EdgeId> {
        self.cycle_edge.get(&cycle).copied()
    }

    /// The watched edge bound to watched-path vector `path`.
    pub fn watched_cycle_edge(&self, path: VectorId) -> Option<EdgeId> {
        self.watched_edge.get(&path).copied()
    }

    /// Ids of all live edges.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.flags.keys().copied()
    }

    // -- mutations ----------------------------------------------------------

    /// Adds (or reclassifies) the edge between `a` and `b`.
    ///
    /// Each requested flag that is not yet set is applied as an independent
    /// state change; flags are never removed here. Returns the edge id, or
    /// `None` for a self-loop or a request with no flags.
    pub fn add_edge(&mut self, a: &str, b: &str, is_normal: bool, is_watched: bool) -> Option<EdgeId> {
        if a == b {
            log::debug!("rejecting self-loop on {a:?}");
            return None;
        }
        if !is_normal && !is_watched {
            return None;
        }
        let id = self.edges.intern(a, b)?;
        self.flags.entry(id).or_default();
        if is_normal {
            self.add_normal_edge(id);
        }
        if is_watched {
            self.add_watched_edge(id);
        }
        Some(id)
    }

    /// Removes the requested flags from the edge between `a` and `b`.
    ///
    /// The watched flag is dropped first. Returns the label that ended up in
    /// a split-off tree when the removal split the forest; all other outcomes
    /// return `None`. Removing an absent edge or flag is a no-op.
    pub fn remove_edge(
        &mut self,
        a: &str,
        b: &str,
        remove_normal: bool,
        remove_watched: bool,
    ) -> Option<String> {
        let id = self.edges.edge_id(a, b)?;
        self.remove_edge_by_id(id, remove_normal, remove_watched)
    }

    /// Flag removal by edge id; see [`Cycles::remove_edge`].
    pub fn remove_edge_by_id(
        &mut self,
        id: EdgeId,
        remove_normal: bool,
        remove_watched: bool,
    ) -> Option<String> {
        if !self.flags.contains_key(&id) {
            return None;
        }
        let mut split = None;
        if remove_watched {
            split = self.drop_watched_flag(id);
        }
        if remove_normal {
            split = split.or_else(|| self.drop_normal_flag(id));
        }
        split
    }

    /// Writes the forest path between `a` and `b` into `target` as a new
    /// vector: the signed path components plus `-1` at `pair_id`, so the
    /// vector reads as the null relation `offset(pair) − path sum = 0`.
    ///
    /// Returns `None` when the labels are in different trees.
    pub fn add_external_cycle(
        &mut self,
        a: &str,
        b: &str,
        pair_id: EdgeId,
        target: &mut VectorSet,
    ) -> Option<VectorId> {
        let mut components = self.signed_path(a, b)?;
        components.push((pair_id, -1.0));
        Some(target.new_vector(components))
    }

    // -- add paths ----------------------------------------------------------

    fn add_normal_edge(&mut self, id: EdgeId) {
        let flags = self.flags.get(&id).copied().unwrap_or_default();
        if flags.normal {
            return;
        }
        if flags.in_forest {
            // Watched forest edge: upgrade in place.
            self.set_flag(id, |f| f.normal = true);
            return;
        }
        if flags.watched {
            // A watched non-forest edge owns a path vector; the edge is about
            // to be re-derived as a cycle or enter the forest, so the path
            // vector goes away first.
            if let Some(path_vec) = self.edge_watched.shift_remove(&id) {
                self.watched_edge.shift_remove(&path_vec);
                self.watched.remove_vector(path_vec);
                record_change(
                    &mut self.watched_changes,
                    path_vec,
                    ChangeKind::Removed { edge: Some(id) },
                );
            }
        }
        self.set_flag(id, |f| f.normal = true);

        let Some((from, to)) = self.endpoints_owned(id) else {
            return;
        };
        if self.forest.add_edge(&from, &to) {
            self.set_flag(id, |f| f.in_forest = true);
            return;
        }

        // Both endpoints share a tree: the edge closes a cycle. Walk from the
        // canonical end back to the canonical start so the new edge carries
        // +1 and the oriented component sum is zero.
        let Some(path) = self.signed_path(&to, &from) else {
            return;
        };
        let mut candidate: Vec<(EdgeId, f64)> = Vec::with_capacity(path.len() + 1);
        candidate.push((id, 1.0));
        candidate.extend(path.iter().copied());

        let displaced = path
            .iter()
            .copied()
            .find(|&(edge, _)| !self.is_normal_id(edge));
        match displaced {
            None => {
                let cycle = self.cycles.new_vector(candidate);
                self.cycle_edge.insert(cycle, id);
                self.edge_cycle.insert(id, cycle);
                record_change(&mut self.changes, cycle, ChangeKind::Added);
                log::debug!("registered cycle {cycle} closed by {id}");
            }
            Some((old, sigma)) => {
                // A watched-only edge sits on the path: the normal edge takes
                // its forest slot and the displaced edge gets a path vector
                // derived from the candidate cycle.
                self.swap_into_forest(id, old, &candidate, sigma);
            }
        }
    }

    /// Replaces watched-only forest edge `old` with normal edge `id`; the
    /// candidate cycle (containing `old` with sign `sigma`) becomes the
    /// displaced edge's watched-path vector and eliminates `old` from every
    /// other cycle and watched path.
    fn swap_into_forest(
        &mut self,
        id: EdgeId,
        old: EdgeId,
        candidate: &[(EdgeId, f64)],
        sigma: f64,
    ) {
        let Some((from, to)) = self.endpoints_owned(id) else {
            return;
        };
        let Some((old_from, old_to)) = self.endpoints_owned(old) else {
            return;
        };
        if !self
            .forest
            .replace_edge((&old_from, &old_to), (&from, &to))
        {
            log::warn!("forest refused pivot of {old} for {id}; leaving state unchanged");
            return;
        }
        self.set_flag(id, |f| f.in_forest = true);
        self.set_flag(old, |f| f.in_forest = false);
        log::debug!("normal edge {id} displaced watched edge {old} from the forest");

        let path_vector: Vec<(EdgeId, f64)> = candidate
            .iter()
            .copied()
            .filter(|&(edge, _)| edge != old)
            .map(|(edge, value)| (edge, -sigma * value))
            .collect();
        let path_vec = self.watched.new_vector(path_vector.clone());
        self.watched_edge.insert(path_vec, old);
        self.edge_watched.insert(old, path_vec);
        record_change(&mut self.watched_changes, path_vec, ChangeKind::Added);

        // `v − val·e_old + val·path` zeroes v's component on `old` while
        // keeping its meaning; apply to every other vector through `old`.
        for (other, value) in self.cycles.component_vectors(old) {
            self.cycles.set_value(other, old, 0.0);
            self.cycles.add_entries(other, &path_vector, value);
            record_change(&mut self.changes, other, ChangeKind::Changed);
        }
        for (other, value) in self.watched.component_vectors(old) {
            if other == path_vec {
                continue;
            }
            self.watched.set_value(other, old, 0.0);
            self.watched.add_entries(other, &path_vector, value);
            record_change(&mut self.watched_changes, other, ChangeKind::Changed);
        }
    }

    fn add_watched_edge(&mut self, id: EdgeId) {
        let flags = self.flags.get(&id).copied().unwrap_or_default();
        if flags.watched {
            return;
        }
        self.set_flag(id, |f| f.watched = true);
        if flags.normal {
            return;
        }
        let Some((from, to)) = self.endpoints_owned(id) else {
            return;
        };
        if self.forest.add_edge(&from, &to) {
            self.set_flag(id, |f| f.in_forest = true);
            return;
        }
        let Some(path) = self.signed_path(&from, &to) else {
            return;
        };
        let path_vec = self.watched.new_vector(path);
        self.watched_edge.insert(path_vec, id);
        self.edge_watched.insert(id, path_vec);
        record_change(&mut self.watched_changes, path_vec, ChangeKind::Added);
        log::debug!("registered watched path {path_vec} for {id}");
    }

    // -- remove paths -------------------------------------------------------

    fn drop_watched_flag(&mut self, id: EdgeId) -> Option<String> {
        let flags = self.flags.get(&id).copied()?;
        if !flags.watched {
            return None;
        }
        self.set_flag(id, |f| f.watched = false);
        if flags.normal {
            // Forest slot or cycle membership is owed to the normal flag.
            return None;
        }
        if !flags.in_forest {
            if let Some(path_vec) = self.edge_watched.shift_remove(&id) {
                self.watched_edge.shift_remove(&path_vec);
                self.watched.remove_vector(path_vec);
                record_change(
                    &mut self.watched_changes,
                    path_vec,
                    ChangeKind::Removed { edge: Some(id) },
                );
            }
            self.release_if_dead(id);
            return None;
        }
        let split = self.evict_from_forest(id, false);
        self.release_if_dead(id);
        split
    }

    fn drop_normal_flag(&mut self, id: EdgeId) -> Option<String> {
        let flags = self.flags.get(&id).copied()?;
        if !flags.normal {
            return None;
        }
        self.set_flag(id, |f| f.normal = false);
        if !flags.in_forest {
            // A normal non-forest edge closes exactly one basis cycle.
            if let Some(cycle) = self.edge_cycle.shift_remove(&id) {
                self.cycle_edge.shift_remove(&cycle);
                let components = self.cycles.entries(cycle);
                self.cycles.remove_vector(cycle);
                record_change(
                    &mut self.changes,
                    cycle,
                    ChangeKind::Removed { edge: Some(id) },
                );
                if flags.watched {
                    self.convert_cycle_to_watched_path(id, &components);
                }
            }
            self.release_if_dead(id);
            return None;
        }
        let split = self.evict_from_forest(id, flags.watched);
        self.release_if_dead(id);
        split
    }

    /// Rebuilds a removed cycle's remainder as the watched-path vector of its
    /// (still watched) closing edge.
    fn convert_cycle_to_watched_path(&mut self, id: EdgeId, components: &[(EdgeId, f64)]) {
        let sigma = components
            .iter()
            .find(|&&(edge, _)| edge == id)
            .map_or(1.0, |&(_, value)| value);
        let path_vector: Vec<(EdgeId, f64)> = components
            .iter()
            .copied()
            .filter(|&(edge, _)| edge != id)
            .map(|(edge, value)| (edge, -sigma * value))
            .collect();
        let path_vec = self.watched.new_vector(path_vector);
        self.watched_edge.insert(path_vec, id);
        self.edge_watched.insert(id, path_vec);
        record_change(&mut self.watched_changes, path_vec, ChangeKind::Added);
    }

    /// Takes forest edge `id` out of the forest, restructuring the basis.
    ///
    /// Preference order: promote the non-forest edge of a cycle through `id`;
    /// failing that keep the edge in the forest when it is still watched;
    /// failing that promote the watched edge of a path through `id`; finally
    /// split the tree and report the split-off endpoint.
    fn evict_from_forest(&mut self, id: EdgeId, still_watched: bool) -> Option<String> {
        let (from, to) = self.endpoints_owned(id)?;

        let through_cycles = self.cycles.component_vectors(id);
        if let Some(&(cycle, sigma)) = through_cycles.first() {
            let promoted = self.cycle_edge.get(&cycle).copied()?;
            let (promoted_from, promoted_to) = self.endpoints_owned(promoted)?;
            if !self
                .forest
                .replace_edge((&from, &to), (&promoted_from, &promoted_to))
            {
                log::warn!("forest refused promotion of {promoted}; leaving state unchanged");
                return None;
            }
            self.cycle_edge.shift_remove(&cycle);
            self.edge_cycle.shift_remove(&promoted);
            self.set_flag(promoted, |f| f.in_forest = true);
            self.set_flag(id, |f| f.in_forest = false);
            log::debug!("promoted cycle edge {promoted} into the forest for removal of {id}");

            let components = self.cycles.entries(cycle);
            for &(other, value) in through_cycles.iter().skip(1) {
                let scalar = -value / sigma;
                self.cycles.add_entries(other, &components, scalar);
                self.cycles.set_value(other, id, 0.0);
                record_change(&mut self.changes, other, ChangeKind::Changed);
            }
            for (other, value) in self.watched.component_vectors(id) {
                let scalar = -value / sigma;
                self.watched.add_entries(other, &components, scalar);
                self.watched.set_value(other, id, 0.0);
                record_change(&mut self.watched_changes, other, ChangeKind::Changed);
            }
            self.cycles.remove_vector(cycle);
            record_change(
                &mut self.changes,
                cycle,
                ChangeKind::Removed { edge: Some(promoted) },
            );
            if still_watched {
                self.convert_cycle_to_watched_path(id, &components);
            }
            return None;
        }

        if still_watched {
            // No cycle can free the slot; the edge stays in the forest as a
            // plain watched edge.
            return None;
        }

        let through_watched = self.watched.component_vectors(id);
        if let Some(&(path_vec, value)) = through_watched.first() {
            let promoted = self.watched_edge.get(&path_vec).copied()?;
            let (promoted_from, promoted_to) = self.endpoints_owned(promoted)?;
            if !self
                .forest
                .replace_edge((&from, &to), (&promoted_from, &promoted_to))
            {
                log::warn!("forest refused promotion of {promoted}; leaving state unchanged");
                return None;
            }
            self.watched_edge.shift_remove(&path_vec);
            self.edge_watched.shift_remove(&promoted);
            self.set_flag(promoted, |f| f.in_forest = true);
            self.set_flag(id, |f| f.in_forest = false);
            log::debug!("promoted watched edge {promoted} into the forest for removal of {id}");

            // The promoted path plus `−1` on its own edge is a null relation;
            // use it to eliminate `id` from the remaining paths.
            let mut relation = self.watched.entries(path_vec);
            relation.push((promoted, -1.0));
            for &(other, other_value) in through_watched.iter().skip(1) {
                let scalar = -other_value / value;
                self.watched.add_entries(other, &relation, scalar);
                self.watched.set_value(other, id, 0.0);
                record_change(&mut self.watched_changes, other, ChangeKind::Changed);
            }
            self.watched.remove_vector(path_vec);
            record_change(
                &mut self.watched_changes,
                path_vec,
                ChangeKind::Removed { edge: Some(promoted) },
            );
            return None;
        }

        // Nothing passes through the edge: the tree genuinely splits.
        self.set_flag(id, |f| f.in_forest = false);
        let split = self.forest.remove_edge(&from, &to);
        if let Some(down) = &split {
            log::debug!("forest split at {id}; {down} roots the split-off tree");
        }
        split
    }

    // -- shared helpers -----------------------------------------------------

    fn endpoints_owned(&self, id: EdgeId) -> Option<(String, String)> {
        self.edges
            .endpoints(id)
            .map(|(from, to)| (from.to_owned(), to.to_owned()))
    }

    fn set_flag<F>(&mut self, id: EdgeId, mutate: F)
    where
        F: FnOnce(&mut EdgeFlags),
    {
        if let Some(flags) = self.flags.get_mut(&id) {
            mutate(flags);
        }
    }

    fn release_if_dead(&mut self, id: EdgeId) {
        if self.flags.get(&id).copied().is_some_and(EdgeFlags::dead) {
            self.flags.shift_remove(&id);
            self.edges.release(id);
        }
    }

    /// Signed forest path from `from` to `to`: one `(edge, ±1)` pair per
    /// step, positive when the step follows the edge's canonical direction.
    fn signed_path(&self, from: &str, to: &str) -> Option<Vec<(EdgeId, f64)>> {
        let labels = self.forest.path(from, to)?;
        let mut components = Vec::with_capacity(labels.len().saturating_sub(1));
        for pair in labels.windows(2) {
            let id = self.edges.edge_id(&pair[0], &pair[1])?;
            let (canonical_from, _) = self.edges.endpoints(id)?;
            let sign = if canonical_from == pair[0] { 1.0 } else { -1.0 };
            components.push((id, sign));
        }
        Some(components)
    }
}
