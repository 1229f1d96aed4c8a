//! Spanning forest over the node-label graph.
//!
//! The forest exists to answer path queries in O(depth) and to keep the
//! cycle-basis construction simple: each node stores a parent pointer, a tree
//! is identified by its root label, and the unique forest path between two
//! labels is found by climbing both to their lowest common ancestor.
//!
//! Structural conventions (relied on by the cycle manager and its tests):
//!
//! - `add_edge(a, b)` that merges two trees re-roots `b`'s tree and hangs it
//!   under `a`, so the merged root is the root of `a`'s tree,
//! - `remove_edge` cuts a parent link; the child side becomes its own tree and
//!   that endpoint is returned as the split-off node,
//! - `replace_edge` re-hangs the split component onto the new edge without
//!   ever changing connectivity classes, and emits no split/merge events.

use std::fmt;

use indexmap::IndexMap;

/// Callbacks for structural forest changes.
///
/// All methods default to no-ops so implementers only override what they
/// observe. `up` is always the endpoint closer to the original root of the
/// affected tree and `down` the endpoint on the far side.
pub trait ForestListener {
    /// A tree split in two; `down` now roots the split-off tree.
    fn tree_split(&mut self, _original_root: &str, _up: &str, _down: &str) {}

    /// Two formerly disjoint trees merged under `merged_root`.
    fn trees_merged(&mut self, _merged_root: &str, _up: &str, _down: &str) {}

    /// An edge extended an existing tree with a fresh node (no merge).
    fn edge_added(&mut self, _a: &str, _b: &str) {}

    /// A node lost its last forest edge and left the forest.
    fn node_removed(&mut self, _label: &str) {}
}

#[derive(Debug, Clone)]
struct NodeEntry {
    parent: Option<String>,
    degree: usize,
}

/// A set of rooted trees spanning the labels connected by forest edges.
#[derive(Default)]
pub struct Forest {
    nodes: IndexMap<String, NodeEntry>,
    listener: Option<Box<dyn ForestListener>>,
}

impl fmt::Debug for Forest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forest")
            .field("nodes", &self.nodes)
            .field("listener", &self.listener.as_ref().map(|_| "…"))
            .finish()
    }
}

impl Forest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the structural-change listener, replacing any previous one.
    pub fn set_listener(&mut self, listener: Box<dyn ForestListener>) {
        self.listener = Some(listener);
    }

    /// Removes the installed listener, if any.
    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// Returns `true` if `label` currently belongs to any tree.
    pub fn contains(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    /// Number of nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the root label of the tree containing `label`.
    pub fn root_of(&self, label: &str) -> Option<String> {
        if !self.nodes.contains_key(label) {
            return None;
        }
        let mut cur = label;
        loop {
            match self.nodes.get(cur).and_then(|n| n.parent.as_deref()) {
                Some(parent) => cur = parent,
                None => return Some(cur.to_owned()),
            }
        }
    }

    /// Returns `true` when both labels exist and share a tree.
    pub fn same_tree(&self, a: &str, b: &str) -> bool {
        match (self.root_of(a), self.root_of(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            (None, _) | (_, None) => false,
        }
    }

    /// Adds the edge `(a, b)` to the forest.
    ///
    /// Returns `true` iff the edge joined two previously disjoint trees (the
    /// forest strictly grew); `false` when both endpoints were already in the
    /// same tree, in which case nothing changes. Self-edges are rejected.
    pub fn add_edge(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        let a_existed = self.nodes.contains_key(a);
        let b_existed = self.nodes.contains_key(b);
        if a_existed && b_existed && self.same_tree(a, b) {
            return false;
        }
        self.ensure_node(a);
        self.ensure_node(b);

        // Hang b's tree under a, so the merged root is a's root.
        self.reroot(b);
        if let Some(entry) = self.nodes.get_mut(b) {
            entry.parent = Some(a.to_owned());
        }
        self.bump_degree(a, 1);
        self.bump_degree(b, 1);

        if a_existed && b_existed {
            let merged_root = self.root_of(a).unwrap_or_else(|| a.to_owned());
            if let Some(listener) = self.listener.as_deref_mut() {
                listener.trees_merged(&merged_root, a, b);
            }
        } else if let Some(listener) = self.listener.as_deref_mut() {
            listener.edge_added(a, b);
        }
        true
    }

    /// Removes the tree edge `(a, b)`.
    ///
    /// Returns the endpoint that now lies in the split-off tree (the side
    /// that no longer contains the original root), or `None` when `(a, b)` is
    /// not a tree link — which indicates a caller error and leaves the forest
    /// unchanged.
    pub fn remove_edge(&mut self, a: &str, b: &str) -> Option<String> {
        let (up, down) = self.link_of(a, b)?;
        let original_root = self.root_of(&up)?;

        if let Some(entry) = self.nodes.get_mut(&down) {
            entry.parent = None;
        }
        self.bump_degree(&up, -1);
        self.bump_degree(&down, -1);

        if let Some(listener) = self.listener.as_deref_mut() {
            listener.tree_split(&original_root, &up, &down);
        }
        self.prune_if_isolated(&up);
        self.prune_if_isolated(&down);
        Some(down)
    }

    /// Replaces the tree edge `old` with the edge `new` without changing
    /// connectivity classes.
    ///
    /// Returns `false` (leaving the forest unchanged) when `old` is not a
    /// tree link, when a `new` endpoint is unknown, or when `new` would not
    /// reconnect the two halves.
    pub fn replace_edge(&mut self, old: (&str, &str), new: (&str, &str)) -> bool {
        let (new_a, new_b) = new;
        if new_a == new_b || !self.contains(new_a) || !self.contains(new_b) {
            return false;
        }
        let Some((up, down)) = self.link_of(old.0, old.1) else {
            return false;
        };

        // Tentatively cut; the split component is now rooted at `down`.
        if let Some(entry) = self.nodes.get_mut(&down) {
            entry.parent = None;
        }
        let a_split = self.root_of(new_a).as_deref() == Some(down.as_str());
        let b_split = self.root_of(new_b).as_deref() == Some(down.as_str());
        let (anchor_split, anchor_main) = match (a_split, b_split) {
            (true, false) => (new_a, new_b),
            (false, true) => (new_b, new_a),
            (true, true) | (false, false) => {
                // The new edge does not bridge the halves; undo the cut.
                if let Some(entry) = self.nodes.get_mut(&down) {
                    entry.parent = Some(up);
                }
                return false;
            }
        };

        self.reroot(anchor_split);
        if let Some(entry) = self.nodes.get_mut(anchor_split) {
            entry.parent = Some(anchor_main.to_owned());
        }
        self.bump_degree(old.0, -1);
        self.bump_degree(old.1, -1);
        self.bump_degree(new_a, 1);
        self.bump_degree(new_b, 1);
        true
    }

    /// Returns the unique forest path from `a` to `b` as an ordered label
    /// sequence (inclusive of both ends), or `None` when the labels are in
    /// different trees. `path(a, a)` is the singleton `[a]`.
    pub fn path(&self, a: &str, b: &str) -> Option<Vec<String>> {
        if !self.contains(a) || !self.contains(b) {
            return None;
        }

        let mut a_chain: Vec<String> = vec![a.to_owned()];
        let mut cur = a;
        while let Some(parent) = self.nodes.get(cur).and_then(|n| n.parent.as_deref()) {
            a_chain.push(parent.to_owned());
            cur = parent;
        }
        let a_pos: IndexMap<&str, usize> = a_chain
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let mut b_side: Vec<String> = Vec::new();
        let mut cur = b.to_owned();
        let lca_pos = loop {
            if let Some(&pos) = a_pos.get(cur.as_str()) {
                break pos;
            }
            b_side.push(cur.clone());
            match self.nodes.get(&cur).and_then(|n| n.parent.clone()) {
                Some(parent) => cur = parent,
                None => return None,
            }
        };

        let mut out = a_chain[..=lca_pos].to_vec();
        out.extend(b_side.into_iter().rev());
        Some(out)
    }

    // -- internals ----------------------------------------------------------

    fn ensure_node(&mut self, label: &str) {
        if !self.nodes.contains_key(label) {
            self.nodes.insert(
                label.to_owned(),
                NodeEntry {
                    parent: None,
                    degree: 0,
                },
            );
        }
    }

    /// Reverses the parent chain so `x` becomes the root of its tree.
    fn reroot(&mut self, x: &str) {
        let mut prev: Option<String> = None;
        let mut cur = x.to_owned();
        loop {
            let next = self.nodes.get(&cur).and_then(|n| n.parent.clone());
            if let Some(entry) = self.nodes.get_mut(&cur) {
                entry.parent = prev;
            }
            prev = Some(cur);
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
    }

    /// Returns `(parent_endpoint, child_endpoint)` of the tree link between
    /// `a` and `b`, or `None` when no such link exists.
    fn link_of(&self, a: &str, b: &str) -> Option<(String, String)> {
        let a_parent = self.nodes.get(a).and_then(|n| n.parent.as_deref());
        let b_parent = self.nodes.get(b).and_then(|n| n.parent.as_deref());
        if a_parent == Some(b) {
            Some((b.to_owned(), a.to_owned()))
        } else if b_parent == Some(a) {
            Some((a.to_owned(), b.to_owned()))
        } else {
            None
        }
    }

    fn bump_degree(&mut self, label: &str, delta: isize) {
        if let Some(entry) = self.nodes.get_mut(label) {
            entry.degree = entry.degree.saturating_add_signed(delta);
        }
    }

    fn prune_if_isolated(&mut self, label: &str) {
        let isolated = self
            .nodes
            .get(label)
            .is_some_and(|entry| entry.degree == 0);
        if isolated {
            self.nodes.shift_remove(label);
            if let Some(listener) = self.listener.as_deref_mut() {
                listener.node_removed(label);
            }
        }
    }
}
