//! Sparse vectors keyed by edge id, with an inverse component index.
//!
//! A `VectorSet` owns a family of sparse vectors and keeps, for every
//! component key, the set of vectors with a nonzero value there. The inverse
//! index is consistent with forward storage after every call returns, zeros
//! are never stored, and every transition of a key between
//! absent-in-any-vector and present is recorded in the component diff for the
//! owner to drain.

use indexmap::IndexMap;

use crate::changes::{ComponentChange, ComponentChangeMap, record_component_change};
use crate::ids::{EdgeId, VectorId};
use crate::rounding::Rounding;

/// One sparse vector: a map from component key to a nonzero signed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    values: IndexMap<EdgeId, f64>,
}

impl SparseVector {
    /// The value at `key`, `0.0` when absent.
    pub fn value(&self, key: EdgeId) -> f64 {
        self.values.get(&key).copied().unwrap_or(0.0)
    }

    /// Iterates `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, f64)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    /// Number of nonzero components.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when every component is zero.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A family of sparse vectors with inverse indexing by component.
#[derive(Debug)]
pub struct VectorSet {
    vectors: IndexMap<VectorId, SparseVector>,
    /// `component → {vector → value}`; buckets are dropped when emptied.
    inverse: IndexMap<EdgeId, IndexMap<VectorId, f64>>,
    component_changes: ComponentChangeMap,
    rounding: Rounding,
    next_id: u32,
    nonzero_entries: usize,
}

impl VectorSet {
    /// Creates an empty set with the given rounding policy.
    pub fn new(rounding: Rounding) -> Self {
        Self {
            vectors: IndexMap::new(),
            inverse: IndexMap::new(),
            component_changes: ComponentChangeMap::new(),
            rounding,
            next_id: 0,
            nonzero_entries: 0,
        }
    }

    /// Creates an empty set with snapping disabled.
    pub fn unrounded() -> Self {
        Self::new(Rounding::disabled())
    }

    /// The set's rounding policy.
    pub fn rounding(&self) -> Rounding {
        self.rounding
    }

    /// Number of vectors (including all-zero ones).
    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    /// Total number of stored (nonzero) entries over all vectors.
    pub fn nonzero_size(&self) -> usize {
        self.nonzero_entries
    }

    /// Returns `true` when the set holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Creates a vector from initial `(key, value)` pairs; zero values are
    /// skipped. Returns the new vector's id. Ids are never recycled.
    pub fn new_vector<I>(&mut self, initial: I) -> VectorId
    where
        I: IntoIterator<Item = (EdgeId, f64)>,
    {
        let id = VectorId(self.next_id);
        self.next_id += 1;
        self.vectors.insert(id, SparseVector::default());
        for (key, value) in initial {
            if value != 0.0 {
                self.store(id, key, value);
            }
        }
        id
    }

    /// Returns `true` if `id` refers to a live vector.
    pub fn contains(&self, id: VectorId) -> bool {
        self.vectors.contains_key(&id)
    }

    /// Borrows the vector behind `id`.
    pub fn vector(&self, id: VectorId) -> Option<&SparseVector> {
        self.vectors.get(&id)
    }

    /// The value of vector `id` at `key`; `0.0` for missing vectors or keys.
    pub fn value(&self, id: VectorId, key: EdgeId) -> f64 {
        self.vectors.get(&id).map_or(0.0, |v| v.value(key))
    }

    /// Snapshot of a vector's `(key, value)` pairs.
    ///
    /// Used wherever the caller mutates the set while consuming the entries.
    pub fn entries(&self, id: VectorId) -> Vec<(EdgeId, f64)> {
        self.vectors
            .get(&id)
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    /// Iterates `(id, vector)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &SparseVector)> + '_ {
        self.vectors.iter().map(|(&id, v)| (id, v))
    }

    /// Iterates the ids of all live vectors.
    pub fn vector_ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.vectors.keys().copied()
    }

    /// Sets vector `id` at `key` to `value`, snapping per the rounding
    /// policy. Returns `false` when the vector does not exist.
    pub fn set_value(&mut self, id: VectorId, key: EdgeId, value: f64) -> bool {
        if !self.vectors.contains_key(&id) {
            return false;
        }
        let prev = self.value(id, key);
        let snapped = self.rounding.snap(value, prev);
        self.store(id, key, snapped);
        true
    }

    /// Adds `delta` to vector `id` at `key` and returns the stored result
    /// (`0.0` when the vector does not exist).
    pub fn add_value(&mut self, id: VectorId, key: EdgeId, delta: f64) -> f64 {
        if !self.vectors.contains_key(&id) {
            return 0.0;
        }
        let prev = self.value(id, key);
        let snapped = self.rounding.snap(prev + delta, prev);
        self.store(id, key, snapped);
        snapped
    }

    /// Adds `scalar ·` vector `to_add` into vector `add_to`, component-wise,
    /// with the usual rounding snap. The two ids may coincide.
    ///
    /// Returns `false` when either vector is missing.
    pub fn add_vector(&mut self, add_to: VectorId, to_add: VectorId, scalar: f64) -> bool {
        if !self.vectors.contains_key(&add_to) || !self.vectors.contains_key(&to_add) {
            return false;
        }
        let source = self.entries(to_add);
        for (key, value) in source {
            self.add_value(add_to, key, value * scalar);
        }
        true
    }

    /// Adds `scalar ·` the given entries into vector `add_to`.
    ///
    /// The cross-set flavor of [`VectorSet::add_vector`]: the source entries
    /// come from anywhere (typically another set's snapshot).
    pub fn add_entries(&mut self, add_to: VectorId, entries: &[(EdgeId, f64)], scalar: f64) -> bool {
        if !self.vectors.contains_key(&add_to) {
            return false;
        }
        for &(key, value) in entries {
            self.add_value(add_to, key, value * scalar);
        }
        true
    }

    /// Multiplies vector `id` by `scalar`; a zero scalar removes all of the
    /// vector's nonzero entries (the vector itself stays).
    pub fn multiply_vector(&mut self, id: VectorId, scalar: f64) -> bool {
        if !self.vectors.contains_key(&id) {
            return false;
        }
        if scalar == 1.0 {
            return true;
        }
        let current = self.entries(id);
        for (key, value) in current {
            self.store(id, key, value * scalar);
        }
        true
    }

    /// Removes vector `id` and all its inverse-index entries.
    pub fn remove_vector(&mut self, id: VectorId) -> bool {
        if !self.vectors.contains_key(&id) {
            return false;
        }
        for (key, _) in self.entries(id) {
            self.store(id, key, 0.0);
        }
        self.vectors.shift_remove(&id);
        true
    }

    /// Iterates the component keys with at least one nonzero entry, in
    /// first-appearance order.
    pub fn components(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.inverse.keys().copied()
    }

    /// Iterates `(vector, value)` pairs with a nonzero value at `key`, in
    /// insertion order of the bucket.
    pub fn component_index(&self, key: EdgeId) -> impl Iterator<Item = (VectorId, f64)> + '_ {
        self.inverse
            .get(&key)
            .into_iter()
            .flat_map(|bucket| bucket.iter().map(|(&id, &v)| (id, v)))
    }

    /// Snapshot of the inverse-index bucket for `key`.
    pub fn component_vectors(&self, key: EdgeId) -> Vec<(VectorId, f64)> {
        self.component_index(key).collect()
    }

    /// Number of vectors with a nonzero value at `key`.
    pub fn component_count(&self, key: EdgeId) -> usize {
        self.inverse.get(&key).map_or(0, IndexMap::len)
    }

    /// Components that transitioned between absent-in-any-vector and present
    /// since the last [`VectorSet::clear_component_changes`].
    pub fn component_changes(&self) -> &ComponentChangeMap {
        &self.component_changes
    }

    /// Drains the component diff, returning it to the caller.
    pub fn clear_component_changes(&mut self) -> ComponentChangeMap {
        std::mem::take(&mut self.component_changes)
    }

    // -- internals ----------------------------------------------------------

    /// Writes `value` at `(id, key)`, maintaining the inverse index, the
    /// nonzero-entry count and the component diff. A zero value deletes.
    fn store(&mut self, id: VectorId, key: EdgeId, value: f64) {
        let Some(vector) = self.vectors.get_mut(&id) else {
            return;
        };
        let prev = vector.values.get(&key).copied().unwrap_or(0.0);
        if value == 0.0 {
            if prev != 0.0 {
                vector.values.shift_remove(&key);
                self.nonzero_entries -= 1;
                if let Some(bucket) = self.inverse.get_mut(&key) {
                    bucket.shift_remove(&id);
                    if bucket.is_empty() {
                        self.inverse.shift_remove(&key);
                        record_component_change(
                            &mut self.component_changes,
                            key,
                            ComponentChange::Removed,
                        );
                    }
                }
            }
            return;
        }
        if prev == 0.0 {
            let fresh_bucket = !self.inverse.contains_key(&key);
            vector.values.insert(key, value);
            self.nonzero_entries += 1;
            self.inverse.entry(key).or_default().insert(id, value);
            if fresh_bucket {
                record_component_change(&mut self.component_changes, key, ComponentChange::Added);
            }
        } else {
            vector.values.insert(key, value);
            if let Some(bucket) = self.inverse.get_mut(&key) {
                bucket.insert(id, value);
            }
        }
    }
}
