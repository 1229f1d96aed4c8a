//! Incrementally maintained inner products between two vector sets.
//!
//! For a *vector* set and a *dual* set, the cache stores
//! `{dual → {vector → value}}` for the nonzero dot products only. The cache
//! owns neither set: the owner routes every mutation of either side through
//! the mirror operation here, passing the *other* set by reference so the
//! update can walk its inverse index. Zero products are deleted on the spot,
//! with the usual relative rounding snap applied to near-cancellations.

use indexmap::{IndexMap, IndexSet};

use crate::ids::{EdgeId, VectorId};
use crate::rounding::Rounding;
use crate::vector_set::VectorSet;

/// Which of the two sets a mutated vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The primal set (`vector_set`).
    Vectors,
    /// The dual set (`dual_set`).
    Duals,
}

/// Sparse cache of nonzero inner products between two vector sets.
#[derive(Debug, Default)]
pub struct InnerProducts {
    /// `dual → {vector → product}`.
    products: IndexMap<VectorId, IndexMap<VectorId, f64>>,
    /// `vector → duals with a nonzero product` (reverse index).
    by_vector: IndexMap<VectorId, IndexSet<VectorId>>,
    rounding: Rounding,
}

impl InnerProducts {
    /// Creates an empty cache with the given rounding threshold.
    pub fn new(zero_rounding: f64) -> Self {
        Self {
            products: IndexMap::new(),
            by_vector: IndexMap::new(),
            rounding: Rounding::new(zero_rounding),
        }
    }

    /// The cached product of `dual` and `vec` (`0.0` when absent).
    pub fn product(&self, dual: VectorId, vec: VectorId) -> f64 {
        self.products
            .get(&dual)
            .and_then(|row| row.get(&vec).copied())
            .unwrap_or(0.0)
    }

    /// Snapshot of all nonzero products of `dual`.
    pub fn products_for_dual(&self, dual: VectorId) -> Vec<(VectorId, f64)> {
        self.products
            .get(&dual)
            .map(|row| row.iter().map(|(&v, &p)| (v, p)).collect())
            .unwrap_or_default()
    }

    /// Duals with a nonzero product against `vec`.
    pub fn duals_for_vector(&self, vec: VectorId) -> Vec<VectorId> {
        self.by_vector
            .get(&vec)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of stored (nonzero) products.
    pub fn len(&self) -> usize {
        self.products.values().map(IndexMap::len).sum()
    }

    /// Returns `true` when no products are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mirrors a single-component change: vector `id` on `side` moved by
    /// `delta` at `key`. Walks the *other* set's inverse index for `key` and
    /// adjusts each affected product.
    pub fn add_to_products(
        &mut self,
        side: Side,
        id: VectorId,
        key: EdgeId,
        delta: f64,
        other: &VectorSet,
    ) {
        if delta == 0.0 {
            return;
        }
        for (other_id, other_value) in other.component_vectors(key) {
            let (dual, vec) = Self::orient(side, id, other_id);
            let prev = self.product(dual, vec);
            let next = self.rounding.snap(prev + other_value * delta, prev);
            self.store(dual, vec, next);
        }
    }

    /// Recomputes the full row/column of `id` from scratch.
    pub fn calc_inner_products(
        &mut self,
        side: Side,
        id: VectorId,
        own: &VectorSet,
        other: &VectorSet,
    ) {
        self.init_inner_products(side, id);
        for (key, value) in own.entries(id) {
            self.add_to_products(side, id, key, value, other);
        }
    }

    /// Ensures a fresh, empty row/column for `id`.
    pub fn init_inner_products(&mut self, side: Side, id: VectorId) {
        match side {
            Side::Vectors => {
                for dual in self.duals_for_vector(id) {
                    self.store(dual, id, 0.0);
                }
            }
            Side::Duals => {
                for (vec, _) in self.products_for_dual(id) {
                    self.store(id, vec, 0.0);
                }
            }
        }
    }

    /// Mirrors `add_to ← add_to + scalar · to_add` on `side` in one pass
    /// over the cached products, with no walk of either vector set.
    pub fn add_vectors(&mut self, side: Side, add_to: VectorId, to_add: VectorId, scalar: f64) {
        if scalar == 0.0 || add_to == to_add {
            return;
        }
        match side {
            Side::Vectors => {
                for dual in self.duals_for_vector(to_add) {
                    let contribution = self.product(dual, to_add) * scalar;
                    let prev = self.product(dual, add_to);
                    let next = self.rounding.snap(prev + contribution, prev);
                    self.store(dual, add_to, next);
                }
            }
            Side::Duals => {
                for (vec, value) in self.products_for_dual(to_add) {
                    let prev = self.product(add_to, vec);
                    let next = self.rounding.snap(prev + value * scalar, prev);
                    self.store(add_to, vec, next);
                }
            }
        }
    }

    /// Mirrors a scalar multiply of `id` on `side`; a zero scalar clears the
    /// row/column.
    pub fn multiply_vector(&mut self, side: Side, id: VectorId, scalar: f64) {
        if scalar == 1.0 {
            return;
        }
        match side {
            Side::Vectors => {
                for dual in self.duals_for_vector(id) {
                    let next = self.product(dual, id) * scalar;
                    self.store(dual, id, next);
                }
            }
            Side::Duals => {
                for (vec, value) in self.products_for_dual(id) {
                    self.store(id, vec, value * scalar);
                }
            }
        }
    }

    /// Drops every product involving `id` on `side`.
    pub fn remove_vector(&mut self, side: Side, id: VectorId) {
        self.init_inner_products(side, id);
    }

    /// Drops the single product of `vec` and `dual`.
    pub fn set_to_zero(&mut self, vec: VectorId, dual: VectorId) {
        self.store(dual, vec, 0.0);
    }

    // -- internals ----------------------------------------------------------

    fn orient(side: Side, id: VectorId, other_id: VectorId) -> (VectorId, VectorId) {
        match side {
            Side::Vectors => (other_id, id),
            Side::Duals => (id, other_id),
        }
    }

    /// Writes one product, keeping the forward table and the reverse index
    /// in step; zero deletes.
    fn store(&mut self, dual: VectorId, vec: VectorId, value: f64) {
        if value == 0.0 {
            if let Some(row) = self.products.get_mut(&dual) {
                row.shift_remove(&vec);
                if row.is_empty() {
                    self.products.shift_remove(&dual);
                }
            }
            if let Some(set) = self.by_vector.get_mut(&vec) {
                set.shift_remove(&dual);
                if set.is_empty() {
                    self.by_vector.shift_remove(&vec);
                }
            }
            return;
        }
        self.products.entry(dual).or_default().insert(vec, value);
        self.by_vector.entry(vec).or_default().insert(dual);
    }
}
