//! Change-record maps drained by the engine's owner.
//!
//! The engine reports structural mutations through small tagged maps rather
//! than observer callbacks: each `Cycles` vector set carries a
//! `{vector → ChangeKind}` map and each `VectorSet` carries a
//! `{component → ComponentChange}` map. The owner inspects and then clears
//! them between batches.
//!
//! Merge rules when one vector is touched several times inside a batch:
//!
//! - an `Added` record wins over a later `Changed`,
//! - a later `Removed` of an `Added` entry cancels the record entirely (the
//!   vector was born and died unobserved),
//! - `Removed` of a vector with no prior record keeps the originating edge id
//!   so the owner can still map the record back, since the vector is gone.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{EdgeId, VectorId};

/// One batch-level change to a vector in a cycle or watched-path set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The vector was created in this batch.
    Added,
    /// The vector existed before the batch and its components changed.
    Changed,
    /// The vector was removed. `edge` is the edge the vector belonged to
    /// (the cycle's non-forest edge, or the watched edge of a path vector)
    /// when that association was still known at removal time.
    Removed {
        /// Originating edge of the removed vector, if known.
        edge: Option<EdgeId>,
    },
}

/// Batch change map for one vector set, keyed by vector id.
pub type ChangeMap = IndexMap<VectorId, ChangeKind>;

/// Records `kind` for `id` in `map`, applying the batch merge rules.
pub fn record_change(map: &mut ChangeMap, id: VectorId, kind: ChangeKind) {
    let merged = match (map.get(&id).copied(), kind) {
        (None, k) => Some(k),
        (Some(ChangeKind::Added), ChangeKind::Added | ChangeKind::Changed) => {
            Some(ChangeKind::Added)
        }
        (Some(ChangeKind::Added), ChangeKind::Removed { .. }) => None,
        (Some(ChangeKind::Changed), ChangeKind::Added | ChangeKind::Changed) => {
            Some(ChangeKind::Changed)
        }
        (Some(ChangeKind::Changed), k @ ChangeKind::Removed { .. }) => Some(k),
        // Vector ids are not recycled, so a Removed entry cannot be followed
        // by more activity on the same id; keep the removal if it happens.
        (
            Some(k @ ChangeKind::Removed { .. }),
            ChangeKind::Added | ChangeKind::Changed | ChangeKind::Removed { .. },
        ) => Some(k),
    };
    match merged {
        Some(k) => {
            map.insert(id, k);
        }
        None => {
            map.shift_remove(&id);
        }
    }
}

/// One batch-level change to a component key of a `VectorSet`: the key went
/// from absent-in-any-vector to present, or the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentChange {
    /// The component gained its first nonzero entry.
    Added,
    /// The component lost its last nonzero entry.
    Removed,
}

/// Batch component diff for one vector set.
pub type ComponentChangeMap = IndexMap<EdgeId, ComponentChange>;

/// Records a component transition, cancelling an opposite pending record.
///
/// `Added` then `Removed` (or vice versa) within one batch nets out to no
/// visible change, so the entry is dropped.
pub fn record_component_change(map: &mut ComponentChangeMap, key: EdgeId, kind: ComponentChange) {
    match (map.get(&key).copied(), kind) {
        (None, k) => {
            map.insert(key, k);
        }
        (Some(ComponentChange::Added), ComponentChange::Removed)
        | (Some(ComponentChange::Removed), ComponentChange::Added) => {
            map.shift_remove(&key);
        }
        (Some(ComponentChange::Added), ComponentChange::Added)
        | (Some(ComponentChange::Removed), ComponentChange::Removed) => {}
    }
}
