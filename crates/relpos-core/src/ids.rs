//! Integer id newtypes shared across the engine.
//!
//! Edge ids are allocated by [`crate::edge_table::EdgeTable`] and recycled
//! through its free list once every reference to an edge is gone; vector ids
//! are allocated per [`crate::vector_set::VectorSet`] and never recycled, so a
//! change record for a removed vector can never be confused with a record for
//! a later one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of an interned undirected edge.
///
/// The id doubles as the component key of every sparse vector in the engine:
/// cycle vectors, watched-path vectors, and equation rows are all maps from
/// `EdgeId` to a signed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl EdgeId {
    /// Returns the raw index for slab addressing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl From<u32> for EdgeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Stable identifier of a sparse vector within one
/// [`crate::vector_set::VectorSet`].
///
/// Ids are meaningful only relative to the set that allocated them; the
/// engine never mixes ids across sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(pub u32);

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for VectorId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Identifier of an or-group of alternative offset constraints.
pub type GroupId = u32;
