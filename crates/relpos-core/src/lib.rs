#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod changes;
pub mod combination;
pub mod cycles;
pub mod edge_table;
pub mod forest;
pub mod ids;
pub mod inner_products;
pub mod rounding;
pub mod solver;
pub mod vector_set;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use changes::{ChangeKind, ChangeMap, ComponentChange, ComponentChangeMap};
pub use combination::CombinationVectors;
pub use cycles::Cycles;
pub use edge_table::EdgeTable;
pub use forest::{Forest, ForestListener};
pub use ids::{EdgeId, GroupId, VectorId};
pub use inner_products::{InnerProducts, Side};
pub use rounding::Rounding;
pub use solver::{Conflict, OffsetConstraint, PositionSolver, SolveResult, SolverOptions};
pub use vector_set::{SparseVector, VectorSet};

/// Returns the current version of the relpos-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn version_is_semver() {
        let v = version();
        let parts: Vec<&str> = v.split('.').collect();
        assert_eq!(parts.len(), 3, "version should have 3 parts: {v}");
        for part in parts {
            part.parse::<u32>().expect("each part should be a number");
        }
    }
}
