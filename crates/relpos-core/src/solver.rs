//! Driver tying the structural and numerical engines together.
//!
//! `PositionSolver` ingests offset constraints (normal edges) and unknowns
//! (watched edges) into the [`Cycles`] manager, mirrors every live cycle as
//! one equation row inside a [`CombinationVectors`] store, and solves by
//! pivot-steered Gaussian elimination:
//!
//! 1. cycle changes are drained into the equation store,
//! 2. columns with no active constraint are eliminated, pivots chosen by
//!    bucket size, then by inner-product overlap with the watched-path set,
//!    then by coefficient magnitude, then by id,
//! 3. rows whose components are all known are checked against the residual
//!    tolerance; violated rows produce [`Conflict`] records and may
//!    deactivate the weakest constraint of an or-group,
//! 4. pivot rows with a single unknown are back-substituted, watched-path
//!    vectors are evaluated, and the offsets are published.
//!
//! Offsets that cannot be determined are simply absent from the result.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::changes::ChangeKind;
use crate::combination::CombinationVectors;
use crate::cycles::Cycles;
use crate::ids::{EdgeId, GroupId, VectorId};
use crate::inner_products::{InnerProducts, Side};

/// Tuning knobs for the solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Relative threshold below which arithmetic residue snaps to zero.
    pub zero_rounding: f64,
    /// Coefficient magnitude (or reciprocal) that queues a row for
    /// renormalization.
    pub normalization_threshold: f64,
    /// Largest cycle residual still considered consistent.
    pub residual_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            zero_rounding: 1e-10,
            normalization_threshold: 1e6,
            residual_tolerance: 1e-6,
        }
    }
}

/// A known pair offset attached to a normal edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetConstraint {
    /// Offset from the edge's canonical start to its canonical end.
    pub offset: f64,
    /// How hard the constraint resists being named the victim of a conflict;
    /// higher survives longer.
    pub resistance: f64,
    /// Membership in a group of alternatives, of which at least one must
    /// stay active.
    pub or_group: Option<GroupId>,
}

impl OffsetConstraint {
    /// A constraint that never volunteers as a conflict victim.
    pub fn rigid(offset: f64) -> Self {
        Self {
            offset,
            resistance: f64::MAX,
            or_group: None,
        }
    }

    /// A constraint with the given resistance and no or-group.
    pub fn with_resistance(offset: f64, resistance: f64) -> Self {
        Self {
            offset,
            resistance,
            or_group: None,
        }
    }

    /// A constraint belonging to or-group `group`.
    pub fn in_group(offset: f64, resistance: f64, group: GroupId) -> Self {
        Self {
            offset,
            resistance,
            or_group: Some(group),
        }
    }
}

/// One violated equation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Edges participating in the violated row.
    pub edges: Vec<EdgeId>,
    /// The row's residual under the active constraints.
    pub residual: f64,
    /// The constraint chosen to give way, when any qualifies.
    pub victim: Option<EdgeId>,
}

/// Published outcome of one [`PositionSolver::solve`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    /// Determined offsets: watched edges plus back-substituted unknowns.
    pub offsets: IndexMap<EdgeId, f64>,
    /// Violated rows found under the constraints active at entry.
    pub conflicts: Vec<Conflict>,
    /// Constraints deactivated this call through or-group resolution.
    pub dropped: Vec<EdgeId>,
}

#[derive(Debug, Default)]
struct Reduction {
    solved: IndexMap<EdgeId, f64>,
    conflicts: Vec<Conflict>,
}

/// Orchestrates edge ingestion, equation assembly, elimination and result
/// publication.
#[derive(Debug)]
pub struct PositionSolver {
    cycles: Cycles,
    equations: CombinationVectors,
    products: InnerProducts,
    constraints: IndexMap<EdgeId, OffsetConstraint>,
    /// Constraints deactivated by or-group resolution.
    inactive: IndexSet<EdgeId>,
    /// `cycle vector → equation base vector` and companions.
    cycle_base: IndexMap<VectorId, VectorId>,
    base_comb: IndexMap<VectorId, VectorId>,
    options: SolverOptions,
    /// Offsets published by the most recent solve, for position walks.
    last_offsets: IndexMap<EdgeId, f64>,
}

impl Default for PositionSolver {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl PositionSolver {
    /// Creates a solver with the given options.
    pub fn new(options: SolverOptions) -> Self {
        Self {
            cycles: Cycles::new(),
            equations: CombinationVectors::new(
                options.zero_rounding,
                options.normalization_threshold,
            ),
            products: InnerProducts::new(options.zero_rounding),
            constraints: IndexMap::new(),
            inactive: IndexSet::new(),
            cycle_base: IndexMap::new(),
            base_comb: IndexMap::new(),
            options,
            last_offsets: IndexMap::new(),
        }
    }

    /// The structural engine.
    pub fn cycles(&self) -> &Cycles {
        &self.cycles
    }

    /// The equation store.
    pub fn equations(&self) -> &CombinationVectors {
        &self.equations
    }

    /// The solver's options.
    pub fn options(&self) -> SolverOptions {
        self.options
    }

    // -- ingestion ----------------------------------------------------------

    /// Ingests a normal edge carrying a known offset.
    ///
    /// Re-adding an edge replaces its constraint and reactivates it.
    pub fn add_offset(&mut self, a: &str, b: &str, constraint: OffsetConstraint) -> Option<EdgeId> {
        let id = self.cycles.add_edge(a, b, true, false)?;
        self.constraints.insert(id, constraint);
        self.inactive.shift_remove(&id);
        Some(id)
    }

    /// Ingests a watched edge whose offset is to be solved.
    pub fn add_unknown(&mut self, a: &str, b: &str) -> Option<EdgeId> {
        self.cycles.add_edge(a, b, false, true)
    }

    /// Removes a normal edge and its constraint.
    pub fn remove_offset(&mut self, a: &str, b: &str) -> Option<String> {
        if let Some(id) = self.cycles.edges().edge_id(a, b) {
            self.constraints.shift_remove(&id);
            self.inactive.shift_remove(&id);
        }
        self.cycles.remove_edge(a, b, true, false)
    }

    /// Removes a watched edge.
    pub fn remove_unknown(&mut self, a: &str, b: &str) -> Option<String> {
        self.cycles.remove_edge(a, b, false, true)
    }

    // -- solving ------------------------------------------------------------

    /// Assembles, eliminates, checks residuals and publishes offsets.
    pub fn solve(&mut self) -> SolveResult {
        self.sync_equations();
        self.refresh_products();

        let first = self.reduce();
        let dropped = self.apply_drops(&first.conflicts);
        let solved = if dropped.is_empty() {
            first.solved
        } else {
            log::debug!("re-reducing after dropping {} constraint(s)", dropped.len());
            self.reduce().solved
        };

        let mut offsets = solved.clone();
        for path_vec in self.cycles.watched_cycles().vector_ids().collect::<Vec<_>>() {
            let Some(edge) = self.cycles.watched_cycle_edge(path_vec) else {
                continue;
            };
            if let Some(value) = self.evaluate_row_with(path_vec, &solved) {
                offsets.insert(edge, value);
            }
        }

        self.last_offsets = offsets.clone();
        SolveResult {
            offsets,
            conflicts: first.conflicts,
            dropped,
        }
    }

    /// Runs repair and renormalization; intended between update batches.
    pub fn maintain(&mut self) {
        self.equations.repair_combinations();
        for comb in self.equations.clear_normalization_candidates() {
            let k = self.equations.calc_normalization_constant(comb);
            self.equations.normalize(comb, k, true);
        }
    }

    /// Walks the forest tree containing `anchor`, assigning positions from
    /// the constraints and the offsets of the most recent solve. `anchor`
    /// sits at `0.0`; labels whose connecting offset is unknown are absent.
    pub fn positions(&self, anchor: &str) -> IndexMap<String, f64> {
        let mut out: IndexMap<String, f64> = IndexMap::new();
        if !self.cycles.forest().contains(anchor) {
            return out;
        }
        out.insert(anchor.to_owned(), 0.0);
        let mut queue: Vec<String> = vec![anchor.to_owned()];
        while let Some(label) = queue.pop() {
            let position = out.get(&label).copied().unwrap_or(0.0);
            let incident: Vec<EdgeId> = self.cycles.edges().neighbors(&label).collect();
            for edge in incident {
                if !self.cycles.in_forest_id(edge) {
                    continue;
                }
                let Some(other) = self.cycles.edge_other_end(edge, &label) else {
                    continue;
                };
                if out.contains_key(other) {
                    continue;
                }
                let Some(offset) = self.offset_for_position(edge) else {
                    continue;
                };
                let Some((from, _)) = self.cycles.get_edge_points(edge) else {
                    continue;
                };
                let other_position = if from == label {
                    position + offset
                } else {
                    position - offset
                };
                let other = other.to_owned();
                out.insert(other.clone(), other_position);
                queue.push(other);
            }
        }
        out
    }

    // -- assembly -----------------------------------------------------------

    /// Mirrors pending cycle changes into the equation store and scrubs
    /// products of removed vectors.
    fn sync_equations(&mut self) {
        for (cycle, change) in self.cycles.clear_changes() {
            match change {
                ChangeKind::Added => {
                    let entries = self.cycles.cycles().entries(cycle);
                    let base = self.equations.new_base_vector(entries);
                    if let Some(comb) = self.equations.new_comb_vector(base, 1.0) {
                        self.cycle_base.insert(cycle, base);
                        self.base_comb.insert(base, comb);
                    }
                }
                ChangeKind::Changed => {
                    if let Some(&base) = self.cycle_base.get(&cycle) {
                        let entries = self.cycles.cycles().entries(cycle);
                        self.equations.set_base_vector(base, &entries);
                    }
                }
                ChangeKind::Removed { .. } => {
                    if let Some(base) = self.cycle_base.shift_remove(&cycle) {
                        if let Some(comb) = self.base_comb.shift_remove(&base) {
                            self.products.remove_vector(Side::Duals, comb);
                            self.equations.remove_comb_vector(comb);
                        }
                        self.equations.remove_base_vector(base);
                    }
                }
            }
        }
        for (path_vec, change) in self.cycles.clear_watched_changes() {
            if let ChangeKind::Removed { .. } = change {
                self.products.remove_vector(Side::Vectors, path_vec);
            }
        }
    }

    /// Recomputes the product rows of every live watched-path vector against
    /// the current equation rows.
    fn refresh_products(&mut self) {
        let Self {
            products,
            cycles,
            equations,
            ..
        } = self;
        let watched = cycles.watched_cycles();
        let duals = equations.combination_set();
        for path_vec in watched.vector_ids().collect::<Vec<_>>() {
            products.calc_inner_products(Side::Vectors, path_vec, watched, duals);
        }
    }

    // -- reduction ----------------------------------------------------------

    fn is_active(&self, edge: EdgeId) -> bool {
        self.constraints.contains_key(&edge) && !self.inactive.contains(&edge)
    }

    fn active_offset(&self, edge: EdgeId) -> Option<f64> {
        if self.is_active(edge) {
            self.constraints.get(&edge).map(|c| c.offset)
        } else {
            None
        }
    }

    /// Eliminates unknown columns, back-substitutes pivot rows and collects
    /// residual conflicts. Applies no drops.
    fn reduce(&mut self) -> Reduction {
        let mut used: IndexSet<VectorId> = IndexSet::new();
        let mut pivots: Vec<(EdgeId, VectorId)> = Vec::new();

        while let Some((column, row)) = self.pick_pivot(&used) {
            self.equations.eliminate(column, row);
            used.insert(row);
            pivots.push((column, row));
        }

        let mut reduction = Reduction::default();

        // Back-substitution: after full elimination each pivot column lives
        // only in its own row, so the rows are independent.
        for &(column, row) in &pivots {
            let mut known = 0.0;
            let mut pivot_coeff = 0.0;
            let mut blocked = false;
            for (key, value) in self.equations.combination_set().entries(row) {
                if key == column {
                    pivot_coeff = value;
                } else if let Some(offset) = self.active_offset(key) {
                    known += value * offset;
                } else {
                    blocked = true;
                    break;
                }
            }
            if !blocked && pivot_coeff != 0.0 {
                reduction.solved.insert(column, -known / pivot_coeff);
            }
        }

        // Residuals of the remaining fully-known rows.
        for row in self
            .equations
            .combination_set()
            .vector_ids()
            .collect::<Vec<_>>()
        {
            if used.contains(&row) {
                continue;
            }
            let entries = self.equations.combination_set().entries(row);
            if entries.is_empty() {
                continue;
            }
            let mut residual = 0.0;
            let mut blocked = false;
            for &(key, value) in &entries {
                match self.active_offset(key) {
                    Some(offset) => residual += value * offset,
                    None => {
                        blocked = true;
                        break;
                    }
                }
            }
            if blocked || residual.abs() <= self.options.residual_tolerance {
                continue;
            }
            let edges: Vec<EdgeId> = entries.iter().map(|&(key, _)| key).collect();
            let victim = self.pick_victim(&edges);
            log::debug!("row {row} violated: residual {residual}, victim {victim:?}");
            reduction.conflicts.push(Conflict {
                edges,
                residual,
                victim,
            });
        }

        reduction
    }

    /// Chooses the next pivot: an unknown column and a row with a nonzero
    /// coefficient there. Preference: fewer rows through the column, then
    /// smaller inner-product overlap between the row and the watched paths,
    /// then coefficient magnitude closest to one, then lowest ids.
    fn pick_pivot(&self, used: &IndexSet<VectorId>) -> Option<(EdgeId, VectorId)> {
        let mut best: Option<(usize, usize, f64, EdgeId, VectorId)> = None;
        let duals = self.equations.combination_set();
        for column in duals.components().collect::<Vec<_>>() {
            if self.is_active(column) {
                continue;
            }
            let bucket = duals.component_count(column);
            for (row, coeff) in duals.component_vectors(column) {
                if used.contains(&row) {
                    continue;
                }
                let overlap = self
                    .cycles
                    .watched_cycles()
                    .vector_ids()
                    .filter(|&w| self.products.product(row, w) != 0.0)
                    .count();
                let magnitude = coeff.abs().max(coeff.abs().recip());
                let candidate = (bucket, overlap, magnitude, column, row);
                let better = match &best {
                    None => true,
                    Some(current) => match (candidate.0, candidate.1).cmp(&(current.0, current.1)) {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => {
                            match candidate
                                .2
                                .partial_cmp(&current.2)
                                .unwrap_or(std::cmp::Ordering::Equal)
                            {
                                std::cmp::Ordering::Less => true,
                                std::cmp::Ordering::Greater => false,
                                std::cmp::Ordering::Equal => {
                                    (candidate.3, candidate.4) < (current.3, current.4)
                                }
                            }
                        }
                    },
                };
                if better {
                    best = Some(candidate);
                }
            }
        }
        best.map(|(_, _, _, column, row)| (column, row))
    }

    /// Deactivates the droppable victims among `conflicts`; returns the
    /// dropped edges.
    fn apply_drops(&mut self, conflicts: &[Conflict]) -> Vec<EdgeId> {
        let mut dropped = Vec::new();
        for conflict in conflicts {
            let Some(victim) = conflict.victim else {
                continue;
            };
            if self.is_droppable(victim) && !self.inactive.contains(&victim) {
                log::debug!("deactivating or-group constraint on {victim}");
                self.inactive.insert(victim);
                dropped.push(victim);
            }
        }
        dropped
    }

    /// A constraint is droppable when another member of its or-group is
    /// still active.
    fn is_droppable(&self, edge: EdgeId) -> bool {
        let Some(group) = self.constraints.get(&edge).and_then(|c| c.or_group) else {
            return false;
        };
        self.constraints.iter().any(|(&other, c)| {
            other != edge && c.or_group == Some(group) && !self.inactive.contains(&other)
        })
    }

    /// The conflict victim: droppable constraints first, then the lowest
    /// resistance, then the lowest edge id.
    fn pick_victim(&self, edges: &[EdgeId]) -> Option<EdgeId> {
        edges
            .iter()
            .copied()
            .filter(|&edge| self.is_active(edge))
            .min_by(|&a, &b| {
                let droppable = |e: EdgeId| if self.is_droppable(e) { 0u8 } else { 1 };
                let resistance = |e: EdgeId| {
                    self.constraints
                        .get(&e)
                        .map_or(f64::MAX, |c| c.resistance)
                };
                droppable(a)
                    .cmp(&droppable(b))
                    .then_with(|| {
                        resistance(a)
                            .partial_cmp(&resistance(b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.cmp(&b))
            })
    }

    /// Evaluates a watched-path vector against active constraints plus the
    /// freshly solved offsets; `None` when any component is undetermined.
    fn evaluate_row_with(&self, path_vec: VectorId, solved: &IndexMap<EdgeId, f64>) -> Option<f64> {
        let entries = self.cycles.watched_cycles().entries(path_vec);
        let mut total = 0.0;
        for (key, value) in entries {
            let offset = self
                .active_offset(key)
                .or_else(|| solved.get(&key).copied())?;
            total += value * offset;
        }
        Some(total)
    }

    fn offset_for_position(&self, edge: EdgeId) -> Option<f64> {
        self.active_offset(edge)
            .or_else(|| self.last_offsets.get(&edge).copied())
    }
}
