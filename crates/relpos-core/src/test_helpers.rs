//! Shared test helpers for constructing engines and checking invariants.
//!
//! This module is compiled only in test builds. Integration tests in
//! `crates/relpos-core/tests/` define their own local helpers because they
//! link against the non-test library build where this module is not
//! available.
#![allow(clippy::expect_used)]

use indexmap::IndexSet;

use crate::cycles::Cycles;
use crate::ids::EdgeId;

/// Adds a chain of normal edges along consecutive labels.
pub fn chain(engine: &mut Cycles, labels: &[&str]) {
    for window in labels.windows(2) {
        engine.add_edge(window[0], window[1], true, false);
    }
}

/// Asserts the engine-wide structural invariants:
///
/// - endpoints of every live edge share a tree,
/// - the forest's node set is exactly the labels of `in_forest` edges,
/// - every cycle vector has exactly one non-forest component, that component
///   is normal, and all others are forest edges,
/// - every watched-path vector omits its own edge, touches only forest
///   edges, and equals the signed forest path between the watched edge's
///   canonical endpoints.
pub fn assert_engine_invariants(engine: &Cycles) {
    let edge_ids: Vec<EdgeId> = engine.edge_ids().collect();

    for &id in &edge_ids {
        let (from, to) = engine.get_edge_points(id).expect("live edge has endpoints");
        assert!(
            engine.forest().same_tree(from, to),
            "endpoints of {id} are in different trees"
        );
    }

    let mut forest_labels: IndexSet<String> = IndexSet::new();
    for &id in &edge_ids {
        if engine.in_forest_id(id) {
            let (from, to) = engine.get_edge_points(id).expect("live edge has endpoints");
            forest_labels.insert(from.to_owned());
            forest_labels.insert(to.to_owned());
        }
    }
    assert_eq!(
        forest_labels.len(),
        engine.forest().node_count(),
        "forest node set must equal the labels of in-forest edges"
    );
    for label in &forest_labels {
        assert!(engine.forest().contains(label), "missing forest node {label}");
    }

    for (cycle, vector) in engine.cycles().iter() {
        let mut non_forest = 0usize;
        for (edge, value) in vector.iter() {
            assert!(value != 0.0, "cycle {cycle} stores a zero at {edge}");
            if engine.in_forest_id(edge) {
                continue;
            }
            non_forest += 1;
            assert!(
                engine.is_normal_id(edge),
                "non-forest component {edge} of cycle {cycle} must be normal"
            );
            assert_eq!(
                engine.cycle_non_forest_edge(cycle),
                Some(edge),
                "cycle {cycle} bound to the wrong non-forest edge"
            );
        }
        assert_eq!(
            non_forest, 1,
            "cycle {cycle} must have exactly one non-forest component"
        );
    }

    for (path_vec, vector) in engine.watched_cycles().iter() {
        let watched = engine
            .watched_cycle_edge(path_vec)
            .expect("watched path bound to an edge");
        assert_eq!(
            vector.value(watched),
            0.0,
            "watched edge {watched} must not be a component of its own path"
        );
        for (component, _) in vector.iter() {
            assert!(
                engine.in_forest_id(component),
                "watched path {path_vec} touches non-forest edge {component}"
            );
        }

        // The vector must equal the signed forest path between the watched
        // edge's canonical endpoints.
        let (from, to) = engine
            .get_edge_points(watched)
            .expect("watched edge has endpoints");
        let labels = engine
            .forest()
            .path(from, to)
            .expect("watched endpoints share a tree");
        let mut expected: Vec<(EdgeId, f64)> = Vec::new();
        for pair in labels.windows(2) {
            let id = engine
                .edges()
                .edge_id(&pair[0], &pair[1])
                .expect("path step is an interned edge");
            let (canonical_from, _) = engine.get_edge_points(id).expect("live edge");
            let sign = if canonical_from == pair[0] { 1.0 } else { -1.0 };
            expected.push((id, sign));
        }
        let mut actual: Vec<(EdgeId, f64)> = vector.iter().collect();
        actual.sort_by_key(|&(id, _)| id);
        expected.sort_by_key(|&(id, _)| id);
        assert_eq!(
            actual, expected,
            "watched path {path_vec} does not describe the forest path of {watched}"
        );
    }
}
