//! End-to-end scenarios exercising the engine components together.

#![allow(clippy::expect_used)]

use std::cell::RefCell;
use std::rc::Rc;

use relpos_core::{
    ChangeKind, CombinationVectors, Cycles, EdgeId, ForestListener, InnerProducts, Side, VectorSet,
};

fn edge(c: &Cycles, a: &str, b: &str) -> EdgeId {
    c.edges().edge_id(a, b).expect("edge must be interned")
}

/// Scenario 1: a square of normal edges. The first three span the forest;
/// the fourth closes a length-4 cycle with signs following the canonical
/// directions, and the change stream reports exactly one addition.
#[test]
fn square_cycle() {
    let mut c = Cycles::new();
    c.add_edge("A", "B", true, false);
    c.add_edge("B", "C", true, false);
    c.add_edge("C", "D", true, false);
    for (a, b) in [("A", "B"), ("B", "C"), ("C", "D")] {
        assert!(c.in_forest(a, b), "({a}, {b}) should be a forest edge");
    }
    assert!(c.cycles().is_empty());
    assert!(c.changes().is_empty());

    c.add_edge("D", "A", true, false);
    assert_eq!(c.cycles().size(), 1);
    let cycle = c.cycles().vector_ids().next().expect("one cycle");
    assert_eq!(c.changes().len(), 1);
    assert_eq!(c.changes().get(&cycle), Some(&ChangeKind::Added));

    // The loop A→B→C→D→A follows every canonical direction, so all four
    // components carry +1.
    assert_eq!(c.cycles().value(cycle, edge(&c, "D", "A")), 1.0);
    for (a, b) in [("A", "B"), ("B", "C"), ("C", "D")] {
        assert_eq!(c.cycles().value(cycle, edge(&c, a, b)), 1.0);
    }
    assert_eq!(c.cycle_non_forest_edge(cycle), Some(edge(&c, "D", "A")));
}

/// Scenario 2: a normal edge arrives over a path containing a watched edge.
/// The watched edge leaves the forest, no cycle vector is registered, and
/// the watched edge's path vector spans the three normal edges.
#[test]
fn watched_pivot_replacement() {
    let mut c = Cycles::new();
    c.add_edge("A", "B", true, false);
    c.add_edge("B", "C", false, true);
    c.add_edge("C", "D", true, false);
    assert!(c.in_forest("B", "C"));

    c.add_edge("A", "D", true, false);
    assert!(c.in_forest("A", "D"), "the normal edge takes the slot");
    assert!(!c.in_forest("B", "C"), "the watched edge is displaced");
    assert!(c.cycles().is_empty(), "no cycle vectors expected");
    assert_eq!(c.watched_cycles().size(), 1);

    let path_vec = c
        .watched_cycles()
        .vector_ids()
        .next()
        .expect("one watched path");
    assert_eq!(c.watched_cycle_edge(path_vec), Some(edge(&c, "B", "C")));
    let w = c.watched_cycles();
    assert_eq!(w.value(path_vec, edge(&c, "A", "B")), -1.0);
    assert_eq!(w.value(path_vec, edge(&c, "A", "D")), 1.0);
    assert_eq!(w.value(path_vec, edge(&c, "C", "D")), -1.0);
    assert_eq!(w.value(path_vec, edge(&c, "B", "C")), 0.0);
}

/// Scenario 3: single-pivot elimination over two combinations.
#[test]
fn elimination() {
    let mut cv = CombinationVectors::new(1e-12, 0.0);
    let k1 = EdgeId(1);
    let k2 = EdgeId(2);
    let b1 = cv.new_base_vector([(k1, 1.0), (k2, 1.0)]);
    let b2 = cv.new_base_vector([(k1, 1.0), (k2, -1.0)]);
    let c1 = cv.new_comb_vector(b1, 1.0).expect("base exists");
    let c2 = cv.new_comb_vector(b2, 1.0).expect("base exists");

    assert!(cv.eliminate(k1, c1));
    assert_eq!(cv.coefficient(c2, b1), -1.0);
    assert_eq!(cv.coefficient(c2, b2), 1.0);
    assert_eq!(
        cv.combination_set().value(c2, k1),
        0.0,
        "the eliminated component must be exactly zero"
    );
    assert_eq!(cv.combination_set().value(c2, k2), -2.0);
}

/// Scenario 4: an inner product appears, then snaps to absent when the
/// vector's component cancels.
#[test]
fn inner_products() {
    let key = EdgeId(3);
    let mut vectors = VectorSet::unrounded();
    let mut duals = VectorSet::unrounded();
    let v = vectors.new_vector([(key, 2.0)]);
    let d = duals.new_vector([(key, 3.0)]);

    let mut cache = InnerProducts::new(1e-10);
    cache.calc_inner_products(Side::Vectors, v, &vectors, &duals);
    assert_eq!(cache.product(d, v), 6.0);

    vectors.add_value(v, key, -2.0);
    cache.add_to_products(Side::Vectors, v, key, -2.0, &duals);
    assert_eq!(cache.product(d, v), 0.0);
    assert!(cache.is_empty(), "zero products must not be materialized");
}

/// Scenario 5: float absorption leaves a stale residue in a combination
/// after its base component is gone; repair scrubs it.
#[test]
fn repair_scrubs_drift() {
    let key = EdgeId(9);
    let mut cv = CombinationVectors::new(0.0, 0.0);
    let b1 = cv.new_base_vector([(key, 1.0)]);
    let b2 = cv.new_base_vector([(key, 1e-16)]);
    let c = cv.new_comb_vector(b1, 1.0).expect("base exists");
    // 1.0 + 1e-16 is absorbed to 1.0, so b2's contribution is lost here…
    cv.add_base_to_comb(c, b2, 1.0);
    assert_eq!(cv.combination_set().value(c, key), 1.0);

    // Drain the construction-time component diff.
    cv.repair_combinations();

    // …and resurfaces as −1e-16 once both base components are withdrawn.
    cv.base_set_value(b1, key, 0.0);
    cv.base_set_value(b2, key, 0.0);
    assert!(
        cv.combination_set().value(c, key) != 0.0,
        "drift residue expected before repair"
    );
    assert_eq!(cv.base_set().value(b1, key), 0.0);

    cv.repair_combinations();
    assert_eq!(cv.combination_set().value(c, key), 0.0);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Split {
        root: String,
        up: String,
        down: String,
    },
    NodeRemoved(String),
}

struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl ForestListener for Recorder {
    fn tree_split(&mut self, original_root: &str, up: &str, down: &str) {
        self.events.borrow_mut().push(Event::Split {
            root: original_root.to_owned(),
            up: up.to_owned(),
            down: down.to_owned(),
        });
    }

    fn node_removed(&mut self, label: &str) {
        self.events
            .borrow_mut()
            .push(Event::NodeRemoved(label.to_owned()));
    }
}

/// Scenario 6: removing the only connection in a chain splits the tree and
/// notifies the listener with `up` on the original root's side.
#[test]
fn split_notification() {
    let mut c = Cycles::new();
    let events = Rc::new(RefCell::new(Vec::new()));
    c.set_forest_listener(Box::new(Recorder {
        events: Rc::clone(&events),
    }));
    c.add_edge("A", "B", true, false);
    c.add_edge("B", "C", true, false);
    events.borrow_mut().clear();

    let split = c.remove_edge("A", "B", true, false);
    assert_eq!(split.as_deref(), Some("B"));
    let recorded = events.borrow();
    assert_eq!(
        recorded.first(),
        Some(&Event::Split {
            root: "A".to_owned(),
            up: "A".to_owned(),
            down: "B".to_owned(),
        })
    );
    assert!(recorded.contains(&Event::NodeRemoved("A".to_owned())));
}

/// Add/remove round-trip: the engine returns to its prior shape modulo
/// edge-id reuse.
#[test]
fn add_remove_is_a_round_trip() {
    let mut c = Cycles::new();
    c.add_edge("A", "B", true, false);
    c.add_edge("B", "C", true, false);
    let forest_nodes = c.forest().node_count();

    c.add_edge("A", "C", true, false);
    c.remove_edge("A", "C", true, false);

    assert!(!c.edge_exists("A", "C"));
    assert_eq!(c.cycles().size(), 0);
    assert_eq!(c.watched_cycles().size(), 0);
    assert_eq!(c.forest().node_count(), forest_nodes);
    assert!(c.in_forest("A", "B") && c.in_forest("B", "C"));
}
