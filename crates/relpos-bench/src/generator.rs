//! Random edge-churn generator.
//!
//! Produces deterministic sequences of add/remove edge operations over a
//! fixed label universe, so benchmarks exercise the basis-maintenance paths
//! (cycle registration, pivot replacement, elimination) with reproducible
//! input.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use relpos_core::Cycles;

/// Configuration for the churn generator.
#[derive(Debug, Clone, Copy)]
pub struct ChurnConfig {
    /// Seed for the random number generator (deterministic).
    pub seed: u64,
    /// Number of point labels in the universe.
    pub labels: usize,
    /// Number of operations to generate.
    pub ops: usize,
    /// Fraction of operations that are removals (0.0–1.0).
    pub removal_ratio: f64,
    /// Fraction of added edges that are watched rather than normal.
    pub watched_ratio: f64,
}

impl ChurnConfig {
    /// A dense mid-size scenario used by the default benchmarks.
    pub fn medium(seed: u64) -> Self {
        Self {
            seed,
            labels: 64,
            ops: 2_000,
            removal_ratio: 0.35,
            watched_ratio: 0.25,
        }
    }
}

/// One generated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChurnOp {
    /// `add_edge(a, b, is_normal, is_watched)`.
    Add {
        /// First label index.
        a: usize,
        /// Second label index.
        b: usize,
        /// Add as a watched edge instead of a normal one.
        watched: bool,
    },
    /// `remove_edge(a, b, remove_normal, remove_watched)` with both flags.
    Remove {
        /// First label index.
        a: usize,
        /// Second label index.
        b: usize,
    },
}

/// A reproducible operation sequence plus its label universe.
#[derive(Debug, Clone)]
pub struct ChurnScenario {
    /// Point labels referenced by the operations.
    pub labels: Vec<String>,
    /// Operations in execution order.
    pub ops: Vec<ChurnOp>,
}

/// Generates a deterministic churn scenario from `config`.
pub fn generate_churn(config: &ChurnConfig) -> ChurnScenario {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let labels: Vec<String> = (0..config.labels.max(2)).map(|i| format!("p{i}")).collect();
    let mut ops = Vec::with_capacity(config.ops);
    for _ in 0..config.ops {
        let a = rng.gen_range(0..labels.len());
        let mut b = rng.gen_range(0..labels.len());
        if b == a {
            b = (b + 1) % labels.len();
        }
        if rng.r#gen::<f64>() < config.removal_ratio {
            ops.push(ChurnOp::Remove { a, b });
        } else {
            ops.push(ChurnOp::Add {
                a,
                b,
                watched: rng.r#gen::<f64>() < config.watched_ratio,
            });
        }
    }
    ChurnScenario { labels, ops }
}

/// Runs a scenario against an engine.
pub fn apply_churn(engine: &mut Cycles, scenario: &ChurnScenario) {
    for op in &scenario.ops {
        match *op {
            ChurnOp::Add { a, b, watched } => {
                engine.add_edge(&scenario.labels[a], &scenario.labels[b], !watched, watched);
            }
            ChurnOp::Remove { a, b } => {
                engine.remove_edge(&scenario.labels[a], &scenario.labels[b], true, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    /// The same seed generates the same scenario.
    #[test]
    fn generation_is_deterministic() {
        let config = ChurnConfig::medium(7);
        let first = generate_churn(&config);
        let second = generate_churn(&config);
        assert_eq!(first.ops, second.ops);
        assert_eq!(first.labels, second.labels);
    }

    /// Generated operations never reference a self-loop.
    #[test]
    fn no_self_loops_generated() {
        let scenario = generate_churn(&ChurnConfig::medium(11));
        for op in &scenario.ops {
            match *op {
                ChurnOp::Add { a, b, .. } | ChurnOp::Remove { a, b } => {
                    assert_ne!(a, b, "self-loop in generated ops");
                }
            }
        }
    }

    /// Applying a scenario leaves the engine with a consistent basis size:
    /// cycles + watched paths = edges − nodes + trees.
    #[test]
    fn applied_scenario_keeps_rank_consistent() {
        let mut engine = Cycles::new();
        let scenario = generate_churn(&ChurnConfig {
            seed: 3,
            labels: 16,
            ops: 300,
            removal_ratio: 0.4,
            watched_ratio: 0.3,
        });
        apply_churn(&mut engine, &scenario);

        let edge_count = engine.edge_ids().count();
        let forest_edges = engine
            .edge_ids()
            .filter(|&id| engine.in_forest_id(id))
            .count();
        let nodes = engine.forest().node_count();
        let trees = nodes - forest_edges;
        assert_eq!(
            engine.cycles().size() + engine.watched_cycles().size(),
            edge_count - forest_edges,
            "every non-forest edge owns exactly one basis vector"
        );
        assert_eq!(
            edge_count - nodes + trees,
            engine.cycles().size() + engine.watched_cycles().size(),
            "basis size equals the cycle-space rank"
        );
    }
}
