//! Benchmark support for the relpos engine.

pub mod generator;

pub use generator::{ChurnConfig, ChurnOp, ChurnScenario, apply_churn, generate_churn};
