// Meter readings engine: normalization, derived and computed series,
// rollup orchestration and leak detection
pub mod application;
pub mod domain;
pub mod infrastructure;
