//! Regression mapping: ridge predictability of each probe from each layer.

pub mod alpha;
pub mod grid;
pub mod predictor;
