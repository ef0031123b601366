//! Range placement: derive a lower/upper taxon interval for each query
//! segment from its candidate local alignments.

pub mod args;
pub mod band_factor;
pub mod engine;
pub mod predictor;

pub use args::PredictArgs;
pub use engine::run;
pub use predictor::{RpaConfig, RpaPredictor};
