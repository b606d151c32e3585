//! Format normalization and selection

pub mod normalizer;
pub mod selection;

pub use normalizer::{normalize, to_descriptors};
pub use selection::pick_best_merged_under;
