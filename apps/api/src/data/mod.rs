// Training data: loading, preprocessing into matrices, splitting, batching and
// z-score normalization.

pub mod loader;
pub mod preprocess;
pub mod stats;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("row {row} has {found} input features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid split ratios: {0}")]
    InvalidSplitRatios(String),

    #[error("could not shape encoded rows into a matrix: {0}")]
    Shape(String),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("normalization stats cover {stats} columns but data has {data}")]
    StatsWidthMismatch { stats: usize, data: usize },

    #[error("normalization stats are ragged (min {min}, max {max}, mean {mean}, std {std})")]
    RaggedStats {
        min: usize,
        max: usize,
        mean: usize,
        std: usize,
    },
}
