//! Core scalar types for histgbm.
//!
//! These aliases pin the width of every quantity that flows through the
//! training pipeline, so storage layouts and the wire format stay stable.

/// Data indexing type. 32-bit, supporting up to 2 billion rows.
pub type DataSize = i32;

/// Gradient / hessian value type. 32-bit float, cheap to re-order in bulk.
pub type Score = f32;

/// Label and sample-weight type.
pub type Label = f32;

/// Histogram accumulation type. 64-bit float for numerical stability.
pub type Hist = f64;

/// Bin index type for discretized feature values.
pub type BinIndex = u32;

/// Sentinel gain meaning "no valid split".
pub const MIN_GAIN: f64 = f64::NEG_INFINITY;

/// Hard cap on bins per feature; bin codes must fit one byte of storage.
pub const MAX_BIN_LIMIT: u32 = 256;

/// A feature whose zero fraction exceeds this is stored sparse (and gets an
/// ordered bin), provided sparse storage is enabled.
pub const SPARSE_ZERO_RATE: f64 = 0.75;

/// Rows sampled for bin-boundary learning.
pub const BIN_SAMPLE_COUNT: usize = 50_000;

/// Minimum rows before a loop bothers going parallel.
pub const PARALLEL_THRESHOLD: DataSize = 1024;
