//! Tree learning: data partition, leaf statistics, histograms, and the
//! serial / distributed learners.

pub mod data_partition;
pub mod feature_histogram;
pub mod histogram_pool;
pub mod leaf_splits;
pub mod parallel;
pub mod serial;
pub mod split_info;

pub use data_partition::DataPartition;
pub use feature_histogram::{FeatureHistogram, HistogramBinEntry};
pub use histogram_pool::HistogramPool;
pub use leaf_splits::LeafSplits;
pub use parallel::{DataParallelTreeLearner, VotingParallelTreeLearner};
pub use serial::{HistogramSync, NoSync, SerialTreeLearner};
pub use split_info::SplitInfo;
