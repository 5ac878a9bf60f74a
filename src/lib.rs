//! # histgbm
//!
//! Histogram-based distributed gradient boosted decision tree training
//! core in pure Rust.
//!
//! Given a tabular dataset of continuous features and per-row
//! gradients/hessians supplied by an outer boosting loop, the crate grows
//! one regression tree at a time: features are discretized into small
//! integer bins, per-leaf gradient histograms are built (and derived by
//! sibling subtraction where possible), and the leaf with the best
//! regularized gain is split until the leaf budget runs out or no split
//! improves the loss. An optional distributed mode shards bin-boundary
//! learning and sums histograms across workers over Bruck all-gather and
//! recursive-halving all-reduce schedules.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use histgbm::{ConfigBuilder, Dataset, SerialTreeLearner};
//! use ndarray::Array2;
//!
//! # fn main() -> histgbm::Result<()> {
//! let features = Array2::from_shape_vec(
//!     (4, 2),
//!     vec![1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0],
//! ).unwrap();
//! let labels = vec![3.0, 5.0, 7.0, 9.0];
//!
//! let config = ConfigBuilder::new()
//!     .num_leaves(31)
//!     .min_data_in_leaf(1)
//!     .build()?;
//! let dataset = Dataset::from_matrix(features.view(), &labels, &config)?;
//!
//! // gradients/hessians come from the outer boosting loop
//! let gradients = vec![-1.0f32, -0.5, 0.5, 1.0];
//! let hessians = vec![1.0f32; 4];
//! let mut learner = SerialTreeLearner::new(&config, &dataset)?;
//! let tree = learner.train(&gradients, &hessians)?;
//! println!("grew {} leaves", tree.num_leaves());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod core;
pub mod dataset;
pub mod network;
pub mod tree;
pub mod treelearner;

pub use crate::core::{Config, ConfigBuilder, HistGbmError, Result};
pub use crate::dataset::{BinMapper, Dataset, Feature, InitScore, Metadata};
pub use crate::network::Network;
pub use crate::tree::Tree;
pub use crate::treelearner::{
    DataParallelTreeLearner, SerialTreeLearner, VotingParallelTreeLearner,
};
