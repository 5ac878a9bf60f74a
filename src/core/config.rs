//! Training and loading configuration.
//!
//! One flat [`Config`] carries every option the core recognizes, with a
//! builder for ergonomic construction and a `validate` pass that rejects
//! out-of-range values before any data is touched.

use crate::core::error::{HistGbmError, Result};
use crate::core::types::MAX_BIN_LIMIT;
use serde::{Deserialize, Serialize};

/// Configuration options recognized by the training core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cap on bins per feature.
    pub max_bin: u32,
    /// Permit sparse bin storage.
    pub is_enable_sparse: bool,
    /// Maximum leaves per tree.
    pub num_leaves: usize,
    /// Minimum rows required in each child of a split.
    pub min_data_in_leaf: i32,
    /// Minimum hessian mass required in each child of a split.
    pub min_sum_hessian_in_leaf: f64,
    /// Fraction of features sampled per tree, in (0, 1].
    pub feature_fraction: f64,
    /// Seed for the per-tree column sample.
    pub feature_fraction_seed: u64,
    /// Maximum tree depth; -1 means unlimited.
    pub max_depth: i32,
    /// L2 regularization on leaf outputs.
    pub lambda_l2: f64,
    /// Histogram cache budget in MiB; -1.0 caches every leaf.
    pub histogram_pool_size: f64,
    /// Seed for row sampling and rank stratification.
    pub data_random_seed: u64,
    /// Whether the training data is already partitioned across workers.
    pub is_pre_partition: bool,
    /// Number of workers; 1 disables the collective layer.
    pub num_machines: i32,
    /// TCP port this worker listens on.
    pub local_listen_port: u16,
    /// Collective operation timeout, in minutes.
    pub time_out: u64,
    /// Path of the machine list file; empty when single-machine.
    pub machine_list_filename: String,
    /// Label column: `name:<column>` or a numeric index. Empty means column 0.
    pub label_column: String,
    /// Weight column, same syntax as `label_column`. Empty means none.
    pub weight_column: String,
    /// Query/group column, same syntax. Empty means none.
    pub group_column: String,
    /// Comma-separated columns to drop, same syntax per entry.
    pub ignore_column: String,
    /// Whether text input carries a header line.
    pub has_header: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_bin: 255,
            is_enable_sparse: true,
            num_leaves: 31,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            feature_fraction: 1.0,
            feature_fraction_seed: 2,
            max_depth: -1,
            lambda_l2: 0.0,
            histogram_pool_size: -1.0,
            data_random_seed: 1,
            is_pre_partition: false,
            num_machines: 1,
            local_listen_port: 12400,
            time_out: 120,
            machine_list_filename: String::new(),
            label_column: String::new(),
            weight_column: String::new(),
            group_column: String::new(),
            ignore_column: String::new(),
            has_header: false,
        }
    }
}

impl Config {
    /// Check every option against its documented range.
    pub fn validate(&self) -> Result<()> {
        if self.num_leaves < 2 {
            return Err(HistGbmError::invalid_parameter(
                "num_leaves",
                self.num_leaves.to_string(),
                "a tree needs at least 2 leaves",
            ));
        }
        if self.max_bin < 2 || self.max_bin > MAX_BIN_LIMIT {
            return Err(HistGbmError::invalid_parameter(
                "max_bin",
                self.max_bin.to_string(),
                format!("must be in [2, {}]", MAX_BIN_LIMIT),
            ));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(HistGbmError::invalid_parameter(
                "feature_fraction",
                self.feature_fraction.to_string(),
                "must be in (0, 1]",
            ));
        }
        if self.min_data_in_leaf < 0 {
            return Err(HistGbmError::invalid_parameter(
                "min_data_in_leaf",
                self.min_data_in_leaf.to_string(),
                "cannot be negative",
            ));
        }
        if self.min_sum_hessian_in_leaf < 0.0 {
            return Err(HistGbmError::invalid_parameter(
                "min_sum_hessian_in_leaf",
                self.min_sum_hessian_in_leaf.to_string(),
                "cannot be negative",
            ));
        }
        if self.lambda_l2 < 0.0 {
            return Err(HistGbmError::invalid_parameter(
                "lambda_l2",
                self.lambda_l2.to_string(),
                "cannot be negative",
            ));
        }
        if self.num_machines < 1 {
            return Err(HistGbmError::invalid_parameter(
                "num_machines",
                self.num_machines.to_string(),
                "needs at least one machine",
            ));
        }
        if self.num_machines > 1 && self.machine_list_filename.is_empty() {
            return Err(HistGbmError::config(
                "num_machines > 1 requires machine_list_filename",
            ));
        }
        Ok(())
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Set the bin cap per feature.
    pub fn max_bin(mut self, v: u32) -> Self {
        self.config.max_bin = v;
        self
    }

    /// Enable or disable sparse bin storage.
    pub fn is_enable_sparse(mut self, v: bool) -> Self {
        self.config.is_enable_sparse = v;
        self
    }

    /// Set the leaf cap per tree.
    pub fn num_leaves(mut self, v: usize) -> Self {
        self.config.num_leaves = v;
        self
    }

    /// Set the minimum rows per child.
    pub fn min_data_in_leaf(mut self, v: i32) -> Self {
        self.config.min_data_in_leaf = v;
        self
    }

    /// Set the minimum hessian mass per child.
    pub fn min_sum_hessian_in_leaf(mut self, v: f64) -> Self {
        self.config.min_sum_hessian_in_leaf = v;
        self
    }

    /// Set the per-tree column sample fraction.
    pub fn feature_fraction(mut self, v: f64) -> Self {
        self.config.feature_fraction = v;
        self
    }

    /// Set the column sample seed.
    pub fn feature_fraction_seed(mut self, v: u64) -> Self {
        self.config.feature_fraction_seed = v;
        self
    }

    /// Set the depth cap (-1 = unlimited).
    pub fn max_depth(mut self, v: i32) -> Self {
        self.config.max_depth = v;
        self
    }

    /// Set the L2 regularization strength.
    pub fn lambda_l2(mut self, v: f64) -> Self {
        self.config.lambda_l2 = v;
        self
    }

    /// Set the histogram cache budget in MiB (-1.0 = unbounded).
    pub fn histogram_pool_size(mut self, v: f64) -> Self {
        self.config.histogram_pool_size = v;
        self
    }

    /// Set the data sampling seed.
    pub fn data_random_seed(mut self, v: u64) -> Self {
        self.config.data_random_seed = v;
        self
    }

    /// Mark the data as pre-partitioned across workers.
    pub fn is_pre_partition(mut self, v: bool) -> Self {
        self.config.is_pre_partition = v;
        self
    }

    /// Set the worker count.
    pub fn num_machines(mut self, v: i32) -> Self {
        self.config.num_machines = v;
        self
    }

    /// Set the local listen port.
    pub fn local_listen_port(mut self, v: u16) -> Self {
        self.config.local_listen_port = v;
        self
    }

    /// Set the collective timeout in minutes.
    pub fn time_out(mut self, v: u64) -> Self {
        self.config.time_out = v;
        self
    }

    /// Set the machine list file path.
    pub fn machine_list_filename<S: Into<String>>(mut self, v: S) -> Self {
        self.config.machine_list_filename = v.into();
        self
    }

    /// Set the label column spec.
    pub fn label_column<S: Into<String>>(mut self, v: S) -> Self {
        self.config.label_column = v.into();
        self
    }

    /// Set the weight column spec.
    pub fn weight_column<S: Into<String>>(mut self, v: S) -> Self {
        self.config.weight_column = v.into();
        self
    }

    /// Set the query/group column spec.
    pub fn group_column<S: Into<String>>(mut self, v: S) -> Self {
        self.config.group_column = v.into();
        self
    }

    /// Set the ignored columns spec.
    pub fn ignore_column<S: Into<String>>(mut self, v: S) -> Self {
        self.config.ignore_column = v.into();
        self
    }

    /// Mark the text input as carrying a header line.
    pub fn has_header(mut self, v: bool) -> Self {
        self.config.has_header = v;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
