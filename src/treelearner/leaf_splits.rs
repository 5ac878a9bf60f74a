//! Per-leaf aggregates used while hunting for the next split.

use crate::core::types::{DataSize, Score, PARALLEL_THRESHOLD};
use crate::treelearner::data_partition::DataPartition;
use crate::treelearner::split_info::SplitInfo;
use rayon::prelude::*;

/// Gradient/hessian totals of one leaf plus the per-feature best-split
/// scratch filled by the threshold search.
#[derive(Debug, Clone)]
pub struct LeafSplits {
    /// Leaf this state describes; -1 when inactive.
    leaf_index: i32,
    num_data_in_leaf: DataSize,
    num_data: DataSize,
    sum_gradients: f64,
    sum_hessians: f64,
    /// One slot per used feature; each threshold search writes only its
    /// own slot.
    best_split_per_feature: Vec<SplitInfo>,
}

impl LeafSplits {
    /// Create for a dataset of `num_data` rows and `num_features` used
    /// features.
    pub fn new(num_features: usize, num_data: DataSize) -> Self {
        LeafSplits {
            leaf_index: -1,
            num_data_in_leaf: 0,
            num_data,
            sum_gradients: 0.0,
            sum_hessians: 0.0,
            best_split_per_feature: vec![SplitInfo::default(); num_features],
        }
    }

    /// Prime for the root leaf by summing every row.
    pub fn init_root(&mut self, gradients: &[Score], hessians: &[Score]) {
        self.leaf_index = 0;
        self.num_data_in_leaf = self.num_data;
        let n = self.num_data as usize;
        let (sum_g, sum_h) = if self.num_data >= PARALLEL_THRESHOLD {
            gradients[..n]
                .par_iter()
                .zip(hessians[..n].par_iter())
                .map(|(&g, &h)| (g as f64, h as f64))
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
        } else {
            let mut sum_g = 0.0;
            let mut sum_h = 0.0;
            for i in 0..n {
                sum_g += gradients[i] as f64;
                sum_h += hessians[i] as f64;
            }
            (sum_g, sum_h)
        };
        self.sum_gradients = sum_g;
        self.sum_hessians = sum_h;
        self.reset_best_splits();
    }

    /// Prime for a leaf by summing only its partition range; used when the
    /// root trains on a bagged subset.
    pub fn init_from_partition(
        &mut self,
        leaf: usize,
        partition: &DataPartition,
        gradients: &[Score],
        hessians: &[Score],
    ) {
        self.leaf_index = leaf as i32;
        let indices = partition.leaf_indices(leaf);
        self.num_data_in_leaf = indices.len() as DataSize;
        let mut sum_g = 0.0;
        let mut sum_h = 0.0;
        for &row in indices {
            sum_g += gradients[row as usize] as f64;
            sum_h += hessians[row as usize] as f64;
        }
        self.sum_gradients = sum_g;
        self.sum_hessians = sum_h;
        self.reset_best_splits();
    }

    /// Prime for a fresh child using the sums and count the split already
    /// computed. In distributed mode these are global quantities, so the
    /// count is explicit rather than read from the local partition.
    pub fn init_with_sums(
        &mut self,
        leaf: usize,
        num_data_in_leaf: DataSize,
        sum_gradients: f64,
        sum_hessians: f64,
    ) {
        self.leaf_index = leaf as i32;
        self.num_data_in_leaf = num_data_in_leaf;
        self.sum_gradients = sum_gradients;
        self.sum_hessians = sum_hessians;
        self.reset_best_splits();
    }

    /// Replace the totals with globally reduced values, keeping the leaf
    /// binding. Used after the root sums are synced across workers.
    pub fn set_global_sums(&mut self, sum_gradients: f64, sum_hessians: f64, count: DataSize) {
        self.sum_gradients = sum_gradients;
        self.sum_hessians = sum_hessians;
        self.num_data_in_leaf = count;
    }

    /// Deactivate; only the root exists at the start of a tree.
    pub fn init_empty(&mut self) {
        self.leaf_index = -1;
        self.num_data_in_leaf = 0;
        self.sum_gradients = 0.0;
        self.sum_hessians = 0.0;
        self.reset_best_splits();
    }

    fn reset_best_splits(&mut self) {
        for split in &mut self.best_split_per_feature {
            split.reset();
        }
    }

    /// Leaf index, -1 when inactive.
    #[inline]
    pub fn leaf_index(&self) -> i32 {
        self.leaf_index
    }

    /// Rows in the leaf.
    #[inline]
    pub fn num_data_in_leaf(&self) -> DataSize {
        self.num_data_in_leaf
    }

    /// Gradient total of the leaf.
    #[inline]
    pub fn sum_gradients(&self) -> f64 {
        self.sum_gradients
    }

    /// Hessian total of the leaf.
    #[inline]
    pub fn sum_hessians(&self) -> f64 {
        self.sum_hessians
    }

    /// Per-feature best splits found so far.
    pub fn best_split_per_feature(&self) -> &[SplitInfo] {
        &self.best_split_per_feature
    }

    /// Mutable per-feature scratch for the threshold search.
    pub fn best_split_per_feature_mut(&mut self) -> &mut [SplitInfo] {
        &mut self.best_split_per_feature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_root_sums() {
        let mut splits = LeafSplits::new(2, 4);
        splits.init_root(&[1.0, 2.0, 3.0, 4.0], &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(splits.leaf_index(), 0);
        assert_eq!(splits.num_data_in_leaf(), 4);
        assert_eq!(splits.sum_gradients(), 10.0);
        assert_eq!(splits.sum_hessians(), 2.0);
    }

    #[test]
    fn test_init_from_partition_sums_range_only() {
        let mut partition = DataPartition::new(6, 2);
        partition.set_used_indices(vec![0, 2, 4]);
        partition.init();
        let gradients = [1.0, 10.0, 2.0, 10.0, 3.0, 10.0];
        let hessians = [1.0; 6];
        let mut splits = LeafSplits::new(1, 6);
        splits.init_from_partition(0, &partition, &gradients, &hessians);
        assert_eq!(splits.num_data_in_leaf(), 3);
        assert_eq!(splits.sum_gradients(), 6.0);
        assert_eq!(splits.sum_hessians(), 3.0);
    }

    #[test]
    fn test_init_empty_resets_scratch() {
        let mut splits = LeafSplits::new(3, 10);
        splits.best_split_per_feature_mut()[1].gain = 5.0;
        splits.init_empty();
        assert_eq!(splits.leaf_index(), -1);
        assert!(!splits.best_split_per_feature()[1].is_valid());
    }

    #[test]
    fn test_parallel_root_sum_matches_serial() {
        let n = 5000;
        let gradients: Vec<Score> = (0..n).map(|i| ((i % 13) as Score) - 6.0).collect();
        let hessians: Vec<Score> = vec![1.0; n];
        let mut splits = LeafSplits::new(1, n as DataSize);
        splits.init_root(&gradients, &hessians);
        let expected: f64 = gradients.iter().map(|&g| g as f64).sum();
        assert!((splits.sum_gradients() - expected).abs() < 1e-9);
        assert_eq!(splits.sum_hessians(), n as f64);
    }
}
