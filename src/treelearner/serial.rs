//! Leaf-wise histogram tree learner.
//!
//! Grows one regression tree per `train` call: prime the root, then
//! repeatedly find the best (leaf, feature, threshold) split, partition the
//! data, and continue until the leaf budget is spent or no split has
//! positive gain. Sibling histograms are derived by subtraction from the
//! cached parent whenever the pool still holds it.

use crate::core::config::Config;
use crate::core::error::{HistGbmError, Result};
use crate::core::random::Random;
use crate::core::types::{DataSize, Score, PARALLEL_THRESHOLD};
use crate::dataset::dataset::Dataset;
use crate::dataset::ordered_bin::OrderedBin;
use crate::tree::Tree;
use crate::treelearner::data_partition::DataPartition;
use crate::treelearner::feature_histogram::FeatureHistogram;
use crate::treelearner::histogram_pool::HistogramPool;
use crate::treelearner::leaf_splits::LeafSplits;
use crate::treelearner::split_info::{arg_max_gain, SplitInfo};
use rayon::prelude::*;

/// Hook for synchronizing leaf statistics and histograms across workers.
///
/// The serial learner uses the identity [`NoSync`]; the distributed
/// learners plug in collective reductions at the same two points the
/// algorithm needs global state.
pub trait HistogramSync: Send {
    /// Reduce the root's `(sum_gradients, sum_hessians, count)` across
    /// workers.
    fn sync_root(&mut self, sum_g: f64, sum_h: f64, count: DataSize)
        -> Result<(f64, f64, DataSize)>;

    /// Reduce freshly built histograms across workers before the threshold
    /// search. `larger` is present only when the larger child was built
    /// from data rather than by subtraction; the stats tuples carry each
    /// leaf's `(sum_gradients, sum_hessians, count)`. May return a
    /// per-feature mask restricting which features are searched this
    /// iteration.
    fn sync_histograms(
        &mut self,
        features: &[usize],
        smaller: &mut [FeatureHistogram],
        larger: Option<&mut [FeatureHistogram]>,
        smaller_stats: (f64, f64, DataSize),
        larger_stats: (f64, f64, DataSize),
    ) -> Result<Option<Vec<bool>>>;

    /// Whether the parent-subtraction trick is usable. Voting-based sync
    /// reduces only a subset of columns, so its cached histograms cannot
    /// seed a subtraction.
    fn use_subtraction(&self) -> bool {
        true
    }

    /// Whether per-leaf ordered bins may drive histogram construction.
    /// The ordered-bin path recovers the default bin from the leaf totals,
    /// which are global under a distributed sync while the walked entries
    /// are local, so distributed learners scan the column instead.
    fn use_ordered_bins(&self) -> bool {
        true
    }
}

/// Single-machine sync: everything is already global.
#[derive(Debug, Default)]
pub struct NoSync;

impl HistogramSync for NoSync {
    fn sync_root(
        &mut self,
        sum_g: f64,
        sum_h: f64,
        count: DataSize,
    ) -> Result<(f64, f64, DataSize)> {
        Ok((sum_g, sum_h, count))
    }

    fn sync_histograms(
        &mut self,
        _features: &[usize],
        _smaller: &mut [FeatureHistogram],
        _larger: Option<&mut [FeatureHistogram]>,
        _smaller_stats: (f64, f64, DataSize),
        _larger_stats: (f64, f64, DataSize),
    ) -> Result<Option<Vec<bool>>> {
        Ok(None)
    }
}

/// Histogram-based leaf-wise tree learner over one [`Dataset`].
pub struct SerialTreeLearner<'a> {
    train_data: &'a Dataset,
    num_leaves: usize,
    min_data_in_leaf: DataSize,
    min_sum_hessian_in_leaf: f64,
    feature_fraction: f64,
    lambda_l2: f64,
    max_depth: i32,
    num_data: DataSize,
    num_features: usize,

    random: Random,
    histogram_pool: HistogramPool,
    data_partition: DataPartition,
    is_feature_used: Vec<bool>,
    smaller_leaf_splits: LeafSplits,
    larger_leaf_splits: LeafSplits,
    best_split_per_leaf: Vec<SplitInfo>,
    /// Row count per leaf; global across workers in distributed mode.
    leaf_count_global: Vec<DataSize>,
    ordered_bins: Vec<Option<OrderedBin>>,
    has_ordered_bin: bool,
    is_data_in_leaf: Vec<u8>,
    /// Gradients re-ordered by the current partition; smaller leaf first,
    /// larger appended when it must be built from data.
    ordered_gradients: Vec<Score>,
    ordered_hessians: Vec<Score>,

    sync: Box<dyn HistogramSync + 'a>,

    // per-split-iteration state
    smaller_slot: usize,
    larger_slot: Option<usize>,
    has_parent_hist: bool,
    /// Root trains on all rows in natural order, so the caller's arrays
    /// are used directly instead of an ordered copy.
    smaller_is_raw: bool,
    larger_in_ordered: bool,
}

impl<'a> SerialTreeLearner<'a> {
    /// Create a single-machine learner.
    pub fn new(config: &Config, train_data: &'a Dataset) -> Result<Self> {
        Self::with_sync(config, train_data, Box::new(NoSync))
    }

    /// Create with an explicit sync strategy; the distributed learners
    /// build on this.
    pub fn with_sync(
        config: &Config,
        train_data: &'a Dataset,
        sync: Box<dyn HistogramSync + 'a>,
    ) -> Result<Self> {
        config.validate()?;
        let num_data = train_data.num_data();
        let num_features = train_data.num_features();
        if num_features == 0 {
            return Err(HistGbmError::consistency(
                "cannot train with an empty usable-feature set",
            ));
        }

        let num_bins: Vec<u32> = train_data.features().iter().map(|f| f.num_bin()).collect();
        let cap = HistogramPool::cap_for(
            config.histogram_pool_size,
            HistogramPool::bins_per_leaf(&num_bins),
            config.num_leaves,
        );
        let mut histogram_pool = HistogramPool::new();
        histogram_pool.reset_size(cap, config.num_leaves);
        histogram_pool.fill(|| {
            num_bins
                .iter()
                .map(|&b| FeatureHistogram::new(b))
                .collect()
        });

        let ordered_bins: Vec<Option<OrderedBin>> = if sync.use_ordered_bins() {
            train_data
                .features()
                .par_iter()
                .map(|f| f.create_ordered_bin())
                .collect()
        } else {
            vec![None; num_features]
        };
        let has_ordered_bin = ordered_bins.iter().any(Option::is_some);

        log::info!(
            "Number of data: {}, number of features: {}",
            num_data,
            num_features
        );

        Ok(SerialTreeLearner {
            train_data,
            num_leaves: config.num_leaves,
            min_data_in_leaf: config.min_data_in_leaf,
            min_sum_hessian_in_leaf: config.min_sum_hessian_in_leaf,
            feature_fraction: config.feature_fraction,
            lambda_l2: config.lambda_l2,
            max_depth: config.max_depth,
            num_data,
            num_features,
            random: Random::new(config.feature_fraction_seed),
            histogram_pool,
            data_partition: DataPartition::new(num_data, config.num_leaves),
            is_feature_used: vec![false; num_features],
            smaller_leaf_splits: LeafSplits::new(num_features, num_data),
            larger_leaf_splits: LeafSplits::new(num_features, num_data),
            best_split_per_leaf: vec![SplitInfo::default(); config.num_leaves],
            leaf_count_global: vec![0; config.num_leaves],
            ordered_bins,
            has_ordered_bin,
            is_data_in_leaf: if has_ordered_bin {
                vec![0; num_data as usize]
            } else {
                Vec::new()
            },
            ordered_gradients: vec![0.0; num_data as usize],
            ordered_hessians: vec![0.0; num_data as usize],
            sync,
            smaller_slot: 0,
            larger_slot: None,
            has_parent_hist: false,
            smaller_is_raw: true,
            larger_in_ordered: false,
        })
    }

    /// Restrict the next trees to a bagged subset of rows (ascending), or
    /// `None` to train on everything.
    pub fn set_bagging_indices(&mut self, used: Option<Vec<DataSize>>) {
        match used {
            Some(indices) => self.data_partition.set_used_indices(indices),
            None => self.data_partition.clear_used_indices(),
        }
    }

    /// Number of slots the histogram pool holds.
    pub fn histogram_cache_size(&self) -> usize {
        self.histogram_pool.cap()
    }

    /// Leaves with a resident histogram array right now.
    pub fn resident_histograms(&self) -> usize {
        self.histogram_pool.resident_count()
    }

    /// Grow one tree for the given gradients/hessians.
    pub fn train(&mut self, gradients: &[Score], hessians: &[Score]) -> Result<Tree> {
        if gradients.len() != self.num_data as usize || hessians.len() != self.num_data as usize {
            return Err(HistGbmError::consistency(format!(
                "gradient/hessian arrays ({}, {}) do not match row count {}",
                gradients.len(),
                hessians.len(),
                self.num_data
            )));
        }

        self.before_train(gradients, hessians)?;
        let mut tree = Tree::new(self.num_leaves);
        let mut left_leaf = 0usize;
        let mut right_leaf: Option<usize> = None;

        for _ in 0..self.num_leaves - 1 {
            if self.before_find_best_split(&tree, left_leaf, right_leaf, gradients, hessians) {
                self.find_best_thresholds(gradients, hessians)?;
                self.find_best_splits_for_leaves();
            }

            let best_leaf = arg_max_gain(&self.best_split_per_leaf);
            let best_gain = self.best_split_per_leaf[best_leaf].gain;
            if best_gain <= 0.0 {
                log::info!(
                    "no split with positive gain left (best = {}), stopping with {} leaves",
                    best_gain,
                    tree.num_leaves()
                );
                break;
            }

            let right = self.split(&mut tree, best_leaf);
            left_leaf = best_leaf;
            right_leaf = Some(right);
        }
        Ok(tree)
    }

    fn before_train(&mut self, gradients: &[Score], hessians: &[Score]) -> Result<()> {
        self.histogram_pool.reset_map();

        // per-tree column sample
        self.is_feature_used.fill(false);
        let used_cnt = ((self.num_features as f64 * self.feature_fraction) as usize).max(1);
        if used_cnt >= self.num_features {
            self.is_feature_used.fill(true);
        } else {
            for idx in self.random.sample(self.num_features, used_cnt) {
                self.is_feature_used[idx] = true;
            }
        }

        self.data_partition.init();
        for split in &mut self.best_split_per_leaf {
            split.reset();
        }
        self.leaf_count_global.fill(0);

        // root sums; with bagging only the used rows count, and their
        // gradients are copied into the ordered buffers up front
        if self.data_partition.leaf_count(0) == self.num_data {
            self.smaller_leaf_splits.init_root(gradients, hessians);
            self.smaller_is_raw = true;
        } else {
            self.smaller_leaf_splits.init_from_partition(
                0,
                &self.data_partition,
                gradients,
                hessians,
            );
            let indices = self.data_partition.leaf_indices(0);
            copy_ordered(
                &mut self.ordered_gradients[..indices.len()],
                &mut self.ordered_hessians[..indices.len()],
                indices,
                gradients,
                hessians,
            );
            self.smaller_is_raw = false;
        }
        self.larger_in_ordered = false;
        self.larger_leaf_splits.init_empty();

        let (sum_g, sum_h, count) = self.sync.sync_root(
            self.smaller_leaf_splits.sum_gradients(),
            self.smaller_leaf_splits.sum_hessians(),
            self.smaller_leaf_splits.num_data_in_leaf(),
        )?;
        self.smaller_leaf_splits.set_global_sums(sum_g, sum_h, count);
        self.leaf_count_global[0] = count;

        // seed the ordered bins for this tree
        if self.has_ordered_bin {
            let num_leaves = self.num_leaves;
            if self.data_partition.leaf_count(0) == self.num_data {
                self.ordered_bins.par_iter_mut().for_each(|ob| {
                    if let Some(ob) = ob {
                        ob.init(None, num_leaves);
                    }
                });
            } else {
                self.is_data_in_leaf.fill(0);
                for &row in self.data_partition.leaf_indices(0) {
                    self.is_data_in_leaf[row as usize] = 1;
                }
                let mask = &self.is_data_in_leaf;
                self.ordered_bins.par_iter_mut().for_each(|ob| {
                    if let Some(ob) = ob {
                        ob.init(Some(mask), num_leaves);
                    }
                });
            }
        }
        Ok(())
    }

    /// Pool discipline and ordered-gradient staging for the next split
    /// hunt. Returns false when neither `left_leaf` nor `right_leaf` can
    /// legally be split.
    fn before_find_best_split(
        &mut self,
        tree: &Tree,
        left_leaf: usize,
        right_leaf: Option<usize>,
        gradients: &[Score],
        hessians: &[Score],
    ) -> bool {
        // depth gate: both children of the last split sit on the same level
        if self.max_depth > 0 && tree.leaf_depth(left_leaf) >= self.max_depth {
            self.best_split_per_leaf[left_leaf].reset();
            if let Some(right) = right_leaf {
                self.best_split_per_leaf[right].reset();
            }
            return false;
        }
        let left_count = self.leaf_count_global[left_leaf];
        let right_count = right_leaf.map(|r| self.leaf_count_global[r]).unwrap_or(0);
        if left_count < self.min_data_in_leaf * 2 && right_count < self.min_data_in_leaf * 2 {
            self.best_split_per_leaf[left_leaf].reset();
            if let Some(right) = right_leaf {
                self.best_split_per_leaf[right].reset();
            }
            return false;
        }

        self.has_parent_hist = false;
        match right_leaf {
            None => {
                // root: one fresh histogram array
                let (slot, _) = self.histogram_pool.get(left_leaf);
                self.smaller_slot = slot;
                self.larger_slot = None;
            }
            Some(right) => {
                let (smaller, larger) = if left_count < right_count {
                    (left_leaf, right)
                } else {
                    (right, left_leaf)
                };

                // the parent's histograms are keyed by the left leaf; hand
                // them to the larger child and claim a fresh array for the
                // smaller one
                let (parent_slot, parent_hit) = self.histogram_pool.get(left_leaf);
                if parent_hit && self.sync.use_subtraction() {
                    self.has_parent_hist = true;
                }
                if larger == right {
                    self.histogram_pool.move_to(left_leaf, right);
                }
                let (smaller_slot, _) = self.histogram_pool.get(smaller);
                self.smaller_slot = smaller_slot;
                self.larger_slot = Some(parent_slot);

                // stage ordered gradients for the smaller leaf, and for the
                // larger one too when its histograms cannot come from
                // subtraction
                let smaller_indices = self.data_partition.leaf_indices(smaller);
                let smaller_size = smaller_indices.len();
                copy_ordered(
                    &mut self.ordered_gradients[..smaller_size],
                    &mut self.ordered_hessians[..smaller_size],
                    smaller_indices,
                    gradients,
                    hessians,
                );
                self.smaller_is_raw = false;

                if !self.has_parent_hist {
                    let larger_indices = self.data_partition.leaf_indices(larger);
                    let larger_size = larger_indices.len();
                    copy_ordered(
                        &mut self.ordered_gradients[smaller_size..smaller_size + larger_size],
                        &mut self.ordered_hessians[smaller_size..smaller_size + larger_size],
                        larger_indices,
                        gradients,
                        hessians,
                    );
                    self.larger_in_ordered = true;
                } else {
                    self.larger_in_ordered = false;
                }

                // regroup the ordered bins: entries of rows that left the
                // parent (now the left leaf) move to the right leaf
                if self.has_ordered_bin {
                    self.is_data_in_leaf.fill(0);
                    for &row in self.data_partition.leaf_indices(left_leaf) {
                        self.is_data_in_leaf[row as usize] = 1;
                    }
                    let mask = &self.is_data_in_leaf;
                    self.ordered_bins.par_iter_mut().for_each(|ob| {
                        if let Some(ob) = ob {
                            ob.split(left_leaf, right, mask);
                        }
                    });
                }
            }
        }
        true
    }

    /// Build histograms and search every used feature for its best
    /// threshold, in parallel per feature.
    fn find_best_thresholds(&mut self, gradients: &[Score], hessians: &[Score]) -> Result<()> {
        let smaller_leaf = self.smaller_leaf_splits.leaf_index();
        if smaller_leaf < 0 {
            return Ok(());
        }
        let smaller_leaf = smaller_leaf as usize;
        let larger_active = self.larger_leaf_splits.leaf_index() >= 0;

        let smaller_sum_g = self.smaller_leaf_splits.sum_gradients();
        let smaller_sum_h = self.smaller_leaf_splits.sum_hessians();
        let smaller_count = self.smaller_leaf_splits.num_data_in_leaf();
        let larger_sum_g = self.larger_leaf_splits.sum_gradients();
        let larger_sum_h = self.larger_leaf_splits.sum_hessians();
        let larger_count = self.larger_leaf_splits.num_data_in_leaf();
        let larger_leaf = self.larger_leaf_splits.leaf_index().max(0) as usize;

        let smaller_indices = self.data_partition.leaf_indices(smaller_leaf);
        let smaller_size = smaller_indices.len();
        let larger_indices = if larger_active {
            self.data_partition.leaf_indices(larger_leaf)
        } else {
            &[]
        };
        let larger_size = larger_indices.len();

        let (smaller_g, smaller_h): (&[Score], &[Score]) = if self.smaller_is_raw {
            (gradients, hessians)
        } else {
            (
                &self.ordered_gradients[..smaller_size],
                &self.ordered_hessians[..smaller_size],
            )
        };
        let (larger_g, larger_h): (&[Score], &[Score]) = if self.larger_in_ordered {
            (
                &self.ordered_gradients[smaller_size..smaller_size + larger_size],
                &self.ordered_hessians[smaller_size..smaller_size + larger_size],
            )
        } else {
            (&[], &[])
        };

        let train_data = self.train_data;
        let ordered_bins = &self.ordered_bins;
        let is_feature_used = &self.is_feature_used;
        let has_parent = self.has_parent_hist;
        let build_larger_from_data = larger_active && !has_parent;
        let lambda_l2 = self.lambda_l2;
        let min_data = self.min_data_in_leaf;
        let min_hessian = self.min_sum_hessian_in_leaf;

        let (smaller_hists, mut larger_hists): (
            &mut [FeatureHistogram],
            Option<&mut [FeatureHistogram]>,
        ) = match self.larger_slot {
            Some(larger_slot) if larger_active => {
                let (s, l) = self
                    .histogram_pool
                    .two_slots_mut(self.smaller_slot, larger_slot);
                (s, Some(l))
            }
            _ => (self.histogram_pool.slot_mut(self.smaller_slot), None),
        };

        // --- construct phase ---
        let construct_smaller = |f: usize, hist: &mut FeatureHistogram| {
            match &ordered_bins[f] {
                Some(ob) => hist.construct_from_ordered(
                    ob.leaf_entries(smaller_leaf),
                    gradients,
                    hessians,
                    smaller_sum_g,
                    smaller_sum_h,
                    smaller_count,
                ),
                None => hist.construct(
                    train_data.feature_at(f).bin_data(),
                    smaller_indices,
                    smaller_g,
                    smaller_h,
                ),
            };
        };
        let construct_larger = |f: usize, hist: &mut FeatureHistogram| {
            match &ordered_bins[f] {
                Some(ob) => hist.construct_from_ordered(
                    ob.leaf_entries(larger_leaf),
                    gradients,
                    hessians,
                    larger_sum_g,
                    larger_sum_h,
                    larger_count,
                ),
                None => hist.construct(
                    train_data.feature_at(f).bin_data(),
                    larger_indices,
                    larger_g,
                    larger_h,
                ),
            };
        };

        let skip: Vec<bool> = match larger_hists.as_deref_mut() {
            Some(larger_hists) => smaller_hists
                .par_iter_mut()
                .zip(larger_hists.par_iter_mut())
                .enumerate()
                .map(|(f, (sh, lh))| {
                    if !is_feature_used[f] {
                        return true;
                    }
                    // a parent that could not split on f rules out both
                    // children
                    if has_parent && !lh.is_splittable() {
                        sh.set_splittable(false);
                        return true;
                    }
                    construct_smaller(f, sh);
                    if build_larger_from_data {
                        construct_larger(f, lh);
                    }
                    false
                })
                .collect(),
            None => smaller_hists
                .par_iter_mut()
                .enumerate()
                .map(|(f, sh)| {
                    if !is_feature_used[f] {
                        return true;
                    }
                    construct_smaller(f, sh);
                    false
                })
                .collect(),
        };

        // --- sync phase (distributed only) ---
        let synced_features: Vec<usize> = (0..self.num_features).filter(|&f| !skip[f]).collect();
        let searchable = self.sync.sync_histograms(
            &synced_features,
            smaller_hists,
            if build_larger_from_data {
                larger_hists.as_deref_mut()
            } else {
                None
            },
            (smaller_sum_g, smaller_sum_h, smaller_count),
            (larger_sum_g, larger_sum_h, larger_count),
        )?;

        // --- search phase ---
        let smaller_best = self.smaller_leaf_splits.best_split_per_feature_mut();
        let larger_best = self.larger_leaf_splits.best_split_per_feature_mut();

        match larger_hists {
            Some(larger_hists) => {
                smaller_hists
                    .par_iter_mut()
                    .zip(larger_hists.par_iter_mut())
                    .zip(smaller_best.par_iter_mut().zip(larger_best.par_iter_mut()))
                    .enumerate()
                    .for_each(|(f, ((sh, lh), (sb, lb)))| {
                        if skip[f] || !searchable.as_ref().map_or(true, |m| m[f]) {
                            return;
                        }
                        sb.feature = f;
                        sh.find_best_threshold(
                            smaller_sum_g,
                            smaller_sum_h,
                            smaller_count,
                            lambda_l2,
                            min_data,
                            min_hessian,
                            sb,
                        );
                        if has_parent {
                            lh.subtract(sh);
                        }
                        lb.feature = f;
                        lh.find_best_threshold(
                            larger_sum_g,
                            larger_sum_h,
                            larger_count,
                            lambda_l2,
                            min_data,
                            min_hessian,
                            lb,
                        );
                    });
            }
            None => {
                smaller_hists
                    .par_iter_mut()
                    .zip(smaller_best.par_iter_mut())
                    .enumerate()
                    .for_each(|(f, (sh, sb))| {
                        if skip[f] || !searchable.as_ref().map_or(true, |m| m[f]) {
                            return;
                        }
                        sb.feature = f;
                        sh.find_best_threshold(
                            smaller_sum_g,
                            smaller_sum_h,
                            smaller_count,
                            lambda_l2,
                            min_data,
                            min_hessian,
                            sb,
                        );
                    });
            }
        }
        Ok(())
    }

    /// Per tracked leaf, keep the best split over all features.
    fn find_best_splits_for_leaves(&mut self) {
        let smaller_leaf = self.smaller_leaf_splits.leaf_index();
        if smaller_leaf >= 0 {
            let best = arg_max_gain(self.smaller_leaf_splits.best_split_per_feature());
            self.best_split_per_leaf[smaller_leaf as usize] =
                self.smaller_leaf_splits.best_split_per_feature()[best].clone();
        }
        let larger_leaf = self.larger_leaf_splits.leaf_index();
        if larger_leaf >= 0 {
            let best = arg_max_gain(self.larger_leaf_splits.best_split_per_feature());
            self.best_split_per_leaf[larger_leaf as usize] =
                self.larger_leaf_splits.best_split_per_feature()[best].clone();
        }
    }

    /// Apply the winning split: write the tree node, cut the partition,
    /// and prime both children from the split's precomputed sums.
    fn split(&mut self, tree: &mut Tree, best_leaf: usize) -> usize {
        let split_info = self.best_split_per_leaf[best_leaf].clone();
        let feature = self.train_data.feature_at(split_info.feature);

        let right_leaf = tree.split(
            best_leaf,
            split_info.feature,
            feature.feature_index(),
            split_info.threshold,
            feature.bin_mapper().bin_to_value(split_info.threshold),
            split_info.left_output,
            split_info.right_output,
            split_info.gain,
        );

        self.data_partition.split(
            best_leaf,
            feature.bin_data(),
            split_info.threshold,
            right_leaf,
        );
        self.leaf_count_global[best_leaf] = split_info.left_count;
        self.leaf_count_global[right_leaf] = split_info.right_count;

        if split_info.left_count < split_info.right_count {
            self.smaller_leaf_splits.init_with_sums(
                best_leaf,
                split_info.left_count,
                split_info.left_sum_gradient,
                split_info.left_sum_hessian,
            );
            self.larger_leaf_splits.init_with_sums(
                right_leaf,
                split_info.right_count,
                split_info.right_sum_gradient,
                split_info.right_sum_hessian,
            );
        } else {
            self.smaller_leaf_splits.init_with_sums(
                right_leaf,
                split_info.right_count,
                split_info.right_sum_gradient,
                split_info.right_sum_hessian,
            );
            self.larger_leaf_splits.init_with_sums(
                best_leaf,
                split_info.left_count,
                split_info.left_sum_gradient,
                split_info.left_sum_hessian,
            );
        }
        right_leaf
    }
}

/// Gather `gradients[indices[i]]` into `out_g[i]` (same for hessians), in
/// parallel above the usual threshold.
fn copy_ordered(
    out_g: &mut [Score],
    out_h: &mut [Score],
    indices: &[DataSize],
    gradients: &[Score],
    hessians: &[Score],
) {
    if indices.len() >= PARALLEL_THRESHOLD as usize {
        out_g
            .par_iter_mut()
            .zip(out_h.par_iter_mut())
            .zip(indices.par_iter())
            .for_each(|((g, h), &row)| {
                *g = gradients[row as usize];
                *h = hessians[row as usize];
            });
    } else {
        for (i, &row) in indices.iter().enumerate() {
            out_g[i] = gradients[row as usize];
            out_h[i] = hessians[row as usize];
        }
    }
}
