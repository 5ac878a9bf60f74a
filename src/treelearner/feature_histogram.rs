//! Per-feature gradient/hessian histograms and the best-threshold scan.

use crate::core::types::{BinIndex, DataSize, Hist, Score};
use crate::dataset::bin_data::BinData;
use crate::dataset::ordered_bin::OrderedEntry;
use crate::treelearner::split_info::SplitInfo;

/// One histogram bin: gradient sum, hessian sum, row count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramBinEntry {
    /// Sum of gradients of rows in this bin.
    pub sum_gradients: Hist,
    /// Sum of hessians of rows in this bin.
    pub sum_hessians: Hist,
    /// Number of rows in this bin.
    pub count: i32,
}

/// Histogram of one feature over the rows of one leaf.
#[derive(Debug, Clone)]
pub struct FeatureHistogram {
    data: Vec<HistogramBinEntry>,
    is_splittable: bool,
}

impl FeatureHistogram {
    /// Allocate for `num_bin` bins.
    pub fn new(num_bin: u32) -> Self {
        FeatureHistogram {
            data: vec![HistogramBinEntry::default(); num_bin as usize],
            is_splittable: true,
        }
    }

    /// Zero every bin and reset the splittable flag.
    pub fn clear(&mut self) {
        self.data.fill(HistogramBinEntry::default());
        self.is_splittable = true;
    }

    /// Bin entries.
    pub fn data(&self) -> &[HistogramBinEntry] {
        &self.data
    }

    /// Overwrite the bin entries, e.g. with globally reduced values.
    pub fn set_data(&mut self, entries: &[HistogramBinEntry]) {
        debug_assert_eq!(entries.len(), self.data.len());
        self.data.copy_from_slice(entries);
    }

    /// Whether the last threshold scan found any admissible split. A
    /// child's rows are a subset of its parent's, so a false here also
    /// rules out the children.
    #[inline]
    pub fn is_splittable(&self) -> bool {
        self.is_splittable
    }

    /// Force the splittable flag.
    #[inline]
    pub fn set_splittable(&mut self, value: bool) {
        self.is_splittable = value;
    }

    /// Build from a leaf's index slice, scanning the bin column.
    ///
    /// `ordered_gradients[i]` / `ordered_hessians[i]` belong to row
    /// `indices[i]`; the re-ordered copies keep the gradient reads
    /// sequential.
    pub fn construct(
        &mut self,
        bin_data: &BinData,
        indices: &[DataSize],
        ordered_gradients: &[Score],
        ordered_hessians: &[Score],
    ) {
        self.clear();
        let mut iter = bin_data.iter();
        for (i, &row) in indices.iter().enumerate() {
            let bin = iter.get(row) as usize;
            let entry = &mut self.data[bin];
            entry.sum_gradients += ordered_gradients[i] as Hist;
            entry.sum_hessians += ordered_hessians[i] as Hist;
            entry.count += 1;
        }
    }

    /// Build from a sparse feature's ordered entries for one leaf. Rows in
    /// the default bin are not stored, so bin 0 is recovered from the
    /// leaf's totals after the walk.
    pub fn construct_from_ordered(
        &mut self,
        entries: &[OrderedEntry],
        gradients: &[Score],
        hessians: &[Score],
        leaf_sum_gradients: f64,
        leaf_sum_hessians: f64,
        leaf_count: DataSize,
    ) {
        self.clear();
        for &(row, bin) in entries {
            let entry = &mut self.data[bin as usize];
            entry.sum_gradients += gradients[row as usize] as Hist;
            entry.sum_hessians += hessians[row as usize] as Hist;
            entry.count += 1;
        }
        let mut rest_gradients = leaf_sum_gradients;
        let mut rest_hessians = leaf_sum_hessians;
        let mut rest_count = leaf_count;
        for entry in &self.data[1..] {
            rest_gradients -= entry.sum_gradients;
            rest_hessians -= entry.sum_hessians;
            rest_count -= entry.count;
        }
        self.data[0] = HistogramBinEntry {
            sum_gradients: rest_gradients,
            sum_hessians: rest_hessians,
            count: rest_count,
        };
    }

    /// Per-bin subtraction: turn a parent histogram into the sibling of
    /// `other` without touching the data again.
    pub fn subtract(&mut self, other: &FeatureHistogram) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (entry, other_entry) in self.data.iter_mut().zip(other.data.iter()) {
            entry.sum_gradients -= other_entry.sum_gradients;
            entry.sum_hessians -= other_entry.sum_hessians;
            entry.count -= other_entry.count;
        }
    }

    /// Scan every candidate threshold and record the best admissible split.
    ///
    /// Gain is `GL²/(HL+λ) + GR²/(HR+λ) − G²/(H+λ)`; children below
    /// `min_data_in_leaf` rows or `min_sum_hessian` mass are rejected; on
    /// equal gain the lower bin wins.
    #[allow(clippy::too_many_arguments)]
    pub fn find_best_threshold(
        &mut self,
        sum_gradients: f64,
        sum_hessians: f64,
        num_data: DataSize,
        lambda_l2: f64,
        min_data_in_leaf: DataSize,
        min_sum_hessian: f64,
        out: &mut SplitInfo,
    ) {
        let mut best = SplitInfo::default();
        let parent_score = sum_gradients * sum_gradients / (sum_hessians + lambda_l2);

        let mut left_sum_gradient = 0.0;
        let mut left_sum_hessian = 0.0;
        let mut left_count: DataSize = 0;
        for threshold in 0..self.data.len().saturating_sub(1) {
            let entry = &self.data[threshold];
            left_sum_gradient += entry.sum_gradients;
            left_sum_hessian += entry.sum_hessians;
            left_count += entry.count;

            let right_count = num_data - left_count;
            if left_count < min_data_in_leaf || right_count < min_data_in_leaf {
                continue;
            }
            let right_sum_gradient = sum_gradients - left_sum_gradient;
            let right_sum_hessian = sum_hessians - left_sum_hessian;
            if left_sum_hessian < min_sum_hessian || right_sum_hessian < min_sum_hessian {
                continue;
            }

            let gain = left_sum_gradient * left_sum_gradient / (left_sum_hessian + lambda_l2)
                + right_sum_gradient * right_sum_gradient / (right_sum_hessian + lambda_l2)
                - parent_score;
            if gain > best.gain {
                best.threshold = threshold as BinIndex;
                best.gain = gain;
                best.left_count = left_count;
                best.right_count = right_count;
                best.left_sum_gradient = left_sum_gradient;
                best.left_sum_hessian = left_sum_hessian;
                best.right_sum_gradient = right_sum_gradient;
                best.right_sum_hessian = right_sum_hessian;
            }
        }

        if best.is_valid() {
            best.left_output = -best.left_sum_gradient / (best.left_sum_hessian + lambda_l2);
            best.right_output = -best.right_sum_gradient / (best.right_sum_hessian + lambda_l2);
        }
        self.is_splittable = best.is_valid();
        best.feature = out.feature;
        *out = best;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_rows(n: usize) -> (Vec<(DataSize, BinIndex)>, Vec<Score>, Vec<Score>) {
        let pairs = (0..n)
            .map(|i| (i as DataSize, ((i * 7 + 3) % 5) as BinIndex))
            .filter(|&(_, b)| b != 0)
            .collect();
        let gradients = (0..n).map(|i| ((i % 11) as Score) - 5.0).collect();
        let hessians = vec![1.0 as Score; n];
        (pairs, gradients, hessians)
    }

    #[test]
    fn test_dense_and_ordered_paths_agree() {
        let n = 64;
        let (pairs, gradients, hessians) = seeded_rows(n);
        let dense = BinData::from_pairs(n as DataSize, pairs.clone(), false);

        let indices: Vec<DataSize> = (0..n as DataSize).collect();
        let mut from_column = FeatureHistogram::new(5);
        from_column.construct(&dense, &indices, &gradients, &hessians);

        let sum_g: f64 = gradients.iter().map(|&g| g as f64).sum();
        let sum_h: f64 = hessians.iter().map(|&h| h as f64).sum();
        let mut from_ordered = FeatureHistogram::new(5);
        from_ordered.construct_from_ordered(
            &pairs,
            &gradients,
            &hessians,
            sum_g,
            sum_h,
            n as DataSize,
        );

        for bin in 0..5 {
            let a = from_column.data()[bin];
            let b = from_ordered.data()[bin];
            assert_eq!(a.count, b.count, "count mismatch at bin {}", bin);
            assert!((a.sum_gradients - b.sum_gradients).abs() < 1e-9);
            assert!((a.sum_hessians - b.sum_hessians).abs() < 1e-9);
        }
    }

    #[test]
    fn test_subtraction_identity() {
        let n = 80;
        let (pairs, gradients, hessians) = seeded_rows(n);
        let dense = BinData::from_pairs(n as DataSize, pairs, false);

        let all: Vec<DataSize> = (0..n as DataSize).collect();
        let (left, right) = all.split_at(30);

        let mut parent = FeatureHistogram::new(5);
        parent.construct(&dense, &all, &gradients, &hessians);

        let left_g: Vec<Score> = left.iter().map(|&i| gradients[i as usize]).collect();
        let left_h: Vec<Score> = left.iter().map(|&i| hessians[i as usize]).collect();
        let mut smaller = FeatureHistogram::new(5);
        smaller.construct(&dense, left, &left_g, &left_h);

        let right_g: Vec<Score> = right.iter().map(|&i| gradients[i as usize]).collect();
        let right_h: Vec<Score> = right.iter().map(|&i| hessians[i as usize]).collect();
        let mut fresh_larger = FeatureHistogram::new(5);
        fresh_larger.construct(&dense, right, &right_g, &right_h);

        parent.subtract(&smaller);
        for bin in 0..5 {
            let derived = parent.data()[bin];
            let fresh = fresh_larger.data()[bin];
            assert_eq!(derived.count, fresh.count);
            assert!((derived.sum_gradients - fresh.sum_gradients).abs() < 1e-9);
            assert!((derived.sum_hessians - fresh.sum_hessians).abs() < 1e-9);
        }
    }

    #[test]
    fn test_best_threshold_prefers_clean_cut() {
        // bins 0-1 carry negative gradients, bins 2-3 positive; the clean
        // cut is after bin 1
        let mut hist = FeatureHistogram::new(4);
        hist.data[0] = HistogramBinEntry {
            sum_gradients: -4.0,
            sum_hessians: 4.0,
            count: 4,
        };
        hist.data[1] = HistogramBinEntry {
            sum_gradients: -6.0,
            sum_hessians: 6.0,
            count: 6,
        };
        hist.data[2] = HistogramBinEntry {
            sum_gradients: 5.0,
            sum_hessians: 5.0,
            count: 5,
        };
        hist.data[3] = HistogramBinEntry {
            sum_gradients: 5.0,
            sum_hessians: 5.0,
            count: 5,
        };
        let mut out = SplitInfo::default();
        hist.find_best_threshold(0.0, 20.0, 20, 0.0, 1, 0.0, &mut out);
        assert!(out.is_valid());
        assert_eq!(out.threshold, 1);
        assert_eq!(out.left_count, 10);
        assert_eq!(out.right_count, 10);
        assert!((out.left_output - 1.0).abs() < 1e-12);
        assert!((out.right_output + 1.0).abs() < 1e-12);
        assert!(hist.is_splittable());
    }

    #[test]
    fn test_min_data_rejects_thresholds() {
        let mut hist = FeatureHistogram::new(3);
        hist.data[0] = HistogramBinEntry {
            sum_gradients: -1.0,
            sum_hessians: 1.0,
            count: 1,
        };
        hist.data[1] = HistogramBinEntry {
            sum_gradients: 0.5,
            sum_hessians: 9.0,
            count: 9,
        };
        hist.data[2] = HistogramBinEntry {
            sum_gradients: 0.5,
            sum_hessians: 10.0,
            count: 10,
        };
        let mut out = SplitInfo::default();
        // threshold 0 leaves one row on the left; with min_data 5 only
        // threshold 1 survives
        hist.find_best_threshold(0.0, 20.0, 20, 0.0, 5, 0.0, &mut out);
        assert!(out.is_valid());
        assert_eq!(out.threshold, 1);

        // impossible constraint marks the histogram unsplittable
        hist.find_best_threshold(0.0, 20.0, 20, 0.0, 50, 0.0, &mut out);
        assert!(!out.is_valid());
        assert!(!hist.is_splittable());
    }

    #[test]
    fn test_tie_keeps_lower_bin() {
        // symmetric layout: threshold 0 and threshold 2 yield the same
        // gain; the scan must keep threshold... both cuts split +/-
        // asymmetrically, craft equal-gain pair explicitly
        let mut hist = FeatureHistogram::new(4);
        for (bin, g) in [(0, 2.0), (1, -2.0), (2, 2.0), (3, -2.0)] {
            hist.data[bin] = HistogramBinEntry {
                sum_gradients: g,
                sum_hessians: 2.0,
                count: 2,
            };
        }
        let mut out = SplitInfo::default();
        hist.find_best_threshold(0.0, 8.0, 8, 0.0, 1, 0.0, &mut out);
        // thresholds 0 and 2 both give |GL| = 2 with the same masses
        let gain_at = |t: usize| {
            let gl: f64 = hist.data[..=t].iter().map(|e| e.sum_gradients).sum();
            let hl: f64 = hist.data[..=t].iter().map(|e| e.sum_hessians).sum();
            gl * gl / hl + gl * gl / (8.0 - hl)
        };
        assert!((gain_at(0) - gain_at(2)).abs() < 1e-12);
        assert_eq!(out.threshold, 0);
    }
}
