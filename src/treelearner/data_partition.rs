//! Row-to-leaf assignment during tree growth.
//!
//! The partition keeps one permutation of the active row indices; every
//! leaf owns a contiguous range of it. A split reorders the parent's range
//! in place so the left child keeps the prefix and the right child takes
//! the suffix, preserving relative row order on both sides so that
//! repeated scans stay deterministic.

use crate::core::types::{BinIndex, DataSize, PARALLEL_THRESHOLD};
use crate::dataset::bin_data::BinData;
use rayon::prelude::*;

/// Rows per parallel tile in the split scatter.
const SPLIT_TILE: usize = 2048;

/// Maps each leaf to a contiguous range of a row permutation.
#[derive(Debug, Clone)]
pub struct DataPartition {
    num_data: DataSize,
    num_leaves: usize,
    leaf_begin: Vec<DataSize>,
    leaf_count: Vec<DataSize>,
    indices: Vec<DataSize>,
    /// Bagged subset; `None` trains on every row.
    used_indices: Option<Vec<DataSize>>,
}

impl DataPartition {
    /// Create for `num_data` rows and up to `num_leaves` leaves.
    pub fn new(num_data: DataSize, num_leaves: usize) -> Self {
        DataPartition {
            num_data,
            num_leaves,
            leaf_begin: vec![0; num_leaves],
            leaf_count: vec![0; num_leaves],
            indices: vec![0; num_data as usize],
            used_indices: None,
        }
    }

    /// Restrict the next trees to a bagged subset. Indices must be
    /// ascending.
    pub fn set_used_indices(&mut self, used: Vec<DataSize>) {
        self.used_indices = Some(used);
    }

    /// Train on all rows again.
    pub fn clear_used_indices(&mut self) {
        self.used_indices = None;
    }

    /// Put every active row into leaf 0.
    pub fn init(&mut self) {
        self.leaf_begin.fill(0);
        self.leaf_count.fill(0);
        match &self.used_indices {
            None => {
                self.leaf_count[0] = self.num_data;
                if self.num_data >= PARALLEL_THRESHOLD {
                    self.indices
                        .par_iter_mut()
                        .enumerate()
                        .for_each(|(i, idx)| *idx = i as DataSize);
                } else {
                    for i in 0..self.num_data {
                        self.indices[i as usize] = i;
                    }
                }
            }
            Some(used) => {
                self.leaf_count[0] = used.len() as DataSize;
                self.indices[..used.len()].copy_from_slice(used);
            }
        }
    }

    /// The full index permutation.
    pub fn indices(&self) -> &[DataSize] {
        &self.indices
    }

    /// First position of `leaf`'s range.
    #[inline]
    pub fn leaf_begin(&self, leaf: usize) -> DataSize {
        self.leaf_begin[leaf]
    }

    /// Number of rows in `leaf`.
    #[inline]
    pub fn leaf_count(&self, leaf: usize) -> DataSize {
        self.leaf_count[leaf]
    }

    /// Row indices of `leaf`.
    pub fn leaf_indices(&self, leaf: usize) -> &[DataSize] {
        let begin = self.leaf_begin[leaf] as usize;
        &self.indices[begin..begin + self.leaf_count[leaf] as usize]
    }

    /// Rows active in this tree (all rows, or the bagged subset).
    pub fn used_count(&self) -> DataSize {
        self.used_indices
            .as_ref()
            .map(|u| u.len() as DataSize)
            .unwrap_or(self.num_data)
    }

    /// Number of leaves this partition can track.
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Reorder `leaf`'s range so rows with `bin <= threshold` keep the
    /// prefix (staying in `leaf`) and the rest become `right_leaf`'s range.
    ///
    /// Two passes: parallel tiles partition into local buffers, then a
    /// sequential scatter stitches them back in tile order, which keeps
    /// the row order within each side stable.
    pub fn split(
        &mut self,
        leaf: usize,
        bin_data: &BinData,
        threshold: BinIndex,
        right_leaf: usize,
    ) -> DataSize {
        let begin = self.leaf_begin[leaf] as usize;
        let count = self.leaf_count[leaf] as usize;
        let slice = &mut self.indices[begin..begin + count];

        let tiles: Vec<(Vec<DataSize>, Vec<DataSize>)> = if count >= PARALLEL_THRESHOLD as usize {
            slice
                .par_chunks(SPLIT_TILE)
                .map(|chunk| {
                    let mut lte = Vec::with_capacity(chunk.len());
                    let mut gt = Vec::new();
                    bin_data.split(threshold, chunk, &mut lte, &mut gt);
                    (lte, gt)
                })
                .collect()
        } else {
            slice
                .chunks(SPLIT_TILE)
                .map(|chunk| {
                    let mut lte = Vec::with_capacity(chunk.len());
                    let mut gt = Vec::new();
                    bin_data.split(threshold, chunk, &mut lte, &mut gt);
                    (lte, gt)
                })
                .collect()
        };

        let mut at = 0usize;
        for (lte, _) in &tiles {
            slice[at..at + lte.len()].copy_from_slice(lte);
            at += lte.len();
        }
        let left_count = at as DataSize;
        for (_, gt) in &tiles {
            slice[at..at + gt.len()].copy_from_slice(gt);
            at += gt.len();
        }

        self.leaf_count[leaf] = left_count;
        self.leaf_begin[right_leaf] = begin as DataSize + left_count;
        self.leaf_count[right_leaf] = count as DataSize - left_count;
        left_count
    }
}
