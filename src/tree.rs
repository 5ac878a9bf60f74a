//! The learned regression tree.
//!
//! Array-of-nodes layout: internal node `i` stores its split and two child
//! pointers, where a negative child `c` encodes leaf `!c`. Growing a tree
//! is a sequence of `split` calls, each turning one leaf into an internal
//! node and appending a new leaf.

use crate::core::types::BinIndex;
use serde::{Deserialize, Serialize};

/// A binary regression tree with at most `max_leaves` leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    num_leaves: usize,
    /// Child pointers per internal node; negative encodes `!leaf`.
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    /// Used-feature index per internal node.
    split_feature_inner: Vec<usize>,
    /// Original column index per internal node.
    split_feature: Vec<i32>,
    /// Bin threshold per internal node; `bin <= threshold` goes left.
    threshold_in_bin: Vec<BinIndex>,
    /// Real-valued threshold per internal node.
    threshold: Vec<f64>,
    split_gain: Vec<f64>,
    /// Parent internal node per leaf; -1 for an unsplit root.
    leaf_parent: Vec<i32>,
    leaf_value: Vec<f64>,
    leaf_depth: Vec<i32>,
}

impl Tree {
    /// A single-leaf tree with room to grow to `max_leaves`.
    pub fn new(max_leaves: usize) -> Self {
        let internal = max_leaves.saturating_sub(1);
        let mut tree = Tree {
            num_leaves: 1,
            left_child: Vec::with_capacity(internal),
            right_child: Vec::with_capacity(internal),
            split_feature_inner: Vec::with_capacity(internal),
            split_feature: Vec::with_capacity(internal),
            threshold_in_bin: Vec::with_capacity(internal),
            threshold: Vec::with_capacity(internal),
            split_gain: Vec::with_capacity(internal),
            leaf_parent: Vec::with_capacity(max_leaves),
            leaf_value: Vec::with_capacity(max_leaves),
            leaf_depth: Vec::with_capacity(max_leaves),
        };
        tree.leaf_parent.push(-1);
        tree.leaf_value.push(0.0);
        tree.leaf_depth.push(0);
        tree
    }

    /// Split `leaf`, returning the index of the new right leaf. The left
    /// child keeps the old leaf id.
    #[allow(clippy::too_many_arguments)]
    pub fn split(
        &mut self,
        leaf: usize,
        feature_inner: usize,
        real_feature: i32,
        threshold_bin: BinIndex,
        threshold_double: f64,
        left_value: f64,
        right_value: f64,
        gain: f64,
    ) -> usize {
        let new_node = self.left_child.len() as i32;
        let right_leaf = self.num_leaves;

        // rewire the parent pointer that used to reach `leaf`
        let parent = self.leaf_parent[leaf];
        if parent >= 0 {
            let p = parent as usize;
            if self.left_child[p] == !(leaf as i32) {
                self.left_child[p] = new_node;
            } else {
                self.right_child[p] = new_node;
            }
        }

        self.left_child.push(!(leaf as i32));
        self.right_child.push(!(right_leaf as i32));
        self.split_feature_inner.push(feature_inner);
        self.split_feature.push(real_feature);
        self.threshold_in_bin.push(threshold_bin);
        self.threshold.push(threshold_double);
        self.split_gain.push(gain);

        self.leaf_parent[leaf] = new_node;
        self.leaf_parent.push(new_node);
        self.leaf_value[leaf] = left_value;
        self.leaf_value.push(right_value);
        let depth = self.leaf_depth[leaf] + 1;
        self.leaf_depth[leaf] = depth;
        self.leaf_depth.push(depth);

        self.num_leaves += 1;
        right_leaf
    }

    /// Current number of leaves.
    #[inline]
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Depth of a leaf in edges from the root.
    #[inline]
    pub fn leaf_depth(&self, leaf: usize) -> i32 {
        self.leaf_depth[leaf]
    }

    /// Output value of a leaf.
    #[inline]
    pub fn leaf_value(&self, leaf: usize) -> f64 {
        self.leaf_value[leaf]
    }

    /// Split gain of an internal node.
    pub fn split_gain(&self, node: usize) -> f64 {
        self.split_gain[node]
    }

    /// Original column index split at an internal node.
    pub fn split_feature(&self, node: usize) -> i32 {
        self.split_feature[node]
    }

    /// Raw score for one row, with `features[column]` indexed by the
    /// original columns.
    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.num_leaves == 1 {
            return self.leaf_value[0];
        }
        let mut node = 0i32;
        loop {
            let n = node as usize;
            let value = features
                .get(self.split_feature[n] as usize)
                .copied()
                .unwrap_or(0.0);
            node = if value <= self.threshold[n] {
                self.left_child[n]
            } else {
                self.right_child[n]
            };
            if node < 0 {
                return self.leaf_value[!node as usize];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_leaf_tree() {
        let tree = Tree::new(31);
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.leaf_depth(0), 0);
        assert_eq!(tree.predict(&[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_split_bookkeeping() {
        let mut tree = Tree::new(4);
        let right = tree.split(0, 0, 0, 3, 0.5, -1.0, 1.0, 2.5);
        assert_eq!(right, 1);
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.leaf_depth(0), 1);
        assert_eq!(tree.leaf_depth(1), 1);
        assert_eq!(tree.leaf_value(0), -1.0);
        assert_eq!(tree.leaf_value(1), 1.0);
        assert_eq!(tree.split_gain(0), 2.5);

        // split the right leaf; depths deepen only under it
        let right2 = tree.split(1, 1, 1, 7, 3.0, 0.5, 2.0, 1.0);
        assert_eq!(right2, 2);
        assert_eq!(tree.leaf_depth(0), 1);
        assert_eq!(tree.leaf_depth(1), 2);
        assert_eq!(tree.leaf_depth(2), 2);
    }

    #[test]
    fn test_predict_routes_through_nodes() {
        let mut tree = Tree::new(4);
        tree.split(0, 0, 0, 3, 0.5, -1.0, 1.0, 1.0);
        tree.split(1, 1, 1, 7, 3.0, 0.5, 2.0, 1.0);
        // feature0 <= 0.5 -> leaf 0
        assert_eq!(tree.predict(&[0.0, 9.9]), -1.0);
        // feature0 > 0.5, feature1 <= 3.0 -> leaf 1
        assert_eq!(tree.predict(&[1.0, 2.0]), 0.5);
        // feature0 > 0.5, feature1 > 3.0 -> leaf 2
        assert_eq!(tree.predict(&[1.0, 4.0]), 2.0);
    }

    #[test]
    fn test_trees_compare_equal() {
        let build = || {
            let mut tree = Tree::new(8);
            tree.split(0, 0, 2, 1, 0.25, -0.5, 0.5, 3.0);
            tree.split(0, 1, 3, 2, 1.5, -1.0, 0.0, 1.0);
            tree
        };
        assert_eq!(build(), build());
    }
}
