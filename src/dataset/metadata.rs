//! Dataset metadata: labels, sample weights, query boundaries, init scores.

use crate::core::error::{HistGbmError, Result};
use crate::core::types::{DataSize, Label};
use serde::{Deserialize, Serialize};

/// Per-row side information attached to a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    num_data: DataSize,
    labels: Vec<Label>,
    weights: Option<Vec<Label>>,
    /// `boundaries[q]..boundaries[q + 1]` is query `q`'s row range.
    query_boundaries: Option<Vec<DataSize>>,
    init_scores: Option<Vec<f64>>,
    /// Raw per-row query ids collected during extraction; folded into
    /// boundaries by `finish_load`.
    #[serde(skip)]
    raw_query_ids: Vec<i32>,
}

impl Metadata {
    /// Allocate for `num_data` rows.
    pub fn new(num_data: DataSize, has_weight: bool, has_query: bool) -> Self {
        Metadata {
            num_data,
            labels: vec![0.0; num_data as usize],
            weights: has_weight.then(|| vec![0.0; num_data as usize]),
            query_boundaries: None,
            init_scores: None,
            raw_query_ids: if has_query {
                vec![0; num_data as usize]
            } else {
                Vec::new()
            },
        }
    }

    /// Set one row's label.
    #[inline]
    pub fn set_label_at(&mut self, row: DataSize, label: Label) {
        self.labels[row as usize] = label;
    }

    /// Set one row's weight.
    #[inline]
    pub fn set_weight_at(&mut self, row: DataSize, weight: Label) {
        if let Some(w) = self.weights.as_mut() {
            w[row as usize] = weight;
        }
    }

    /// Set one row's query id.
    #[inline]
    pub fn set_query_at(&mut self, row: DataSize, qid: i32) {
        if !self.raw_query_ids.is_empty() {
            self.raw_query_ids[row as usize] = qid;
        }
    }

    /// Attach externally computed initial scores.
    pub fn set_init_scores(&mut self, scores: Vec<f64>) {
        self.init_scores = Some(scores);
    }

    /// Fold raw query ids into boundaries. Rows of one query must be
    /// contiguous; each run of equal ids becomes one query.
    pub fn finish_load(&mut self) -> Result<()> {
        if self.raw_query_ids.is_empty() {
            return Ok(());
        }
        let mut boundaries = vec![0 as DataSize];
        for i in 1..self.raw_query_ids.len() {
            if self.raw_query_ids[i] != self.raw_query_ids[i - 1] {
                boundaries.push(i as DataSize);
            }
        }
        boundaries.push(self.num_data);
        self.query_boundaries = Some(boundaries);
        self.raw_query_ids = Vec::new();
        Ok(())
    }

    /// Validate sizes after construction, or re-partition by the locally
    /// used rows when a worker kept only part of the data.
    pub fn check_or_partition(
        &mut self,
        global_num_data: DataSize,
        used_indices: &[DataSize],
    ) -> Result<()> {
        if used_indices.is_empty() {
            if self.labels.len() as DataSize != global_num_data {
                return Err(HistGbmError::consistency(format!(
                    "label count {} does not match row count {}",
                    self.labels.len(),
                    global_num_data
                )));
            }
        } else {
            if self.labels.len() as DataSize != self.num_data {
                let labels = std::mem::take(&mut self.labels);
                self.labels = used_indices
                    .iter()
                    .map(|&i| labels[i as usize])
                    .collect();
                if let Some(w) = self.weights.take() {
                    self.weights =
                        Some(used_indices.iter().map(|&i| w[i as usize]).collect());
                }
            }
        }
        if let Some(boundaries) = &self.query_boundaries {
            let last = *boundaries.last().unwrap_or(&0);
            if last != self.num_data {
                return Err(HistGbmError::consistency(format!(
                    "query boundaries cover {} rows, dataset has {}",
                    last, self.num_data
                )));
            }
        }
        Ok(())
    }

    /// Number of rows.
    pub fn num_data(&self) -> DataSize {
        self.num_data
    }

    /// Labels, one per row.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Optional sample weights.
    pub fn weights(&self) -> Option<&[Label]> {
        self.weights.as_deref()
    }

    /// Optional query boundaries.
    pub fn query_boundaries(&self) -> Option<&[DataSize]> {
        self.query_boundaries.as_deref()
    }

    /// Number of queries, 0 when unset.
    pub fn num_queries(&self) -> DataSize {
        self.query_boundaries
            .as_ref()
            .map(|b| b.len() as DataSize - 1)
            .unwrap_or(0)
    }

    /// Optional initial scores.
    pub fn init_scores(&self) -> Option<&[f64]> {
        self.init_scores.as_deref()
    }

    /// Serialize for the binary dataset file's metadata section.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| HistGbmError::io_format(format!("metadata encode failed: {}", e)))
    }

    /// Deserialize the binary dataset file's metadata section.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        bincode::deserialize(buffer)
            .map_err(|e| HistGbmError::io_format(format!("metadata decode failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_and_weights() {
        let mut meta = Metadata::new(4, true, false);
        for i in 0..4 {
            meta.set_label_at(i, i as Label);
            meta.set_weight_at(i, 2.0 * i as Label);
        }
        assert_eq!(meta.labels(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(meta.weights().unwrap(), &[0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_query_boundaries_from_runs() {
        let mut meta = Metadata::new(6, false, true);
        for (row, qid) in [(0, 0), (1, 0), (2, 1), (3, 1), (4, 1), (5, 2)] {
            meta.set_query_at(row, qid);
        }
        meta.finish_load().unwrap();
        assert_eq!(meta.query_boundaries().unwrap(), &[0, 2, 5, 6]);
        assert_eq!(meta.num_queries(), 3);
    }

    #[test]
    fn test_check_rejects_size_mismatch() {
        let mut meta = Metadata::new(4, false, false);
        assert!(meta.check_or_partition(5, &[]).is_err());
        assert!(meta.check_or_partition(4, &[]).is_ok());
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut meta = Metadata::new(3, true, true);
        for i in 0..3 {
            meta.set_label_at(i, i as Label);
            meta.set_query_at(i, i / 2);
        }
        meta.finish_load().unwrap();
        let restored = Metadata::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(meta, restored);
    }
}
