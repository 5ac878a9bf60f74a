//! Column-oriented storage of bin codes.
//!
//! One [`BinData`] holds the bin codes of a single feature for every row,
//! either as a dense byte column or as row-sorted `(row, bin)` pairs when
//! most rows sit in the default bin. Rows absent from the sparse form are
//! implicitly bin 0.

use crate::core::error::{HistGbmError, Result};
use crate::core::types::{BinIndex, DataSize, SPARSE_ZERO_RATE};

/// Finished bin storage for one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum BinData {
    /// One byte per row.
    Dense(DenseBin),
    /// Row-sorted pairs for rows outside the default bin.
    Sparse(SparseBin),
}

/// Dense bin column.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseBin {
    data: Vec<u8>,
}

/// Sparse bin column: parallel row/bin arrays in ascending row order.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBin {
    num_data: DataSize,
    rows: Vec<DataSize>,
    bins: Vec<u8>,
}

impl BinData {
    /// Build storage from merged `(row, bin)` pairs of non-default rows.
    ///
    /// `pairs` must be row-sorted. The column goes sparse when the zero
    /// fraction exceeds [`SPARSE_ZERO_RATE`] and sparse storage is enabled.
    pub fn from_pairs(
        num_data: DataSize,
        pairs: Vec<(DataSize, BinIndex)>,
        is_enable_sparse: bool,
    ) -> Self {
        let zero_rate = 1.0 - pairs.len() as f64 / num_data.max(1) as f64;
        if is_enable_sparse && zero_rate > SPARSE_ZERO_RATE {
            let mut rows = Vec::with_capacity(pairs.len());
            let mut bins = Vec::with_capacity(pairs.len());
            for (row, bin) in pairs {
                rows.push(row);
                bins.push(bin as u8);
            }
            BinData::Sparse(SparseBin {
                num_data,
                rows,
                bins,
            })
        } else {
            let mut data = vec![0u8; num_data as usize];
            for (row, bin) in pairs {
                data[row as usize] = bin as u8;
            }
            BinData::Dense(DenseBin { data })
        }
    }

    /// Total number of rows.
    pub fn num_data(&self) -> DataSize {
        match self {
            BinData::Dense(d) => d.data.len() as DataSize,
            BinData::Sparse(s) => s.num_data,
        }
    }

    /// True for the sparse representation.
    pub fn is_sparse(&self) -> bool {
        matches!(self, BinData::Sparse(_))
    }

    /// Bin code of one row. O(1) dense, O(log nnz) sparse.
    pub fn bin_at(&self, row: DataSize) -> BinIndex {
        match self {
            BinData::Dense(d) => d.data[row as usize] as BinIndex,
            BinData::Sparse(s) => match s.rows.binary_search(&row) {
                Ok(pos) => s.bins[pos] as BinIndex,
                Err(_) => 0,
            },
        }
    }

    /// Cursor for reading bins of an ascending row sequence; amortized O(1)
    /// per lookup even for sparse storage.
    pub fn iter(&self) -> BinDataIter<'_> {
        BinDataIter { data: self, pos: 0 }
    }

    /// Non-default `(row, bin)` pairs of a sparse column, in row order.
    /// `None` for dense storage; dense features iterate the full column
    /// faster than any re-ordered view.
    pub fn ordered_pairs(&self) -> Option<Vec<(DataSize, BinIndex)>> {
        match self {
            BinData::Dense(_) => None,
            BinData::Sparse(s) => Some(
                s.rows
                    .iter()
                    .zip(s.bins.iter())
                    .map(|(&r, &b)| (r, b as BinIndex))
                    .collect(),
            ),
        }
    }

    /// Stable partition of a leaf's index slice by `bin <= threshold`.
    ///
    /// `indices` must be ascending. Matching rows are appended to `lte`,
    /// the rest to `gt`; relative order is preserved on both sides.
    pub fn split(
        &self,
        threshold: BinIndex,
        indices: &[DataSize],
        lte: &mut Vec<DataSize>,
        gt: &mut Vec<DataSize>,
    ) {
        let mut iter = self.iter();
        if let Some(&first) = indices.first() {
            iter.reset(first);
        }
        for &row in indices {
            if iter.get(row) <= threshold {
                lte.push(row);
            } else {
                gt.push(row);
            }
        }
    }

    /// Serialize to bytes for the binary dataset file.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            BinData::Dense(d) => {
                let mut out = Vec::with_capacity(5 + d.data.len());
                out.push(0u8);
                out.extend_from_slice(&(d.data.len() as u32).to_le_bytes());
                out.extend_from_slice(&d.data);
                out
            }
            BinData::Sparse(s) => {
                let mut out = Vec::with_capacity(9 + 5 * s.rows.len());
                out.push(1u8);
                out.extend_from_slice(&(s.num_data as u32).to_le_bytes());
                out.extend_from_slice(&(s.rows.len() as u32).to_le_bytes());
                for &row in &s.rows {
                    out.extend_from_slice(&row.to_le_bytes());
                }
                out.extend_from_slice(&s.bins);
                out
            }
        }
    }

    /// Deserialize from [`BinData::to_bytes`] output.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 5 {
            return Err(HistGbmError::io_format("bin data record truncated"));
        }
        let tag = buffer[0];
        let num_data = u32::from_le_bytes(buffer[1..5].try_into().unwrap()) as usize;
        match tag {
            0 => {
                if buffer.len() < 5 + num_data {
                    return Err(HistGbmError::io_format(format!(
                        "dense bin data truncated: {} rows declared",
                        num_data
                    )));
                }
                Ok(BinData::Dense(DenseBin {
                    data: buffer[5..5 + num_data].to_vec(),
                }))
            }
            1 => {
                if buffer.len() < 9 {
                    return Err(HistGbmError::io_format("sparse bin data truncated"));
                }
                let nnz = u32::from_le_bytes(buffer[5..9].try_into().unwrap()) as usize;
                if buffer.len() < 9 + 5 * nnz {
                    return Err(HistGbmError::io_format(format!(
                        "sparse bin data truncated: {} entries declared",
                        nnz
                    )));
                }
                let mut rows = Vec::with_capacity(nnz);
                for i in 0..nnz {
                    let at = 9 + 4 * i;
                    rows.push(DataSize::from_le_bytes(
                        buffer[at..at + 4].try_into().unwrap(),
                    ));
                }
                let bins = buffer[9 + 4 * nnz..9 + 5 * nnz].to_vec();
                Ok(BinData::Sparse(SparseBin {
                    num_data: num_data as DataSize,
                    rows,
                    bins,
                }))
            }
            other => Err(HistGbmError::io_format(format!(
                "unknown bin data tag {}",
                other
            ))),
        }
    }
}

/// Forward cursor over one bin column.
#[derive(Debug)]
pub struct BinDataIter<'a> {
    data: &'a BinData,
    pos: usize,
}

impl<'a> BinDataIter<'a> {
    /// Bin code of `row`. Rows must be queried in ascending order since the
    /// last [`BinDataIter::reset`].
    #[inline]
    pub fn get(&mut self, row: DataSize) -> BinIndex {
        match self.data {
            BinData::Dense(d) => d.data[row as usize] as BinIndex,
            BinData::Sparse(s) => {
                while self.pos < s.rows.len() && s.rows[self.pos] < row {
                    self.pos += 1;
                }
                if self.pos < s.rows.len() && s.rows[self.pos] == row {
                    s.bins[self.pos] as BinIndex
                } else {
                    0
                }
            }
        }
    }

    /// Reposition the cursor at the first stored row `>= row`.
    pub fn reset(&mut self, row: DataSize) {
        if let BinData::Sparse(s) = self.data {
            self.pos = s.rows.partition_point(|&r| r < row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_pairs() -> Vec<(DataSize, BinIndex)> {
        (0..100).map(|i| (i, (i % 5 + 1) as BinIndex)).collect()
    }

    fn sparse_pairs() -> Vec<(DataSize, BinIndex)> {
        (0..100)
            .filter(|i| i % 10 == 3)
            .map(|i| (i, (i % 3 + 1) as BinIndex))
            .collect()
    }

    #[test]
    fn test_density_decision() {
        let dense = BinData::from_pairs(100, dense_pairs(), true);
        assert!(!dense.is_sparse());
        let sparse = BinData::from_pairs(100, sparse_pairs(), true);
        assert!(sparse.is_sparse());
        let forced_dense = BinData::from_pairs(100, sparse_pairs(), false);
        assert!(!forced_dense.is_sparse());
    }

    #[test]
    fn test_bin_at_matches_both_forms() {
        let sparse = BinData::from_pairs(100, sparse_pairs(), true);
        let dense = BinData::from_pairs(100, sparse_pairs(), false);
        for row in 0..100 {
            assert_eq!(sparse.bin_at(row), dense.bin_at(row));
        }
        // rows without an entry are the default bin
        assert_eq!(sparse.bin_at(0), 0);
        assert_eq!(sparse.bin_at(3), 1);
    }

    #[test]
    fn test_iterator_cursor() {
        let sparse = BinData::from_pairs(100, sparse_pairs(), true);
        let mut iter = sparse.iter();
        for row in 0..100 {
            assert_eq!(iter.get(row), sparse.bin_at(row));
        }
        iter.reset(50);
        assert_eq!(iter.get(53), sparse.bin_at(53));
    }

    #[test]
    fn test_split_preserves_order() {
        let data = BinData::from_pairs(100, dense_pairs(), true);
        let indices: Vec<DataSize> = (0..100).collect();
        let mut lte = Vec::new();
        let mut gt = Vec::new();
        data.split(2, &indices, &mut lte, &mut gt);
        assert_eq!(lte.len() + gt.len(), 100);
        for w in lte.windows(2) {
            assert!(w[0] < w[1]);
        }
        for w in gt.windows(2) {
            assert!(w[0] < w[1]);
        }
        for &row in &lte {
            assert!(data.bin_at(row) <= 2);
        }
        for &row in &gt {
            assert!(data.bin_at(row) > 2);
        }
    }

    #[test]
    fn test_bytes_round_trip() {
        for pairs in [dense_pairs(), sparse_pairs()] {
            let data = BinData::from_pairs(100, pairs, true);
            let bytes = data.to_bytes();
            let restored = BinData::from_bytes(&bytes).unwrap();
            assert_eq!(data, restored);
        }
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(BinData::from_bytes(&[9, 0, 0, 0, 0]).is_err());
        assert!(BinData::from_bytes(&[0, 255, 0, 0, 0]).is_err());
    }
}
