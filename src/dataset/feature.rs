//! One training feature: its bin mapper plus bin storage.
//!
//! During extraction a feature accepts `push` calls into per-task buffers;
//! `finish_load` merges them into the final row-ordered column and fixes
//! the dense/sparse representation.

use crate::core::error::{HistGbmError, Result};
use crate::core::types::{BinIndex, DataSize};
use crate::dataset::bin_data::BinData;
use crate::dataset::bin_mapper::BinMapper;
use crate::dataset::ordered_bin::OrderedBin;

/// A feature column under construction or finished.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Index of this feature in the original (pre-filter) column set.
    feature_index: i32,
    bin_mapper: BinMapper,
    num_data: DataSize,
    is_enable_sparse: bool,
    push_buffers: Vec<Vec<(DataSize, BinIndex)>>,
    bin_data: Option<BinData>,
}

impl Feature {
    /// Create an empty feature ready for pushing.
    pub fn new(
        feature_index: i32,
        bin_mapper: BinMapper,
        num_data: DataSize,
        is_enable_sparse: bool,
        num_push_tasks: usize,
    ) -> Self {
        Feature {
            feature_index,
            bin_mapper,
            num_data,
            is_enable_sparse,
            push_buffers: vec![Vec::new(); num_push_tasks.max(1)],
            bin_data: None,
        }
    }

    /// Rebuild a feature from loaded parts.
    pub fn from_parts(feature_index: i32, bin_mapper: BinMapper, bin_data: BinData) -> Self {
        let num_data = bin_data.num_data();
        Feature {
            feature_index,
            bin_mapper,
            num_data,
            is_enable_sparse: bin_data.is_sparse(),
            push_buffers: Vec::new(),
            bin_data: Some(bin_data),
        }
    }

    /// Record one raw value for a row. Default-bin values are left
    /// implicit; the buffers only hold rows that bin away from zero.
    #[inline]
    pub fn push(&mut self, task_id: usize, row: DataSize, value: f64) {
        let bin = self.bin_mapper.value_to_bin(value);
        if bin != 0 {
            self.push_buffers[task_id].push((row, bin));
        }
    }

    /// Merge the per-task buffers into final storage.
    pub fn finish_load(&mut self) {
        let mut pairs: Vec<(DataSize, BinIndex)> = self.push_buffers.concat();
        self.push_buffers = Vec::new();
        pairs.sort_unstable_by_key(|&(row, _)| row);
        self.bin_data = Some(BinData::from_pairs(
            self.num_data,
            pairs,
            self.is_enable_sparse,
        ));
    }

    /// Original column index.
    #[inline]
    pub fn feature_index(&self) -> i32 {
        self.feature_index
    }

    /// Number of bins of this feature.
    #[inline]
    pub fn num_bin(&self) -> u32 {
        self.bin_mapper.num_bin()
    }

    /// The bin mapper.
    pub fn bin_mapper(&self) -> &BinMapper {
        &self.bin_mapper
    }

    /// Finished bin storage. Panics if called before `finish_load`.
    pub fn bin_data(&self) -> &BinData {
        self.bin_data
            .as_ref()
            .expect("feature storage accessed before finish_load")
    }

    /// Bin code of one row.
    #[inline]
    pub fn bin_at(&self, row: DataSize) -> BinIndex {
        self.bin_data().bin_at(row)
    }

    /// Build the per-leaf ordered view for sparse storage; dense features
    /// return `None` and are scanned in place.
    pub fn create_ordered_bin(&self) -> Option<OrderedBin> {
        self.bin_data().ordered_pairs().map(OrderedBin::new)
    }

    /// Serialize mapper + storage for the binary dataset file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mapper_len = 5 + 8 * (self.bin_mapper.num_bin() as usize - 1);
        let mut mapper_buf = vec![0u8; mapper_len];
        self.bin_mapper.copy_to(&mut mapper_buf)?;

        let data_buf = self.bin_data().to_bytes();
        let mut out = Vec::with_capacity(8 + mapper_len + data_buf.len());
        out.extend_from_slice(&(self.feature_index as u32).to_le_bytes());
        out.extend_from_slice(&(mapper_len as u32).to_le_bytes());
        out.extend_from_slice(&mapper_buf);
        out.extend_from_slice(&data_buf);
        Ok(out)
    }

    /// Deserialize from [`Feature::to_bytes`] output.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 8 {
            return Err(HistGbmError::io_format("feature record truncated"));
        }
        let feature_index = u32::from_le_bytes(buffer[0..4].try_into().unwrap()) as i32;
        let mapper_len = u32::from_le_bytes(buffer[4..8].try_into().unwrap()) as usize;
        if buffer.len() < 8 + mapper_len {
            return Err(HistGbmError::io_format(
                "feature record truncated inside bin mapper",
            ));
        }
        let bin_mapper = BinMapper::copy_from(&buffer[8..8 + mapper_len])?;
        let bin_data = BinData::from_bytes(&buffer[8 + mapper_len..])?;
        Ok(Feature::from_parts(feature_index, bin_mapper, bin_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_feature(values: &[f64]) -> Feature {
        let mapper = BinMapper::find_bin(values, 255);
        let mut feature = Feature::new(0, mapper, values.len() as DataSize, true, 2);
        for (row, &v) in values.iter().enumerate() {
            feature.push(row % 2, row as DataSize, v);
        }
        feature.finish_load();
        feature
    }

    #[test]
    fn test_push_and_query() {
        let values = vec![0.0, 1.0, 2.0, 0.0, 1.0, 3.0, 0.0, 0.0];
        let feature = make_feature(&values);
        for (row, &v) in values.iter().enumerate() {
            assert_eq!(
                feature.bin_at(row as DataSize),
                feature.bin_mapper().value_to_bin(v)
            );
        }
    }

    #[test]
    fn test_multi_task_buffers_merge_in_row_order() {
        // even rows pushed on task 0, odd rows on task 1
        let values: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
        let feature = make_feature(&values);
        for (row, &v) in values.iter().enumerate() {
            assert_eq!(
                feature.bin_at(row as DataSize),
                feature.bin_mapper().value_to_bin(v)
            );
        }
    }

    #[test]
    fn test_sparse_feature_gets_ordered_bin() {
        let mut values = vec![0.0f64; 100];
        values[7] = 1.0;
        values[42] = 2.0;
        values[77] = 1.0;
        let feature = make_feature(&values);
        assert!(feature.bin_data().is_sparse());
        let ob = feature.create_ordered_bin();
        assert!(ob.is_some());

        let dense_values: Vec<f64> = (0..100).map(|i| (i % 5) as f64).collect();
        let dense = make_feature(&dense_values);
        assert!(dense.create_ordered_bin().is_none());
    }

    #[test]
    fn test_feature_bytes_round_trip() {
        let values: Vec<f64> = (0..100).map(|i| (i % 9) as f64).collect();
        let feature = make_feature(&values);
        let bytes = feature.to_bytes().unwrap();
        let restored = Feature::from_bytes(&bytes).unwrap();
        assert_eq!(restored.feature_index(), feature.feature_index());
        assert_eq!(restored.num_bin(), feature.num_bin());
        for row in 0..100 {
            assert_eq!(restored.bin_at(row), feature.bin_at(row));
        }
    }
}
