//! Per-feature discretizer.
//!
//! A [`BinMapper`] learns bin boundaries from a sample of one feature's
//! values and afterwards maps floats to small integer bin codes. Bin 0 is
//! the distinguished default bin: feature value zero always maps there, so
//! sparse storage can leave zero rows implicit.

use crate::core::error::{HistGbmError, Result};
use crate::core::types::BinIndex;

/// Maps one feature's continuous values onto `[0, num_bin)`.
///
/// The mapping is `argmin { k : value <= upper[k] }` over the learned
/// boundaries, falling through to the last bin, with the zero default
/// pinned to bin 0.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    /// Number of bins; 1 marks a trivial feature.
    num_bin: u32,
    /// Upper boundary of each bin except the last (`num_bin - 1` entries,
    /// strictly increasing, finite).
    bin_upper_bound: Vec<f64>,
    /// True when the sample held fewer than two distinct values.
    is_trivial: bool,
}

impl BinMapper {
    /// Learn bin boundaries from a sample of values.
    ///
    /// With at most `max_bin` distinct values every distinct value gets its
    /// own bin, with boundaries at midpoints between neighbors. Otherwise
    /// bins are closed greedily once they hold `ceil(n / max_bin)` samples;
    /// repeated values never split across a boundary.
    pub fn find_bin(values: &[f64], max_bin: u32) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        // collapse to (distinct value, count)
        let mut distinct: Vec<(f64, usize)> = Vec::new();
        for &v in &sorted {
            match distinct.last_mut() {
                Some((last, cnt)) if *last == v => *cnt += 1,
                _ => distinct.push((v, 1)),
            }
        }

        if distinct.len() < 2 {
            return BinMapper {
                num_bin: 1,
                bin_upper_bound: Vec::new(),
                is_trivial: true,
            };
        }

        let mut bin_upper_bound = Vec::new();
        if distinct.len() as u32 <= max_bin {
            for pair in distinct.windows(2) {
                bin_upper_bound.push((pair[0].0 + pair[1].0) / 2.0);
            }
        } else {
            let total = sorted.len();
            let per_bin = (total + max_bin as usize - 1) / max_bin as usize;
            let mut acc = 0usize;
            for i in 0..distinct.len() {
                acc += distinct[i].1;
                if acc >= per_bin && i + 1 < distinct.len() {
                    bin_upper_bound.push((distinct[i].0 + distinct[i + 1].0) / 2.0);
                    acc = 0;
                }
            }
        }

        BinMapper {
            num_bin: bin_upper_bound.len() as u32 + 1,
            bin_upper_bound,
            is_trivial: false,
        }
    }

    /// Number of bins.
    #[inline]
    pub fn num_bin(&self) -> u32 {
        self.num_bin
    }

    /// True when this feature carries no information and should be dropped.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.is_trivial
    }

    /// Learned boundaries.
    pub fn bin_upper_bounds(&self) -> &[f64] {
        &self.bin_upper_bound
    }

    /// Map a feature value to its bin code.
    #[inline]
    pub fn value_to_bin(&self, value: f64) -> BinIndex {
        if value == 0.0 {
            return 0;
        }
        // lowest k with value <= upper[k]; past every boundary -> last bin
        let mut lo = 0usize;
        let mut hi = self.bin_upper_bound.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if value <= self.bin_upper_bound[mid] {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo as BinIndex
    }

    /// Real-valued threshold represented by a bin threshold. Split
    /// thresholds never name the last bin, so the boundary always exists.
    #[inline]
    pub fn bin_to_value(&self, bin: BinIndex) -> f64 {
        self.bin_upper_bound
            .get(bin as usize)
            .copied()
            .unwrap_or(f64::MAX)
    }

    /// Serialized record size for any mapper learned under `max_bin`. The
    /// size is a function of `max_bin` alone so that the all-gather of
    /// mappers across workers can use uniform strides.
    pub fn size_for(max_bin: u32) -> usize {
        // num_bin (u32) + is_trivial (u8) + padded boundary table
        4 + 1 + 8 * (max_bin as usize - 1)
    }

    /// Serialize into a fixed-size record. `buffer` must hold at least
    /// [`BinMapper::size_for`] bytes for the `max_bin` in force.
    pub fn copy_to(&self, buffer: &mut [u8]) -> Result<()> {
        let need = 5 + 8 * self.bin_upper_bound.len();
        if buffer.len() < need {
            return Err(HistGbmError::io_format(format!(
                "bin mapper record needs {} bytes, buffer holds {}",
                need,
                buffer.len()
            )));
        }
        buffer[0..4].copy_from_slice(&self.num_bin.to_le_bytes());
        buffer[4] = self.is_trivial as u8;
        for (i, bound) in self.bin_upper_bound.iter().enumerate() {
            let at = 5 + 8 * i;
            buffer[at..at + 8].copy_from_slice(&bound.to_le_bytes());
        }
        Ok(())
    }

    /// Deserialize from a record produced by [`BinMapper::copy_to`].
    pub fn copy_from(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 5 {
            return Err(HistGbmError::io_format(
                "bin mapper record truncated before header",
            ));
        }
        let num_bin = u32::from_le_bytes(buffer[0..4].try_into().unwrap());
        let is_trivial = buffer[4] != 0;
        if num_bin == 0 {
            return Err(HistGbmError::io_format("bin mapper record has zero bins"));
        }
        let n_bounds = num_bin as usize - 1;
        if buffer.len() < 5 + 8 * n_bounds {
            return Err(HistGbmError::io_format(format!(
                "bin mapper record truncated: {} boundaries expected",
                n_bounds
            )));
        }
        let mut bin_upper_bound = Vec::with_capacity(n_bounds);
        for i in 0..n_bounds {
            let at = 5 + 8 * i;
            bin_upper_bound.push(f64::from_le_bytes(buffer[at..at + 8].try_into().unwrap()));
        }
        Ok(BinMapper {
            num_bin,
            bin_upper_bound,
            is_trivial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_values_get_own_bins() {
        let values = vec![0.0, 1.0, 2.0, 3.0, 1.0, 2.0];
        let mapper = BinMapper::find_bin(&values, 255);
        assert_eq!(mapper.num_bin(), 4);
        assert_eq!(mapper.value_to_bin(0.0), 0);
        assert_eq!(mapper.value_to_bin(1.0), 1);
        assert_eq!(mapper.value_to_bin(2.0), 2);
        assert_eq!(mapper.value_to_bin(3.0), 3);
        // midpoints separate neighbors
        assert_eq!(mapper.value_to_bin(1.4), 1);
        assert_eq!(mapper.value_to_bin(1.6), 2);
    }

    #[test]
    fn test_monotonic_mapping() {
        let values: Vec<f64> = (0..1000).map(|i| ((i * 37) % 101) as f64).collect();
        let mapper = BinMapper::find_bin(&values, 16);
        let mut prev = 0;
        for i in 0..=1010 {
            let bin = mapper.value_to_bin(i as f64 * 0.1);
            assert!(bin >= prev, "bin regressed at value {}", i as f64 * 0.1);
            prev = bin;
        }
    }

    #[test]
    fn test_bin_cap() {
        let values: Vec<f64> = (0..5000).map(|i| i as f64).collect();
        for max_bin in [2u32, 15, 64, 255] {
            let mapper = BinMapper::find_bin(&values, max_bin);
            assert!(mapper.num_bin() <= max_bin);
            assert!(mapper.num_bin() >= 2);
        }
    }

    #[test]
    fn test_ties_never_split() {
        // 90 copies of 1.0 dominate; with max_bin=4 the tie block must stay
        // inside a single bin.
        let mut values = vec![1.0f64; 90];
        values.extend((0..30).map(|i| 2.0 + i as f64));
        let mapper = BinMapper::find_bin(&values, 4);
        let tie_bin = mapper.value_to_bin(1.0);
        assert_eq!(mapper.value_to_bin(1.0), tie_bin);
        // everything strictly between the tie block and the next distinct
        // value is still on the tie side or the next, never in between
        assert!(mapper.value_to_bin(2.0) > tie_bin);
    }

    #[test]
    fn test_trivial_detection() {
        let mapper = BinMapper::find_bin(&[5.0; 100], 255);
        assert!(mapper.is_trivial());
        assert_eq!(mapper.num_bin(), 1);

        let mapper = BinMapper::find_bin(&[], 255);
        assert!(mapper.is_trivial());
    }

    #[test]
    fn test_zero_maps_to_default_bin() {
        let values = vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0];
        let mapper = BinMapper::find_bin(&values, 255);
        assert_eq!(mapper.value_to_bin(0.0), 0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let values: Vec<f64> = (0..500).map(|i| (i % 97) as f64 * 0.5).collect();
        let mapper = BinMapper::find_bin(&values, 32);
        let mut buffer = vec![0u8; BinMapper::size_for(32)];
        mapper.copy_to(&mut buffer).unwrap();
        let restored = BinMapper::copy_from(&buffer).unwrap();
        assert_eq!(mapper, restored);
    }

    #[test]
    fn test_copy_from_rejects_truncation() {
        let mapper = BinMapper::find_bin(&[0.0, 1.0, 2.0, 3.0], 255);
        let mut buffer = vec![0u8; BinMapper::size_for(255)];
        mapper.copy_to(&mut buffer).unwrap();
        assert!(BinMapper::copy_from(&buffer[..6]).is_err());
    }
}
