//! Distributed tree learners: reduced and voting histogram sync.
//!
//! Both learners reuse the serial growth loop and plug a collective
//! strategy into its sync points. The reduced learner all-reduces every
//! built histogram, so every worker searches the exact global statistics;
//! the voting learner pre-selects a few promising columns per worker and
//! only reduces those, trading accuracy for bandwidth.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::DataSize;
use crate::dataset::dataset::Dataset;
use crate::network::Network;
use crate::treelearner::feature_histogram::{FeatureHistogram, HistogramBinEntry};
use crate::treelearner::serial::{HistogramSync, SerialTreeLearner};
use crate::treelearner::split_info::SplitInfo;

/// Bytes of one histogram entry on the wire: gradient, hessian, count.
const WIRE_ENTRY_BYTES: usize = 8 + 8 + 4;

fn encode_entries(hist: &FeatureHistogram, out: &mut Vec<u8>) {
    for entry in hist.data() {
        out.extend_from_slice(&entry.sum_gradients.to_le_bytes());
        out.extend_from_slice(&entry.sum_hessians.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
    }
}

fn decode_entries(hist: &mut FeatureHistogram, buffer: &[u8]) {
    let decoded: Vec<HistogramBinEntry> = buffer
        .chunks_exact(WIRE_ENTRY_BYTES)
        .map(|chunk| HistogramBinEntry {
            sum_gradients: f64::from_le_bytes(chunk[0..8].try_into().unwrap()),
            sum_hessians: f64::from_le_bytes(chunk[8..16].try_into().unwrap()),
            count: i32::from_le_bytes(chunk[16..20].try_into().unwrap()),
        })
        .collect();
    hist.set_data(&decoded);
}

/// Entry-wise sum of serialized histogram entries.
fn histogram_sum_reducer(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src
        .chunks_exact(WIRE_ENTRY_BYTES)
        .zip(dst.chunks_exact_mut(WIRE_ENTRY_BYTES))
    {
        let g = f64::from_le_bytes(s[0..8].try_into().unwrap())
            + f64::from_le_bytes(d[0..8].try_into().unwrap());
        let h = f64::from_le_bytes(s[8..16].try_into().unwrap())
            + f64::from_le_bytes(d[8..16].try_into().unwrap());
        let c = i32::from_le_bytes(s[16..20].try_into().unwrap())
            + i32::from_le_bytes(d[16..20].try_into().unwrap());
        d[0..8].copy_from_slice(&g.to_le_bytes());
        d[8..16].copy_from_slice(&h.to_le_bytes());
        d[16..20].copy_from_slice(&c.to_le_bytes());
    }
}

/// Reduce a set of histogram columns across workers in one collective.
fn allreduce_columns(
    network: &Network,
    features: &[usize],
    smaller: &mut [FeatureHistogram],
    mut larger: Option<&mut [FeatureHistogram]>,
) -> Result<()> {
    let mut buffer = Vec::new();
    for &f in features {
        encode_entries(&smaller[f], &mut buffer);
    }
    if let Some(larger) = larger.as_deref() {
        for &f in features {
            encode_entries(&larger[f], &mut buffer);
        }
    }
    network.allreduce(&mut buffer, WIRE_ENTRY_BYTES, &histogram_sum_reducer)?;

    let mut at = 0usize;
    for &f in features {
        let len = smaller[f].data().len() * WIRE_ENTRY_BYTES;
        decode_entries(&mut smaller[f], &buffer[at..at + len]);
        at += len;
    }
    if let Some(larger) = larger.as_deref_mut() {
        for &f in features {
            let len = larger[f].data().len() * WIRE_ENTRY_BYTES;
            decode_entries(&mut larger[f], &buffer[at..at + len]);
            at += len;
        }
    }
    Ok(())
}

fn sync_root_over(network: &Network, sum_g: f64, sum_h: f64, count: DataSize) -> Result<(f64, f64, DataSize)> {
    let mut buffer = Vec::with_capacity(WIRE_ENTRY_BYTES);
    buffer.extend_from_slice(&sum_g.to_le_bytes());
    buffer.extend_from_slice(&sum_h.to_le_bytes());
    buffer.extend_from_slice(&count.to_le_bytes());
    network.allreduce(&mut buffer, WIRE_ENTRY_BYTES, &histogram_sum_reducer)?;
    Ok((
        f64::from_le_bytes(buffer[0..8].try_into().unwrap()),
        f64::from_le_bytes(buffer[8..16].try_into().unwrap()),
        i32::from_le_bytes(buffer[16..20].try_into().unwrap()),
    ))
}

/// Sync strategy of the reduced data-parallel learner: every built
/// histogram is summed across workers before the threshold search.
pub struct ReducedHistogramSync<'a> {
    network: &'a Network,
}

impl<'a> HistogramSync for ReducedHistogramSync<'a> {
    fn sync_root(
        &mut self,
        sum_g: f64,
        sum_h: f64,
        count: DataSize,
    ) -> Result<(f64, f64, DataSize)> {
        sync_root_over(self.network, sum_g, sum_h, count)
    }

    fn sync_histograms(
        &mut self,
        features: &[usize],
        smaller: &mut [FeatureHistogram],
        larger: Option<&mut [FeatureHistogram]>,
        _smaller_stats: (f64, f64, DataSize),
        _larger_stats: (f64, f64, DataSize),
    ) -> Result<Option<Vec<bool>>> {
        allreduce_columns(self.network, features, smaller, larger)?;
        Ok(None)
    }

    fn use_ordered_bins(&self) -> bool {
        false
    }
}

/// Data-parallel tree learner under full (reduced) histogram sync.
pub struct DataParallelTreeLearner;

impl DataParallelTreeLearner {
    /// Build a learner whose histograms are globally reduced over
    /// `network`.
    pub fn new<'a>(
        config: &Config,
        train_data: &'a Dataset,
        network: &'a Network,
    ) -> Result<SerialTreeLearner<'a>> {
        SerialTreeLearner::with_sync(
            config,
            train_data,
            Box::new(ReducedHistogramSync { network }),
        )
    }
}

/// Sync strategy of the voting learner: each worker nominates its top-K
/// columns per leaf, the global top-2K by votes are reduced, and only
/// those are searched this iteration.
pub struct VotingHistogramSync<'a> {
    network: &'a Network,
    top_k: usize,
    lambda_l2: f64,
    min_data_in_leaf: DataSize,
    min_sum_hessian_in_leaf: f64,
}

impl<'a> VotingHistogramSync<'a> {
    /// Rank features by the gain a local histogram would give under the
    /// leaf's global totals and keep the best `top_k`.
    fn local_votes(
        &self,
        features: &[usize],
        hists: &mut [FeatureHistogram],
        stats: (f64, f64, DataSize),
    ) -> Vec<u32> {
        let mut gains: Vec<(f64, usize)> = Vec::with_capacity(features.len());
        let mut scratch = SplitInfo::default();
        for &f in features {
            scratch.reset();
            hists[f].find_best_threshold(
                stats.0,
                stats.1,
                stats.2,
                self.lambda_l2,
                self.min_data_in_leaf,
                self.min_sum_hessian_in_leaf,
                &mut scratch,
            );
            if scratch.is_valid() {
                gains.push((scratch.gain, f));
            }
        }
        gains.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.cmp(&b.1)));
        gains
            .into_iter()
            .take(self.top_k)
            .map(|(_, f)| f as u32)
            .collect()
    }
}

impl<'a> HistogramSync for VotingHistogramSync<'a> {
    fn sync_root(
        &mut self,
        sum_g: f64,
        sum_h: f64,
        count: DataSize,
    ) -> Result<(f64, f64, DataSize)> {
        sync_root_over(self.network, sum_g, sum_h, count)
    }

    fn sync_histograms(
        &mut self,
        features: &[usize],
        smaller: &mut [FeatureHistogram],
        larger: Option<&mut [FeatureHistogram]>,
        smaller_stats: (f64, f64, DataSize),
        larger_stats: (f64, f64, DataSize),
    ) -> Result<Option<Vec<bool>>> {
        // nominate locally promising columns per leaf
        let mut larger = larger;
        let mut votes = self.local_votes(features, smaller, smaller_stats);
        if let Some(larger_hists) = larger.as_deref_mut() {
            votes.extend(self.local_votes(features, larger_hists, larger_stats));
        }

        // fixed-stride vote record for the all-gather
        let record_slots = self.top_k * 2;
        let mut record = vec![u32::MAX; record_slots];
        for (slot, &f) in votes.iter().take(record_slots).enumerate() {
            record[slot] = f;
        }
        let mut record_bytes = Vec::with_capacity(record_slots * 4);
        for v in &record {
            record_bytes.extend_from_slice(&v.to_le_bytes());
        }
        let gathered = self.network.allgather_uniform(&record_bytes)?;

        // tally votes; ties resolve toward the lower feature index
        let mut counts: Vec<(usize, usize)> = Vec::new();
        for chunk in gathered.chunks_exact(4) {
            let f = u32::from_le_bytes(chunk.try_into().unwrap());
            if f == u32::MAX {
                continue;
            }
            let f = f as usize;
            match counts.iter_mut().find(|(feat, _)| *feat == f) {
                Some((_, c)) => *c += 1,
                None => counts.push((f, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let selected: Vec<usize> = counts
            .into_iter()
            .take(self.top_k * 2)
            .map(|(f, _)| f)
            .collect();

        allreduce_columns(self.network, &selected, smaller, larger)?;

        let mut mask = vec![false; smaller.len()];
        for &f in &selected {
            mask[f] = true;
        }
        Ok(Some(mask))
    }

    fn use_subtraction(&self) -> bool {
        // cached histograms hold unreduced columns, so a parent array can
        // never seed a subtraction
        false
    }

    fn use_ordered_bins(&self) -> bool {
        false
    }
}

/// Data-parallel tree learner under voting-based histogram sync.
pub struct VotingParallelTreeLearner;

impl VotingParallelTreeLearner {
    /// Build a voting learner nominating `top_k` columns per worker and
    /// leaf.
    pub fn new<'a>(
        config: &Config,
        train_data: &'a Dataset,
        network: &'a Network,
        top_k: usize,
    ) -> Result<SerialTreeLearner<'a>> {
        SerialTreeLearner::with_sync(
            config,
            train_data,
            Box::new(VotingHistogramSync {
                network,
                top_k: top_k.max(1),
                lambda_l2: config.lambda_l2,
                min_data_in_leaf: config.min_data_in_leaf,
                min_sum_hessian_in_leaf: config.min_sum_hessian_in_leaf,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_round_trip() {
        let mut hist = FeatureHistogram::new(3);
        let entries = [
            HistogramBinEntry {
                sum_gradients: 1.5,
                sum_hessians: 2.0,
                count: 3,
            },
            HistogramBinEntry {
                sum_gradients: -0.5,
                sum_hessians: 1.0,
                count: 1,
            },
            HistogramBinEntry::default(),
        ];
        hist.set_data(&entries);
        let mut buffer = Vec::new();
        encode_entries(&hist, &mut buffer);
        assert_eq!(buffer.len(), 3 * WIRE_ENTRY_BYTES);

        let mut restored = FeatureHistogram::new(3);
        decode_entries(&mut restored, &buffer);
        assert_eq!(restored.data(), hist.data());
    }

    #[test]
    fn test_histogram_sum_reducer() {
        let make = |g: f64, h: f64, c: i32| {
            let mut out = Vec::new();
            out.extend_from_slice(&g.to_le_bytes());
            out.extend_from_slice(&h.to_le_bytes());
            out.extend_from_slice(&c.to_le_bytes());
            out
        };
        let src = make(1.0, 2.0, 3);
        let mut dst = make(10.0, 20.0, 30);
        histogram_sum_reducer(&src, &mut dst);
        assert_eq!(dst, make(11.0, 22.0, 33));
    }
}
