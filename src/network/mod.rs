//! Collective operations between training workers.
//!
//! Workers form a flat rank space wired by a machine list file. All-gather
//! runs the Bruck schedule; all-reduce runs recursive-halving
//! reduce-scatter plus all-gather for power-of-two worker counts and large
//! payloads, and otherwise gathers everything and reduces locally in rank
//! order, which keeps every worker's result bit-identical.

pub mod linkers;
pub mod topology;

use crate::core::config::Config;
use crate::core::error::{HistGbmError, Result};
use linkers::{Linkers, MachineList};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::Duration;
use topology::{BruckMap, RecursiveHalvingMap};

/// Payloads below this many bytes are all-reduced by gather-then-reduce.
const ALLREDUCE_GATHER_THRESHOLD: usize = 256 * 1024;

/// Element-wise reduction applied to whole byte buffers.
pub type ReduceFunction<'f> = dyn Fn(&[u8], &mut [u8]) + Sync + 'f;

/// One worker's view of the collective layer.
pub struct Network {
    rank: i32,
    num_machines: i32,
    links: Vec<Option<Mutex<TcpStream>>>,
    bruck_map: BruckMap,
    recursive_halving_map: RecursiveHalvingMap,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("rank", &self.rank)
            .field("num_machines", &self.num_machines)
            .finish()
    }
}

impl Network {
    /// The trivial single-machine network.
    pub fn single_machine() -> Self {
        Network {
            rank: 0,
            num_machines: 1,
            links: Vec::new(),
            bruck_map: BruckMap::default(),
            recursive_halving_map: RecursiveHalvingMap::default(),
        }
    }

    /// Connect the worker set described by the config's machine list.
    pub fn new(config: &Config) -> Result<Self> {
        if config.num_machines <= 1 {
            return Ok(Network::single_machine());
        }
        let list = MachineList::parse(&config.machine_list_filename, config.num_machines)?;
        let num_machines = if (list.len() as i32) < config.num_machines {
            log::warn!(
                "world size is bigger than the machine list; shrinking to {}",
                list.len()
            );
            list.len() as i32
        } else {
            config.num_machines
        };
        if num_machines <= 1 {
            return Ok(Network::single_machine());
        }
        let rank = list.local_rank(config.local_listen_port)?;
        let timeout = Duration::from_secs(config.time_out.max(1) * 60);
        let linkers = Linkers::construct(&list, rank, timeout)?;
        Ok(Network {
            rank,
            num_machines,
            links: linkers
                .links
                .into_iter()
                .map(|l| l.map(Mutex::new))
                .collect(),
            bruck_map: BruckMap::construct(rank, num_machines),
            recursive_halving_map: RecursiveHalvingMap::construct(rank, num_machines),
        })
    }

    /// This worker's rank.
    #[inline]
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Number of workers.
    #[inline]
    pub fn num_machines(&self) -> i32 {
        self.num_machines
    }

    fn send_to(&self, peer: i32, data: &[u8]) -> Result<()> {
        let link = self.links[peer as usize]
            .as_ref()
            .ok_or_else(|| HistGbmError::network(format!("no link to rank {}", peer)))?;
        let mut stream = link
            .lock()
            .map_err(|_| HistGbmError::network("link mutex poisoned"))?;
        stream
            .write_all(data)
            .map_err(|e| HistGbmError::network(format!("send to rank {} failed: {}", peer, e)))
    }

    fn recv_from(&self, peer: i32, data: &mut [u8]) -> Result<()> {
        let link = self.links[peer as usize]
            .as_ref()
            .ok_or_else(|| HistGbmError::network(format!("no link to rank {}", peer)))?;
        let mut stream = link
            .lock()
            .map_err(|_| HistGbmError::network("link mutex poisoned"))?;
        stream
            .read_exact(data)
            .map_err(|e| HistGbmError::network(format!("recv from rank {} failed: {}", peer, e)))
    }

    /// Bruck all-gather with per-rank byte blocks.
    ///
    /// `input` is this rank's block; `block_start`/`block_len` give every
    /// rank's placement in the assembled buffer, which is returned in full
    /// on every rank.
    pub fn allgather(
        &self,
        input: &[u8],
        block_start: &[usize],
        block_len: &[usize],
    ) -> Result<Vec<u8>> {
        let n = self.num_machines as usize;
        let rank = self.rank as usize;
        if input.len() != block_len[rank] {
            return Err(HistGbmError::network(format!(
                "allgather block of {} bytes does not match declared {}",
                input.len(),
                block_len[rank]
            )));
        }
        let total: usize = block_len.iter().sum();
        let mut output = vec![0u8; total];
        output[block_start[rank]..block_start[rank] + block_len[rank]].copy_from_slice(input);
        if n == 1 {
            return Ok(output);
        }

        // Bruck rounds: the held block run doubles each round
        let mut held = 1usize;
        for round in 0..self.bruck_map.k {
            let transfer_cnt = held.min(n - held);
            let dst = self.bruck_map.out_ranks[round];
            let src = self.bruck_map.in_ranks[round];

            // send blocks [rank, rank + transfer_cnt)
            let mut send_buf = Vec::new();
            for b in 0..transfer_cnt {
                let blk = (rank + b) % n;
                send_buf.extend_from_slice(
                    &output[block_start[blk]..block_start[blk] + block_len[blk]],
                );
            }
            // receive blocks [rank + held, rank + held + transfer_cnt)
            let recv_total: usize = (0..transfer_cnt)
                .map(|b| block_len[(rank + held + b) % n])
                .sum();
            let mut recv_buf = vec![0u8; recv_total];

            let recv_result = std::thread::scope(|scope| {
                let send_handle = scope.spawn(|| self.send_to(dst, &send_buf));
                let recv_result = self.recv_from(src, &mut recv_buf);
                let send_result = send_handle
                    .join()
                    .map_err(|_| HistGbmError::network("send thread panicked"))?;
                send_result.and(recv_result)
            });
            recv_result?;

            let mut at = 0usize;
            for b in 0..transfer_cnt {
                let blk = (rank + held + b) % n;
                output[block_start[blk]..block_start[blk] + block_len[blk]]
                    .copy_from_slice(&recv_buf[at..at + block_len[blk]]);
                at += block_len[blk];
            }
            held += transfer_cnt;
        }
        Ok(output)
    }

    /// All-gather with uniform block sizes.
    pub fn allgather_uniform(&self, input: &[u8]) -> Result<Vec<u8>> {
        let n = self.num_machines as usize;
        let len = input.len();
        let block_start: Vec<usize> = (0..n).map(|i| i * len).collect();
        let block_len = vec![len; n];
        self.allgather(input, &block_start, &block_len)
    }

    /// Element-wise all-reduce of `data` in place, identical on every
    /// rank afterwards.
    pub fn allreduce(
        &self,
        data: &mut [u8],
        type_size: usize,
        reducer: &ReduceFunction<'_>,
    ) -> Result<()> {
        if self.num_machines <= 1 {
            return Ok(());
        }
        if type_size == 0 || data.len() % type_size != 0 {
            return Err(HistGbmError::network(format!(
                "allreduce payload of {} bytes is not a multiple of the {}-byte element",
                data.len(),
                type_size
            )));
        }
        let elems = data.len() / type_size;
        if !self.recursive_halving_map.is_power_of_2
            || data.len() < ALLREDUCE_GATHER_THRESHOLD
            || elems < self.num_machines as usize
        {
            self.allreduce_by_allgather(data, reducer)
        } else {
            self.allreduce_recursive_halving(data, type_size, reducer)
        }
    }

    /// Gather every rank's buffer and reduce locally in rank order.
    fn allreduce_by_allgather(&self, data: &mut [u8], reducer: &ReduceFunction<'_>) -> Result<()> {
        let n = self.num_machines as usize;
        let gathered = self.allgather_uniform(data)?;
        let len = data.len();
        data.copy_from_slice(&gathered[..len]);
        for r in 1..n {
            reducer(&gathered[r * len..(r + 1) * len], data);
        }
        Ok(())
    }

    /// Recursive-halving reduce-scatter followed by an all-gather of the
    /// scattered chunks. Power-of-two worker counts only.
    pub(crate) fn allreduce_recursive_halving(
        &self,
        data: &mut [u8],
        type_size: usize,
        reducer: &ReduceFunction<'_>,
    ) -> Result<()> {
        let n = self.num_machines as usize;
        let rank = self.rank as usize;
        debug_assert!(self.recursive_halving_map.is_power_of_2);

        // chunk the element range into n nearly-equal pieces
        let elems = data.len() / type_size;
        let base = elems / n;
        let rem = elems % n;
        let chunk_elems: Vec<usize> = (0..n).map(|b| base + usize::from(b < rem)).collect();
        let mut chunk_start = vec![0usize; n + 1];
        for b in 0..n {
            chunk_start[b + 1] = chunk_start[b] + chunk_elems[b] * type_size;
        }

        let mut lo = 0usize;
        let mut hi = n;
        for round in 0..self.recursive_halving_map.k {
            let partner = self.recursive_halving_map.ranks[round];
            let mid = lo + (hi - lo) / 2;
            let keep_lower = rank < mid;
            let (keep_lo, keep_hi, send_lo, send_hi) = if keep_lower {
                (lo, mid, mid, hi)
            } else {
                (mid, hi, lo, mid)
            };

            let send_bytes = chunk_start[send_lo]..chunk_start[send_hi];
            let keep_bytes = chunk_start[keep_lo]..chunk_start[keep_hi];
            let send_buf = data[send_bytes].to_vec();
            let mut recv_buf = vec![0u8; keep_bytes.end - keep_bytes.start];

            let result = std::thread::scope(|scope| {
                let send_handle = scope.spawn(|| self.send_to(partner, &send_buf));
                let recv_result = self.recv_from(partner, &mut recv_buf);
                let send_result = send_handle
                    .join()
                    .map_err(|_| HistGbmError::network("send thread panicked"))?;
                send_result.and(recv_result)
            });
            result?;

            reducer(&recv_buf, &mut data[keep_bytes]);
            lo = keep_lo;
            hi = keep_hi;
        }
        debug_assert_eq!(lo + 1, hi);
        debug_assert_eq!(lo, rank);

        // gather the reduced chunks back to everyone
        let my_chunk = data[chunk_start[rank]..chunk_start[rank + 1]].to_vec();
        let block_start: Vec<usize> = (0..n).map(|b| chunk_start[b]).collect();
        let block_len: Vec<usize> = (0..n).map(|b| chunk_start[b + 1] - chunk_start[b]).collect();
        let gathered = self.allgather(&my_chunk, &block_start, &block_len)?;
        data.copy_from_slice(&gathered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigBuilder;
    use std::io::Write as IoWrite;

    fn spawn_workers<F, T>(base_port: u16, n: i32, job: F) -> Vec<T>
    where
        F: Fn(Network) -> T + Send + Sync + Clone + 'static,
        T: Send + 'static,
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            writeln!(file, "127.0.0.1 {}", base_port + i as u16).unwrap();
        }
        let path = file.path().to_path_buf();
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let path = path.clone();
                let job = job.clone();
                std::thread::spawn(move || {
                    let config = ConfigBuilder::new()
                        .num_machines(n)
                        .local_listen_port(base_port + i as u16)
                        .machine_list_filename(path.to_string_lossy().to_string())
                        .time_out(1)
                        .build()
                        .unwrap();
                    let network = Network::new(&config).unwrap();
                    job(network)
                })
            })
            .collect();
        let results: Vec<T> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        drop(file);
        results
    }

    fn sum_f64_reducer(src: &[u8], dst: &mut [u8]) {
        for (s, d) in src.chunks_exact(8).zip(dst.chunks_exact_mut(8)) {
            let v = f64::from_le_bytes(s.try_into().unwrap())
                + f64::from_le_bytes(d.try_into().unwrap());
            d.copy_from_slice(&v.to_le_bytes());
        }
    }

    #[test]
    fn test_allgather_two_ranks() {
        let results = spawn_workers(23410, 2, |net| {
            let block = vec![net.rank() as u8 + 1; 3 + net.rank() as usize];
            let starts = vec![0, 3];
            let lens = vec![3, 4];
            net.allgather(&block, &starts, &lens).unwrap()
        });
        for out in results {
            assert_eq!(out, vec![1, 1, 1, 2, 2, 2, 2]);
        }
    }

    #[test]
    fn test_allgather_three_ranks() {
        let results = spawn_workers(23420, 3, |net| {
            let rank = net.rank() as u8;
            let block = vec![rank; (rank + 1) as usize];
            let starts = vec![0, 1, 3];
            let lens = vec![1, 2, 3];
            net.allgather(&block, &starts, &lens).unwrap()
        });
        for out in results {
            assert_eq!(out, vec![0, 1, 1, 2, 2, 2]);
        }
    }

    #[test]
    fn test_allreduce_sums_across_ranks() {
        let results = spawn_workers(23430, 3, |net| {
            let mut data = Vec::new();
            for i in 0..4 {
                let v = (net.rank() as f64 + 1.0) * (i as f64 + 1.0);
                data.extend_from_slice(&v.to_le_bytes());
            }
            net.allreduce(&mut data, 8, &sum_f64_reducer).unwrap();
            data
        });
        // sum over ranks of (r+1)*(i+1) = 6*(i+1)
        for out in results {
            let values: Vec<f64> = out
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            assert_eq!(values, vec![6.0, 12.0, 18.0, 24.0]);
        }
    }

    #[test]
    fn test_recursive_halving_matches_gather_path() {
        let results = spawn_workers(23440, 2, |net| {
            let mut data = Vec::new();
            for i in 0..16 {
                let v = (net.rank() as f64 + 2.0) * i as f64;
                data.extend_from_slice(&v.to_le_bytes());
            }
            let mut by_gather = data.clone();
            net.allreduce_by_allgather(&mut by_gather, &sum_f64_reducer)
                .unwrap();
            net.allreduce_recursive_halving(&mut data, 8, &sum_f64_reducer)
                .unwrap();
            (data, by_gather)
        });
        for (rh, gather) in results {
            assert_eq!(rh, gather);
        }
    }

    #[test]
    fn test_single_machine_is_identity() {
        let net = Network::single_machine();
        let mut data = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        net.allreduce(&mut data, 8, &sum_f64_reducer).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let out = net.allgather_uniform(&data).unwrap();
        assert_eq!(out, data);
    }
}
