//! Collective communication schedules over a flat rank space.

/// Schedule for the Bruck all-gather: at round `i` a rank sends its
/// accumulated blocks to `out_ranks[i]` and receives from `in_ranks[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BruckMap {
    /// Number of communication rounds, `ceil(log2(n))`.
    pub k: usize,
    /// Rank received from at each round: `(rank + 2^i) % n`.
    pub in_ranks: Vec<i32>,
    /// Rank sent to at each round: `(rank - 2^i + n) % n`.
    pub out_ranks: Vec<i32>,
}

impl BruckMap {
    /// Build the schedule for `rank` out of `num_machines`.
    pub fn construct(rank: i32, num_machines: i32) -> Self {
        if num_machines <= 1 {
            return BruckMap::default();
        }
        let mut k = 0;
        let mut power = 1;
        while power < num_machines {
            k += 1;
            power *= 2;
        }
        let mut map = BruckMap {
            k,
            in_ranks: vec![-1; k],
            out_ranks: vec![-1; k],
        };
        for i in 0..k {
            let step = 1 << i;
            map.in_ranks[i] = (rank + step) % num_machines;
            map.out_ranks[i] = (rank - step + num_machines) % num_machines;
        }
        map
    }
}

/// Schedule for recursive-halving all-reduce, defined for power-of-two
/// worker counts; other counts fall back to gather-then-reduce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecursiveHalvingMap {
    /// Number of halving rounds, `log2(n)`; 0 when the count is not a
    /// power of two.
    pub k: usize,
    /// Partner rank at each round: `rank ^ (n >> (i + 1))`.
    pub ranks: Vec<i32>,
    /// Whether the schedule is usable.
    pub is_power_of_2: bool,
}

impl RecursiveHalvingMap {
    /// Build the schedule for `rank` out of `num_machines`.
    pub fn construct(rank: i32, num_machines: i32) -> Self {
        if num_machines <= 1 {
            return RecursiveHalvingMap::default();
        }
        let is_power_of_2 = num_machines & (num_machines - 1) == 0;
        if !is_power_of_2 {
            return RecursiveHalvingMap {
                k: 0,
                ranks: Vec::new(),
                is_power_of_2: false,
            };
        }
        let k = num_machines.trailing_zeros() as usize;
        let ranks = (0..k)
            .map(|i| rank ^ (num_machines >> (i + 1)))
            .collect();
        RecursiveHalvingMap {
            k,
            ranks,
            is_power_of_2: true,
        }
    }
}
