//! Multi-worker training over localhost sockets.
//!
//! Each worker runs in its own thread with a real TCP collective layer.
//! Gradients are integer-valued so float sums are exact and the reduced
//! distributed path must reproduce the single-machine tree bit for bit.

use histgbm::core::types::{Label, Score};
use histgbm::treelearner::parallel::VotingParallelTreeLearner;
use histgbm::{
    Config, ConfigBuilder, DataParallelTreeLearner, Dataset, Network, SerialTreeLearner, Tree,
};
use ndarray::{Array2, Axis};
use std::io::Write;

fn seeded_matrix(n: usize, num_features: usize, seed: u64) -> (Array2<f64>, Vec<Score>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut data = Vec::with_capacity(n * num_features);
    let mut state = seed;
    for _ in 0..n * num_features {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        data.push(((state >> 33) % 12) as f64);
    }
    let matrix = Array2::from_shape_vec((n, num_features), data).unwrap();
    let gradients = (0..n).map(|i| (matrix[[i, 0]] - 6.0) as Score).collect();
    (matrix, gradients)
}

fn write_machine_list(base_port: u16, n: i32) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..n {
        writeln!(file, "127.0.0.1 {}", base_port + i as u16).unwrap();
    }
    file
}

fn worker_config(base: &Config, base_port: u16, rank: i32, machine_file: &str) -> Config {
    let mut config = base.clone();
    config.num_machines = 2;
    config.is_pre_partition = true;
    config.local_listen_port = base_port + rank as u16;
    config.machine_list_filename = machine_file.to_string();
    config.time_out = 1;
    config
}

/// Train on two pre-partitioned workers and return both trees.
fn train_two_workers(
    base_port: u16,
    base_config: &Config,
    matrix: &Array2<f64>,
    gradients: &[Score],
    reference: &Dataset,
    voting: bool,
) -> Vec<Tree> {
    let n = matrix.nrows();
    let split_at = n / 2;
    let machine_file = write_machine_list(base_port, 2);
    let machine_path = machine_file.path().to_string_lossy().to_string();

    let handles: Vec<_> = (0..2)
        .map(|rank| {
            let rows = if rank == 0 { 0..split_at } else { split_at..n };
            let shard = matrix.select(Axis(0), &rows.clone().collect::<Vec<_>>());
            let shard_gradients: Vec<Score> = rows.clone().map(|i| gradients[i]).collect();
            let labels = vec![0.0 as Label; shard.nrows()];
            let reference = reference.clone();
            let config = worker_config(base_config, base_port, rank as i32, &machine_path);
            std::thread::spawn(move || {
                let network = Network::new(&config).unwrap();
                let dataset = Dataset::from_matrix_with_reference(
                    shard.view(),
                    &labels,
                    &reference,
                    &config,
                )
                .unwrap();
                let hessians = vec![1.0 as Score; shard_gradients.len()];
                let mut learner = if voting {
                    VotingParallelTreeLearner::new(&config, &dataset, &network, 3).unwrap()
                } else {
                    DataParallelTreeLearner::new(&config, &dataset, &network).unwrap()
                };
                learner.train(&shard_gradients, &hessians).unwrap()
            })
        })
        .collect();
    let trees = handles.into_iter().map(|h| h.join().unwrap()).collect();
    drop(machine_file);
    trees
}

#[test]
fn reduced_sync_matches_single_machine_training() {
    let (matrix, gradients) = seeded_matrix(240, 3, 77);
    let labels = vec![0.0 as Label; 240];
    let hessians = vec![1.0 as Score; 240];
    let config = ConfigBuilder::new()
        .num_leaves(6)
        .min_data_in_leaf(1)
        .build()
        .unwrap();

    let full_dataset = Dataset::from_matrix(matrix.view(), &labels, &config).unwrap();
    let mut serial = SerialTreeLearner::new(&config, &full_dataset).unwrap();
    let reference_tree = serial.train(&gradients, &hessians).unwrap();
    assert!(reference_tree.num_leaves() > 1);

    let trees = train_two_workers(23450, &config, &matrix, &gradients, &full_dataset, false);
    for tree in &trees {
        assert_eq!(
            tree, &reference_tree,
            "distributed training must reproduce the single-machine tree"
        );
    }
}

#[test]
fn voting_sync_workers_agree_with_each_other() {
    let (matrix, gradients) = seeded_matrix(200, 3, 13);
    let labels = vec![0.0 as Label; 200];
    let config = ConfigBuilder::new()
        .num_leaves(4)
        .min_data_in_leaf(1)
        .build()
        .unwrap();

    let full_dataset = Dataset::from_matrix(matrix.view(), &labels, &config).unwrap();
    let trees = train_two_workers(23460, &config, &matrix, &gradients, &full_dataset, true);
    assert_eq!(trees[0], trees[1]);
    assert!(trees[0].num_leaves() >= 1);
    assert!(trees[0].num_leaves() <= 4);
}

#[test]
fn distributed_binning_shards_and_gathers_mappers() {
    // every worker must end with the same global mapper set even though
    // each learned only a shard
    let base_port = 23470u16;
    let machine_file = write_machine_list(base_port, 2);
    let machine_path = machine_file.path().to_string_lossy().to_string();

    // one data file shared by both workers (pre-partition keeps all rows)
    let mut data_file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..120 {
        writeln!(data_file, "{},{},{},{}", i % 2, i % 7, (i * 3) % 5, (i * 5) % 9).unwrap();
    }
    let data_path = data_file.path().to_string_lossy().to_string();

    let handles: Vec<_> = (0..2)
        .map(|rank| {
            let machine_path = machine_path.clone();
            let data_path = data_path.clone();
            std::thread::spawn(move || {
                let config = ConfigBuilder::new()
                    .num_machines(2)
                    .is_pre_partition(true)
                    .local_listen_port(base_port + rank as u16)
                    .machine_list_filename(machine_path)
                    .time_out(1)
                    .build()
                    .unwrap();
                let network = Network::new(&config).unwrap();
                let dataset = Dataset::from_file(&data_path, &config, Some(&network), None).unwrap();
                let mappers: Vec<_> = dataset
                    .features()
                    .iter()
                    .map(|f| f.bin_mapper().clone())
                    .collect();
                (dataset.num_features(), mappers)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results[0].0, results[1].0);
    assert_eq!(results[0].1, results[1].1);
    drop(machine_file);
    drop(data_file);
}
