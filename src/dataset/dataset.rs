//! Dataset construction: sampling, bin-mapper learning, feature
//! projection, and the binary dataset file.

use crate::core::config::Config;
use crate::core::error::{HistGbmError, Result};
use crate::core::random::Random;
use crate::core::types::{DataSize, Label, BIN_SAMPLE_COUNT};
use crate::dataset::bin_mapper::BinMapper;
use crate::dataset::feature::Feature;
use crate::dataset::metadata::Metadata;
use crate::dataset::parser::{create_parser, InitScore, Parser, TextReader};
use crate::network::Network;
use ndarray::ArrayView2;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Column roles resolved from the config specs.
#[derive(Debug, Default, Clone)]
struct ColumnRoles {
    label_idx: i32,
    weight_idx: i32,
    group_idx: i32,
    ignored: Vec<i32>,
}

/// A binned training dataset: one [`Feature`] per usable column plus
/// metadata.
#[derive(Debug, Clone)]
pub struct Dataset {
    num_data: DataSize,
    global_num_data: u64,
    max_bin: u32,
    is_enable_sparse: bool,
    features: Vec<Feature>,
    /// Original column -> used feature index, -1 for dropped columns.
    used_feature_map: Vec<i32>,
    num_total_features: usize,
    feature_names: Vec<String>,
    metadata: Metadata,
}

impl Dataset {
    /// Number of local rows.
    #[inline]
    pub fn num_data(&self) -> DataSize {
        self.num_data
    }

    /// Rows across all workers.
    pub fn global_num_data(&self) -> u64 {
        self.global_num_data
    }

    /// Number of usable features.
    #[inline]
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Number of columns before trivial/ignored filtering.
    pub fn num_total_features(&self) -> usize {
        self.num_total_features
    }

    /// One usable feature.
    #[inline]
    pub fn feature_at(&self, index: usize) -> &Feature {
        &self.features[index]
    }

    /// All usable features.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Original column -> used feature index, -1 for dropped columns.
    pub fn used_feature_map(&self) -> &[i32] {
        &self.used_feature_map
    }

    /// Column names.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Labels and side information.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Build from an in-memory row-major matrix. Bin boundaries are
    /// learned from (a sample of) the matrix itself.
    pub fn from_matrix(
        features: ArrayView2<'_, f64>,
        labels: &[Label],
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let num_data = features.nrows() as DataSize;
        let num_total = features.ncols();
        if num_data == 0 {
            return Err(HistGbmError::consistency("dataset is empty"));
        }
        if labels.len() != num_data as usize {
            return Err(HistGbmError::consistency(format!(
                "label count {} does not match row count {}",
                labels.len(),
                num_data
            )));
        }

        // sample rows for bin learning
        let mut random = Random::new(config.data_random_seed);
        let sample_rows: Vec<usize> =
            random.sample(num_data as usize, BIN_SAMPLE_COUNT.min(num_data as usize));

        let mappers: Vec<BinMapper> = (0..num_total)
            .into_par_iter()
            .map(|j| {
                let sampled: Vec<f64> = sample_rows.iter().map(|&i| features[[i, j]]).collect();
                BinMapper::find_bin(&sampled, config.max_bin)
            })
            .collect();

        let names = (0..num_total).map(|i| format!("Column_{}", i)).collect();
        let mut dataset = Dataset::assemble(mappers, &[], num_data, config, names)?;

        // project rows onto bin codes, one feature at a time
        dataset.features.par_iter_mut().for_each(|feature| {
            let column = feature.feature_index() as usize;
            for row in 0..num_data {
                feature.push(0, row, features[[row as usize, column]]);
            }
            feature.finish_load();
        });

        let mut metadata = Metadata::new(num_data, false, false);
        for (row, &label) in labels.iter().enumerate() {
            metadata.set_label_at(row as DataSize, label);
        }
        metadata.finish_load()?;
        metadata.check_or_partition(num_data, &[])?;
        dataset.metadata = metadata;
        Ok(dataset)
    }

    /// Build against another dataset's bin mappers, the way validation
    /// data and pre-partitioned worker shards are projected.
    pub fn from_matrix_with_reference(
        features: ArrayView2<'_, f64>,
        labels: &[Label],
        reference: &Dataset,
        config: &Config,
    ) -> Result<Self> {
        let num_data = features.nrows() as DataSize;
        if num_data == 0 {
            return Err(HistGbmError::consistency("dataset is empty"));
        }
        let mut copied = Vec::with_capacity(reference.num_features());
        for feature in &reference.features {
            copied.push(Feature::new(
                feature.feature_index(),
                feature.bin_mapper().clone(),
                num_data,
                config.is_enable_sparse,
                1,
            ));
        }
        let mut dataset = Dataset {
            num_data,
            global_num_data: num_data as u64,
            max_bin: reference.max_bin,
            is_enable_sparse: reference.is_enable_sparse,
            features: copied,
            used_feature_map: reference.used_feature_map.clone(),
            num_total_features: reference.num_total_features,
            feature_names: reference.feature_names.clone(),
            metadata: Metadata::new(num_data, false, false),
        };
        dataset.features.par_iter_mut().for_each(|feature| {
            let column = feature.feature_index() as usize;
            for row in 0..num_data {
                feature.push(0, row, features[[row as usize, column]]);
            }
            feature.finish_load();
        });
        for (row, &label) in labels.iter().enumerate() {
            dataset.metadata.set_label_at(row as DataSize, label);
        }
        Ok(dataset)
    }

    /// Load a text data file, with optional distributed binning.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        config: &Config,
        network: Option<&Network>,
        init_score: Option<&dyn InitScore>,
    ) -> Result<Self> {
        config.validate()?;
        let (rank, num_machines) = match network {
            Some(net) => (net.rank(), net.num_machines()),
            None => (0, 1),
        };

        let mut reader = TextReader::new(path.as_ref(), config.has_header)?;
        let (mut feature_names, name2idx) = header_names(&reader);
        let roles = resolve_columns(config, &name2idx, num_machines)?;
        // the label column never becomes a feature, so its name goes too
        if (roles.label_idx as usize) < feature_names.len() {
            feature_names.remove(roles.label_idx as usize);
        }

        if reader.num_lines() == 0 {
            return Err(HistGbmError::consistency(format!(
                "data file {} is empty",
                path.as_ref().display()
            )));
        }
        let parser = create_parser(&reader.lines()[0], roles.label_idx)?;

        // distributed loading without pre-partition keeps an i.i.d. slice
        // of rows on each worker
        let mut random = Random::new(config.data_random_seed);
        let mut used_indices: Vec<DataSize> = Vec::new();
        let global_num_data = if num_machines > 1 && !config.is_pre_partition {
            reader.filter_lines(
                |_line| random.next_int(num_machines) == rank,
                &mut used_indices,
            ) as u64
        } else {
            reader.num_lines() as u64
        };
        let num_data = reader.num_lines();
        if num_data == 0 {
            return Err(HistGbmError::consistency(
                "no rows were assigned to this worker",
            ));
        }

        // sample rows and learn bin boundaries
        let sample = reader.sample_lines(&mut random, BIN_SAMPLE_COUNT);
        let sample_values = transpose_sample(parser.as_ref(), &sample)?;

        let names = if feature_names.is_empty() {
            (0..sample_values.len())
                .map(|i| format!("Column_{}", i))
                .collect()
        } else {
            feature_names
        };

        let mappers = match network {
            Some(net) if num_machines > 1 => {
                construct_bin_mappers_distributed(&sample_values, config, net)?
            }
            _ => construct_bin_mappers_local(&sample_values, config),
        };
        let mut dataset = Dataset::assemble(mappers, &roles.ignored, num_data, config, names)?;
        dataset.global_num_data = global_num_data;

        // extract features and metadata row by row
        dataset.extract_from_lines(reader.lines(), parser.as_ref(), &roles, init_score)?;
        dataset
            .metadata
            .check_or_partition(num_data, &used_indices)?;
        dataset.check()?;
        Ok(dataset)
    }

    /// Shared assembly: drop trivial and ignored columns, keep the rest.
    fn assemble(
        mappers: Vec<BinMapper>,
        ignored: &[i32],
        num_data: DataSize,
        config: &Config,
        mut feature_names: Vec<String>,
    ) -> Result<Self> {
        let num_total = mappers.len();
        // the binary header stores exactly one name per total feature
        while feature_names.len() < num_total {
            feature_names.push(format!("Column_{}", feature_names.len()));
        }
        feature_names.truncate(num_total);
        let mut used_feature_map = vec![-1i32; num_total];
        let mut features = Vec::new();
        for (column, mapper) in mappers.into_iter().enumerate() {
            if ignored.contains(&(column as i32)) {
                log::warn!("Ignoring column {}", column);
                continue;
            }
            if mapper.is_trivial() {
                log::warn!(
                    "Feature {} only contains one value, will be ignored",
                    feature_names
                        .get(column)
                        .map(String::as_str)
                        .unwrap_or("<unnamed>")
                );
                continue;
            }
            used_feature_map[column] = features.len() as i32;
            features.push(Feature::new(
                column as i32,
                mapper,
                num_data,
                config.is_enable_sparse,
                1,
            ));
        }
        Ok(Dataset {
            num_data,
            global_num_data: num_data as u64,
            max_bin: config.max_bin,
            is_enable_sparse: config.is_enable_sparse,
            features,
            used_feature_map,
            num_total_features: num_total,
            feature_names,
            metadata: Metadata::new(num_data, false, false),
        })
    }

    fn extract_from_lines(
        &mut self,
        lines: &[String],
        parser: &dyn Parser,
        roles: &ColumnRoles,
        init_score: Option<&dyn InitScore>,
    ) -> Result<()> {
        let has_weight = roles.weight_idx >= 0;
        let has_query = roles.group_idx >= 0;
        let mut metadata = Metadata::new(self.num_data, has_weight, has_query);

        // parse rows in parallel chunks
        let parsed: Vec<(Vec<(i32, f64)>, f64)> = lines
            .par_iter()
            .map(|line| {
                let mut row_features = Vec::new();
                let mut label = 0.0;
                parser.parse_one_line(line, &mut row_features, &mut label)?;
                Ok((row_features, label))
            })
            .collect::<Result<_>>()?;

        let mut scores = init_score.map(|_| vec![0.0f64; self.num_data as usize]);

        // transpose into per-feature columns; role columns feed metadata
        let mut columns: Vec<Vec<(DataSize, f64)>> = vec![Vec::new(); self.features.len()];
        for (row, (row_features, label)) in parsed.iter().enumerate() {
            let row = row as DataSize;
            metadata.set_label_at(row, *label as Label);
            if let (Some(scores), Some(init)) = (scores.as_mut(), init_score) {
                scores[row as usize] = init.score(row_features);
            }
            for &(column, value) in row_features {
                if column == roles.weight_idx {
                    metadata.set_weight_at(row, value as Label);
                } else if column == roles.group_idx {
                    metadata.set_query_at(row, value as i32);
                } else if let Some(&inner) = self.used_feature_map.get(column as usize) {
                    if inner >= 0 {
                        columns[inner as usize].push((row, value));
                    }
                }
            }
        }

        self.features
            .par_iter_mut()
            .zip(columns.into_par_iter())
            .for_each(|(feature, column)| {
                for (row, value) in column {
                    feature.push(0, row, value);
                }
                feature.finish_load();
            });

        if let Some(scores) = scores {
            metadata.set_init_scores(scores);
        }
        metadata.finish_load()?;
        self.metadata = metadata;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.num_data <= 0 {
            return Err(HistGbmError::consistency("dataset is empty"));
        }
        if self.features.is_empty() {
            return Err(HistGbmError::consistency(
                "no usable features remain after filtering",
            ));
        }
        Ok(())
    }

    /// Write the binary dataset file (spec layout, little-endian). The
    /// file lands under a temporary name and is renamed into place.
    pub fn save_binary_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("bin.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);

            // header
            let mut header = Vec::new();
            header.extend_from_slice(&self.global_num_data.to_le_bytes());
            header.push(self.is_enable_sparse as u8);
            header.extend_from_slice(&(self.max_bin as i32).to_le_bytes());
            header.extend_from_slice(&self.num_data.to_le_bytes());
            header.extend_from_slice(&(self.features.len() as i32).to_le_bytes());
            header.extend_from_slice(&(self.num_total_features as i32).to_le_bytes());
            header.extend_from_slice(&(self.used_feature_map.len() as u64).to_le_bytes());
            for &m in &self.used_feature_map {
                header.extend_from_slice(&m.to_le_bytes());
            }
            for name in &self.feature_names {
                header.extend_from_slice(&(name.len() as i32).to_le_bytes());
                header.extend_from_slice(name.as_bytes());
            }
            writer.write_all(&(header.len() as u64).to_le_bytes())?;
            writer.write_all(&header)?;

            // metadata
            let metadata = self.metadata.to_bytes()?;
            writer.write_all(&(metadata.len() as u64).to_le_bytes())?;
            writer.write_all(&metadata)?;

            // features
            for feature in &self.features {
                let blob = feature.to_bytes()?;
                writer.write_all(&(blob.len() as u64).to_le_bytes())?;
                writer.write_all(&blob)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        log::info!("Saved binary dataset to {}", path.display());
        Ok(())
    }

    /// Load a binary dataset file written by
    /// [`Dataset::save_binary_file`]. Every declared section size is
    /// validated before its bytes are interpreted.
    pub fn load_binary_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut buffer: Vec<u8> = vec![0; 16 * 1024];

        let header = read_sized_section(&mut file, &mut buffer, "header")?;
        let mut cursor = ByteCursor::new(header);
        let global_num_data = cursor.u64_le("global_num_data")?;
        let is_enable_sparse = cursor.u8("is_enable_sparse")? != 0;
        let max_bin = cursor.i32_le("max_bin")? as u32;
        let num_data = cursor.i32_le("num_data")?;
        let num_features = cursor.i32_le("num_features")? as usize;
        let num_total_features = cursor.i32_le("num_total_features")? as usize;
        let map_len = cursor.u64_le("used_feature_map_len")? as usize;
        let mut used_feature_map = Vec::with_capacity(map_len);
        for _ in 0..map_len {
            used_feature_map.push(cursor.i32_le("used_feature_map")?);
        }
        let mut feature_names = Vec::with_capacity(num_total_features);
        for _ in 0..num_total_features {
            let len = cursor.i32_le("feature name length")? as usize;
            let bytes = cursor.take(len, "feature name")?;
            feature_names.push(String::from_utf8_lossy(bytes).into_owned());
        }

        let metadata_bytes = read_sized_section(&mut file, &mut buffer, "metadata")?;
        let metadata = Metadata::from_bytes(metadata_bytes)?;

        let mut features = Vec::with_capacity(num_features);
        for i in 0..num_features {
            let blob = read_sized_section(&mut file, &mut buffer, &format!("feature {}", i))?;
            features.push(Feature::from_bytes(blob)?);
        }

        let dataset = Dataset {
            num_data,
            global_num_data,
            max_bin,
            is_enable_sparse,
            features,
            used_feature_map,
            num_total_features,
            feature_names,
            metadata,
        };
        dataset.check()?;
        Ok(dataset)
    }
}

/// Read one `u64 size` + payload section, growing the scratch buffer when
/// the declared size exceeds it.
fn read_sized_section<'a>(
    file: &mut File,
    buffer: &'a mut Vec<u8>,
    what: &str,
) -> Result<&'a [u8]> {
    let mut size_bytes = [0u8; 8];
    file.read_exact(&mut size_bytes)
        .map_err(|_| HistGbmError::io_format(format!("truncated before {} size", what)))?;
    let size = u64::from_le_bytes(size_bytes) as usize;
    if size > buffer.len() {
        buffer.resize(size, 0);
    }
    file.read_exact(&mut buffer[..size])
        .map_err(|_| HistGbmError::io_format(format!("truncated inside {}", what)))?;
    Ok(&buffer[..size])
}

/// Bounds-checked little-endian reader over one header section.
struct ByteCursor<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, at: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.at + n > self.data.len() {
            return Err(HistGbmError::io_format(format!(
                "header truncated reading {}",
                what
            )));
        }
        let slice = &self.data[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn i32_le(&mut self, what: &str) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4, what)?.try_into().unwrap()))
    }

    fn u64_le(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8, what)?.try_into().unwrap()))
    }
}

/// Column names and the name -> index map from the header line.
fn header_names(reader: &TextReader) -> (Vec<String>, HashMap<String, usize>) {
    match reader.header() {
        None => (Vec::new(), HashMap::new()),
        Some(line) => {
            let names: Vec<String> = line
                .split(|c| c == ',' || c == '\t' || c == ' ')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            let map = names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.clone(), i))
                .collect();
            (names, map)
        }
    }
}

/// Resolve one `name:<column>` or numeric column spec.
fn resolve_column(
    spec: &str,
    name2idx: &HashMap<String, usize>,
    what: &str,
) -> Result<Option<i32>> {
    if spec.is_empty() {
        return Ok(None);
    }
    if let Some(name) = spec.strip_prefix("name:") {
        match name2idx.get(name) {
            Some(&idx) => {
                log::info!("Using column {} as {}", name, what);
                Ok(Some(idx as i32))
            }
            None => Err(HistGbmError::config(format!(
                "cannot find {} column '{}' in data file",
                what, name
            ))),
        }
    } else {
        let idx: i32 = spec.parse().map_err(|_| {
            HistGbmError::config(format!(
                "{} is not a number; prefix column names with \"name:\"",
                what
            ))
        })?;
        log::info!("Using column {} as {}", idx, what);
        Ok(Some(idx))
    }
}

/// Resolve every column role and shift indices past the label, which is
/// removed from the feature set.
fn resolve_columns(
    config: &Config,
    name2idx: &HashMap<String, usize>,
    num_machines: i32,
) -> Result<ColumnRoles> {
    let label_idx = resolve_column(&config.label_column, name2idx, "label")?.unwrap_or(0);
    let shift = |idx: i32| if idx > label_idx { idx - 1 } else { idx };

    let mut roles = ColumnRoles {
        label_idx,
        weight_idx: -1,
        group_idx: -1,
        ignored: Vec::new(),
    };
    if let Some(idx) = resolve_column(&config.weight_column, name2idx, "weight")? {
        roles.weight_idx = shift(idx);
        roles.ignored.push(roles.weight_idx);
    }
    if let Some(idx) = resolve_column(&config.group_column, name2idx, "group/query id")? {
        roles.group_idx = shift(idx);
        roles.ignored.push(roles.group_idx);
    }
    for spec in config.ignore_column.split(',').filter(|s| !s.is_empty()) {
        if let Some(idx) = resolve_column(spec, name2idx, "ignored")? {
            roles.ignored.push(shift(idx));
        }
    }

    if num_machines > 1 && !config.is_pre_partition && roles.group_idx >= 0 {
        return Err(HistGbmError::config(
            "query/group column in the data file is not supported when training \
             in parallel without pre-partition; use pre-partitioned data",
        ));
    }
    Ok(roles)
}

/// Transpose sampled lines into per-column value vectors. Absent sparse
/// entries stay 0.0, so the sample sees the default value's true mass.
fn transpose_sample(parser: &dyn Parser, sample: &[String]) -> Result<Vec<Vec<f64>>> {
    let mut sample_values: Vec<Vec<f64>> = Vec::new();
    let mut row_features = Vec::new();
    let mut label = 0.0;
    for (i, line) in sample.iter().enumerate() {
        row_features.clear();
        parser.parse_one_line(line, &mut row_features, &mut label)?;
        for column in &mut sample_values {
            column.push(0.0);
        }
        for &(column, value) in &row_features {
            let column = column as usize;
            if column >= sample_values.len() {
                sample_values.resize_with(column + 1, || vec![0.0; i + 1]);
            }
            sample_values[column][i] = value;
        }
    }
    Ok(sample_values)
}

/// Learn bin mappers for every column from the local sample.
fn construct_bin_mappers_local(sample_values: &[Vec<f64>], config: &Config) -> Vec<BinMapper> {
    sample_values
        .par_iter()
        .map(|values| BinMapper::find_bin(values, config.max_bin))
        .collect()
}

/// Distributed binning: each worker learns mappers for a contiguous
/// feature shard from its local sample, then an all-gather of fixed-size
/// records assembles the global set on every worker.
fn construct_bin_mappers_distributed(
    sample_values: &[Vec<f64>],
    config: &Config,
    network: &Network,
) -> Result<Vec<BinMapper>> {
    let num_machines = network.num_machines() as usize;
    let rank = network.rank() as usize;
    let total = sample_values.len();
    let step = ((total + num_machines - 1) / num_machines).max(1);

    let mut start = vec![0usize; num_machines];
    let mut len = vec![0usize; num_machines];
    for i in 0..num_machines {
        start[i] = (step * i).min(total);
        len[i] = step.min(total - start[i]);
    }

    let type_size = BinMapper::size_for(config.max_bin);
    let mut input_buffer = vec![0u8; type_size * len[rank]];
    let local_mappers: Vec<BinMapper> = sample_values[start[rank]..start[rank] + len[rank]]
        .par_iter()
        .map(|values| BinMapper::find_bin(values, config.max_bin))
        .collect();
    for (i, mapper) in local_mappers.iter().enumerate() {
        mapper.copy_to(&mut input_buffer[i * type_size..(i + 1) * type_size])?;
    }

    let block_start: Vec<usize> = start.iter().map(|&s| s * type_size).collect();
    let block_len: Vec<usize> = len.iter().map(|&l| l * type_size).collect();
    let output = network.allgather(&input_buffer, &block_start, &block_len)?;

    (0..total)
        .map(|i| BinMapper::copy_from(&output[i * type_size..(i + 1) * type_size]))
        .collect()
}

/// Row filter keeping whole queries together under rank stratification.
///
/// Returns, for each row, whether this worker keeps it. Every query lands
/// entirely on exactly one worker; the shared seed makes all workers agree.
pub fn query_stratified_assignment(
    query_boundaries: &[DataSize],
    num_data: DataSize,
    num_machines: i32,
    rank: i32,
    random: &mut Random,
) -> Result<Vec<bool>> {
    let num_queries = query_boundaries.len() as DataSize - 1;
    let mut keep = vec![false; num_data as usize];
    let mut qid: i64 = -1;
    let mut is_query_used = false;
    for line_idx in 0..num_data {
        if qid >= num_queries as i64 {
            return Err(HistGbmError::consistency(
                "query id exceeds the range of the query boundaries",
            ));
        }
        if line_idx >= query_boundaries[(qid + 1) as usize] {
            is_query_used = random.next_int(num_machines) == rank;
            qid += 1;
        }
        keep[line_idx as usize] = is_query_used;
    }
    Ok(keep)
}
