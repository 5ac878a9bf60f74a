//! Text row parsing and line-oriented file reading.
//!
//! A [`Parser`] turns one text row into sparse `(column, value)` pairs plus
//! a label; the concrete format (delimited columns or LibSVM `idx:value`
//! pairs) is sniffed from the first data line. The [`TextReader`] feeds
//! parsers with full, filtered, or reservoir-sampled line sets.

use crate::core::error::{HistGbmError, Result};
use crate::core::random::Random;
use crate::core::types::DataSize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Strategy supplying an initial score per row at dataset construction.
pub trait InitScore {
    /// Score for one parsed row.
    fn score(&self, row_features: &[(i32, f64)]) -> f64;
}

/// Parses one text row into `(column, value)` pairs and a label.
pub trait Parser: Send + Sync {
    /// Parse `line`, pushing non-zero column values into `out_features`.
    fn parse_one_line(
        &self,
        line: &str,
        out_features: &mut Vec<(i32, f64)>,
        out_label: &mut f64,
    ) -> Result<()>;

    /// Column index holding the label, -1 when the format has no column
    /// notion (LibSVM).
    fn label_idx(&self) -> i32;
}

/// Delimiter-separated columns with the label at a fixed index.
#[derive(Debug)]
pub struct DelimitedParser {
    delimiter: char,
    label_idx: i32,
}

impl Parser for DelimitedParser {
    fn parse_one_line(
        &self,
        line: &str,
        out_features: &mut Vec<(i32, f64)>,
        out_label: &mut f64,
    ) -> Result<()> {
        let mut feature_idx = 0i32;
        for (col, token) in line.trim_end().split(self.delimiter).enumerate() {
            let value: f64 = token.trim().parse().map_err(|_| {
                HistGbmError::parse(format!("non-numeric token '{}' in column {}", token, col))
            })?;
            if col as i32 == self.label_idx {
                *out_label = value;
            } else {
                if value != 0.0 {
                    out_features.push((feature_idx, value));
                }
                feature_idx += 1;
            }
        }
        Ok(())
    }

    fn label_idx(&self) -> i32 {
        self.label_idx
    }
}

/// LibSVM rows: label first, then `index:value` pairs.
#[derive(Debug)]
pub struct LibsvmParser;

impl Parser for LibsvmParser {
    fn parse_one_line(
        &self,
        line: &str,
        out_features: &mut Vec<(i32, f64)>,
        out_label: &mut f64,
    ) -> Result<()> {
        let mut tokens = line.split_whitespace();
        let label_token = tokens
            .next()
            .ok_or_else(|| HistGbmError::parse("empty row"))?;
        *out_label = label_token
            .parse()
            .map_err(|_| HistGbmError::parse(format!("non-numeric label '{}'", label_token)))?;
        for token in tokens {
            let (idx, value) = token
                .split_once(':')
                .ok_or_else(|| HistGbmError::parse(format!("malformed pair '{}'", token)))?;
            let idx: i32 = idx
                .parse()
                .map_err(|_| HistGbmError::parse(format!("bad feature index '{}'", idx)))?;
            let value: f64 = value
                .parse()
                .map_err(|_| HistGbmError::parse(format!("bad feature value '{}'", value)))?;
            if value != 0.0 {
                out_features.push((idx, value));
            }
        }
        Ok(())
    }

    fn label_idx(&self) -> i32 {
        -1
    }
}

/// Sniff the row format from a sample line and build the matching parser.
pub fn create_parser(sample_line: &str, label_idx: i32) -> Result<Box<dyn Parser>> {
    let trimmed = sample_line.trim();
    if trimmed.is_empty() {
        return Err(HistGbmError::parse("cannot detect format of an empty line"));
    }
    if trimmed.split_whitespace().skip(1).any(|t| t.contains(':')) {
        return Ok(Box::new(LibsvmParser));
    }
    let delimiter = if trimmed.contains('\t') {
        '\t'
    } else if trimmed.contains(',') {
        ','
    } else if trimmed.contains(' ') {
        ' '
    } else {
        return Err(HistGbmError::parse(format!(
            "unrecognized row format: '{}'",
            trimmed
        )));
    };
    Ok(Box::new(DelimitedParser {
        delimiter,
        label_idx: label_idx.max(0),
    }))
}

/// Line-oriented reader over one data file.
#[derive(Debug)]
pub struct TextReader {
    lines: Vec<String>,
    header: Option<String>,
}

impl TextReader {
    /// Read the whole file, splitting off the header when present.
    pub fn new<P: AsRef<Path>>(path: P, has_header: bool) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("cannot open data file {}: {}", path.as_ref().display(), e),
            )
        })?;
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        let header = if has_header && !lines.is_empty() {
            Some(lines.remove(0))
        } else {
            None
        };
        Ok(TextReader { lines, header })
    }

    /// Header line, when the file has one.
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// All data lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of data lines.
    pub fn num_lines(&self) -> DataSize {
        self.lines.len() as DataSize
    }

    /// Keep only the lines admitted by `filter`, returning the original
    /// line count and recording the kept indices.
    pub fn filter_lines<F>(&mut self, mut filter: F, used_indices: &mut Vec<DataSize>) -> DataSize
    where
        F: FnMut(DataSize) -> bool,
    {
        let total = self.lines.len() as DataSize;
        used_indices.clear();
        let mut kept = Vec::new();
        for (idx, line) in self.lines.drain(..).enumerate() {
            if filter(idx as DataSize) {
                used_indices.push(idx as DataSize);
                kept.push(line);
            }
        }
        self.lines = kept;
        total
    }

    /// Reservoir-sample up to `sample_cnt` lines, in original order.
    pub fn sample_lines(&self, random: &mut Random, sample_cnt: usize) -> Vec<String> {
        let picked = random.sample(self.lines.len(), sample_cnt.min(self.lines.len()));
        picked.iter().map(|&i| self.lines[i].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_delimited_parser() {
        let parser = create_parser("1.5,2.0,0.0,3.0", 0).unwrap();
        let mut features = Vec::new();
        let mut label = 0.0;
        parser
            .parse_one_line("1.5,2.0,0.0,3.0", &mut features, &mut label)
            .unwrap();
        assert_eq!(label, 1.5);
        // label column removed, zero value skipped
        assert_eq!(features, vec![(0, 2.0), (2, 3.0)]);
    }

    #[test]
    fn test_tab_delimiter_detection() {
        let parser = create_parser("1\t2\t3", 0).unwrap();
        let mut features = Vec::new();
        let mut label = 0.0;
        parser
            .parse_one_line("1\t2\t3", &mut features, &mut label)
            .unwrap();
        assert_eq!(label, 1.0);
        assert_eq!(features, vec![(0, 2.0), (1, 3.0)]);
    }

    #[test]
    fn test_libsvm_parser() {
        let parser = create_parser("1 3:0.5 7:2.0", 0).unwrap();
        let mut features = Vec::new();
        let mut label = 0.0;
        parser
            .parse_one_line("0 3:0.5 7:2.0", &mut features, &mut label)
            .unwrap();
        assert_eq!(label, 0.0);
        assert_eq!(features, vec![(3, 0.5), (7, 2.0)]);
    }

    #[test]
    fn test_parse_error_reports_token() {
        let parser = create_parser("1,2,3", 0).unwrap();
        let mut features = Vec::new();
        let mut label = 0.0;
        let err = parser
            .parse_one_line("1,abc,3", &mut features, &mut label)
            .unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_text_reader_filter() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "line{}", i).unwrap();
        }
        let mut reader = TextReader::new(file.path(), false).unwrap();
        assert_eq!(reader.num_lines(), 10);

        let mut used = Vec::new();
        let total = reader.filter_lines(|i| i % 3 == 0, &mut used);
        assert_eq!(total, 10);
        assert_eq!(used, vec![0, 3, 6, 9]);
        assert_eq!(reader.lines().len(), 4);
        assert_eq!(reader.lines()[1], "line3");
    }

    #[test]
    fn test_text_reader_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a,b,c").unwrap();
        writeln!(file, "1,2,3").unwrap();
        let reader = TextReader::new(file.path(), true).unwrap();
        assert_eq!(reader.header(), Some("a,b,c"));
        assert_eq!(reader.num_lines(), 1);
    }

    #[test]
    fn test_sample_lines_deterministic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..100 {
            writeln!(file, "{}", i).unwrap();
        }
        let reader = TextReader::new(file.path(), false).unwrap();
        let a = reader.sample_lines(&mut Random::new(5), 10);
        let b = reader.sample_lines(&mut Random::new(5), 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }
}
