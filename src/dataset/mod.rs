//! Dataset layer: feature binning, bin storage, metadata, parsing, and
//! dataset construction.

pub mod bin_data;
pub mod bin_mapper;
#[allow(clippy::module_inception)]
pub mod dataset;
pub mod feature;
pub mod metadata;
pub mod ordered_bin;
pub mod parser;

pub use bin_data::BinData;
pub use bin_mapper::BinMapper;
pub use dataset::{query_stratified_assignment, Dataset};
pub use feature::Feature;
pub use metadata::Metadata;
pub use ordered_bin::OrderedBin;
pub use parser::{create_parser, InitScore, Parser, TextReader};
