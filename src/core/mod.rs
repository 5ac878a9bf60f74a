//! Core infrastructure: scalar types, errors, configuration, randomness.

pub mod config;
pub mod error;
pub mod random;
pub mod types;

pub use config::{Config, ConfigBuilder};
pub use error::{HistGbmError, Result};
pub use random::Random;
