//! Output module for reporting on the sink
//!
//! This module handles the read-only statistics printed by `--stats`. The
//! pipeline itself never reads back from the sink.

pub mod stats;

pub use stats::{load_statistics, print_statistics, SinkStatistics};
