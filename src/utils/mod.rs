//! Utility functions for file handling, tables and numeric helpers

pub mod burst_table;
pub mod file_utils;
pub mod misc;

// Re-export commonly used utility functions for convenience
pub use burst_table::{burst_table, bursts_per_cell};
pub use file_utils::*;
