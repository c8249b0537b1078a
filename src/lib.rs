//! Denoising, burst detection and burst alignment for calcium imaging traces.
//!
//! A recording is a cells × frames fluorescence matrix. Every row is denoised
//! against a fitted baseline, deconvolved into calcium and spikes, and searched
//! for transients; the burst start frames of all cells are collected into one
//! NaN-padded matrix.

pub mod error;
pub mod fitting;
pub mod parser;
pub mod processing;
#[cfg(feature = "python")]
mod python;
pub mod recording;
pub mod types;
pub mod utils;

pub use error::{Result, TraceError};
pub use processing::{BatchAligner, BatchResult, BurstDetector, DenoisingPipeline};
pub use recording::{Suite2pFolder, process_folder};
pub use types::{BurstEvent, PipelineConfig};
