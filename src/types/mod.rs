//! Type definitions for configuration, detected activity and NPY headers

pub mod burst;
pub mod config;
pub mod npy_header;

// Re-export the main types for convenience
pub use burst::{BurstEvent, DetectedPeak};
pub use config::{
    BaselineConfig, BurstConfig, DeconvolutionConfig, DenoiseConfig, PeakFinderConfig,
    PipelineConfig, PreservationWindow,
};
pub use npy_header::{NpyDtype, NpyHeader};
