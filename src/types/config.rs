//! Tunable parameters for every stage of the pipeline.
//!
//! All defaults are the constants the analysis has historically been run with.
//! Each struct deserializes with missing fields falling back to those defaults,
//! so a JSON file only needs to name what it overrides.

use crate::error::Result;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Polynomial baseline fit settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct BaselineConfig {
    #[builder(default = 3)]
    pub poly_order: usize,
    /// Clipping threshold in units of the residual standard deviation
    #[builder(default = 0.7)]
    pub num_std: f64,
    #[builder(default = 250)]
    pub max_iter: usize,
    #[builder(default = 1e-3)]
    pub tol: f64,
    #[builder(default = true)]
    pub mask_initial_peaks: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Span of frames restored around a significant frame `m`: `[m - before, m + after]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct PreservationWindow {
    pub before: usize,
    pub after: usize,
}

impl PreservationWindow {
    /// Number of frames covered when the window is not clipped
    pub fn width(&self) -> usize {
        self.before + self.after + 1
    }

    /// Clipped half-open range `[max(0, m - before), min(len, m + after + 1))`
    pub fn range(&self, m: usize, len: usize) -> std::ops::Range<usize> {
        m.saturating_sub(self.before)..(m + self.after + 1).min(len)
    }
}

/// Masking and preservation settings for [`crate::processing::DenoisingPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct DenoiseConfig {
    #[builder(default = 1.3)]
    pub noise_floor_multiplier: f64,
    #[builder(default = PreservationWindow { before: 20, after: 40 })]
    pub intensity_window: PreservationWindow,
    #[builder(default = PreservationWindow { before: 20, after: 50 })]
    pub relative_window: PreservationWindow,
    /// dF/F values below this are zeroed before the second preservation pass
    #[builder(default = 0.05)]
    pub relative_threshold: f64,
    /// Baseline magnitudes at or below this are treated as zero
    #[builder(default = 1e-12)]
    pub min_baseline_magnitude: f64,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// OASIS AR(1) deconvolution settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct DeconvolutionConfig {
    /// Fixed decay factor; estimated from the autocovariance when `None`
    pub gamma: Option<f64>,
    #[builder(default = 0.95)]
    pub default_gamma: f64,
    #[builder(default = 0.01)]
    pub gamma_min: f64,
    #[builder(default = 0.999)]
    pub gamma_max: f64,
    /// Percentile of the signal used as the initial offset
    #[builder(default = 15.0)]
    pub offset_percentile: f64,
    #[builder(default = 40)]
    pub lambda_iterations: usize,
}

impl Default for DeconvolutionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Filters applied by [`crate::fitting::ProminencePeakFinder`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct PeakFinderConfig {
    #[builder(default = 0.0015)]
    pub height: f64,
    #[builder(default = 17.0)]
    pub width: f64,
    #[builder(default = 50)]
    pub distance: usize,
    #[builder(default = 0.0015)]
    pub prominence: f64,
    #[builder(default = 0.95)]
    pub rel_height: f64,
    /// Window length limiting the prominence search
    #[builder(default = 180)]
    pub wlen: usize,
}

impl Default for PeakFinderConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Sliding-window burst scanner settings for [`crate::processing::BurstDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct BurstConfig {
    #[builder(default = 20)]
    pub window_size: usize,
    #[builder(default = 10)]
    pub merge_gap: usize,
    #[builder(default = 4.0)]
    pub diff_threshold: f64,
    /// Width of the box filter producing the trend
    #[builder(default = 10)]
    pub trend_width: usize,
    /// Raw-trace level at which the start/end expansion stops
    #[builder(default = 0.0)]
    pub crossing_level: f64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Complete configuration for a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct PipelineConfig {
    #[builder(default)]
    pub baseline: BaselineConfig,
    #[builder(default)]
    pub denoise: DenoiseConfig,
    #[builder(default)]
    pub deconvolution: DeconvolutionConfig,
    #[builder(default)]
    pub peaks: PeakFinderConfig,
    #[builder(default)]
    pub bursts: BurstConfig,
    /// Spike amplitudes above this are reported as selected spikes
    #[builder(default = 0.015)]
    pub spike_threshold: f64,
    /// Wall-clock budget per cell in milliseconds
    pub cell_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
