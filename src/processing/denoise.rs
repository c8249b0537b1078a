//! Baseline subtraction with windowed preservation of transients.
//!
//! A raw trace is compared against its fitted baseline. Frames rising above
//! the baseline by more than `noise_floor_multiplier` times the deepest dip
//! are significant, and the raw signal is restored in a window around each of
//! them. The resulting dF/F is thresholded, then restored again in a second,
//! wider window around every frame that survived the threshold.

use crate::error::{Result, TraceError};
use crate::fitting::BaselineEstimator;
use crate::processing::budget::CellBudget;
use crate::types::config::{DenoiseConfig, PreservationWindow};
use bon::bon;
use log::trace;
use ndarray::{Array1, ArrayView1, Zip};

/// Output of [`DenoisingPipeline::denoise`]; all arrays have the trace length
#[derive(Debug, Clone, PartialEq)]
pub struct DenoisedSignal {
    pub baseline: Array1<f64>,
    /// `F_denoised - baseline`
    pub delta_f: Array1<f64>,
    /// Thresholded and re-preserved dF/F
    pub relative_intensity: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct DenoisingPipeline<B> {
    estimator: B,
    config: DenoiseConfig,
}

#[bon]
impl<B: BaselineEstimator> DenoisingPipeline<B> {
    #[builder]
    pub fn new(estimator: B, #[builder(default)] config: DenoiseConfig) -> Self {
        Self { estimator, config }
    }

    pub fn config(&self) -> &DenoiseConfig {
        &self.config
    }

    pub fn estimator(&self) -> &B {
        &self.estimator
    }

    pub fn denoise(&self, raw: ArrayView1<f64>) -> Result<DenoisedSignal> {
        self.denoise_with_budget(raw, &CellBudget::unlimited())
    }

    /// Like [`Self::denoise`], checking `budget` after the baseline fit
    pub fn denoise_with_budget(&self, raw: ArrayView1<f64>, budget: &CellBudget) -> Result<DenoisedSignal> {
        if raw.is_empty() {
            return Err(TraceError::InvalidInputShape("trace is empty".to_string()));
        }
        if let Some(index) = raw.iter().position(|v| !v.is_finite()) {
            return Err(TraceError::InvalidInputShape(format!("non-finite sample at frame {index}")));
        }

        let baseline = self.estimator.estimate(raw)?;
        budget.check()?;
        self.denoise_with_baseline(raw, baseline)
    }

    /// Runs every step after the baseline fit against a precomputed baseline
    pub fn denoise_with_baseline(&self, raw: ArrayView1<f64>, baseline: Array1<f64>) -> Result<DenoisedSignal> {
        let len = raw.len();
        if baseline.len() != len {
            return Err(TraceError::InvalidInputShape(format!(
                "baseline has {} frames, trace has {len}",
                baseline.len()
            )));
        }

        let residual = &raw - &baseline;
        let noise_floor = residual.iter().cloned().fold(f64::INFINITY, f64::min).abs();
        let margin = self.config.noise_floor_multiplier * noise_floor;

        // Frames at or below the baseline stay on it
        let mut f_denoised = baseline.clone();

        let significant: Vec<bool> = Zip::from(&raw)
            .and(&baseline)
            .map_collect(|&r, &b| r - (b + margin) > 0.0)
            .to_vec();
        if significant.iter().any(|&s| s) {
            Zip::from(&mut f_denoised)
                .and(&raw)
                .and(&significant[..])
                .for_each(|f, &r, &s| {
                    if s {
                        *f = r;
                    }
                });
        } else {
            // No transient at all: everything falls back to the baseline
            f_denoised.assign(&baseline);
        }
        trace!(
            "{} of {len} frames above noise floor {noise_floor:.4}",
            significant.iter().filter(|&&s| s).count()
        );

        let preserved = preserve_windows(
            baseline.view(),
            raw,
            |m| f_denoised[m] != baseline[m],
            self.config.intensity_window,
        );
        Zip::from(&mut f_denoised).and(&preserved).for_each(|f, &p| {
            if p != *f {
                *f = p;
            }
        });

        if let Some((index, &value)) = baseline
            .iter()
            .enumerate()
            .find(|(_, b)| b.abs() <= self.config.min_baseline_magnitude)
        {
            return Err(TraceError::DegenerateBaseline { index, value });
        }

        let delta_f = &f_denoised - &baseline;
        let relative = &delta_f / &baseline;

        let threshold = self.config.relative_threshold;
        let mut filtered = relative.mapv(|v| if v < threshold { 0.0 } else { v });

        let zeros = Array1::zeros(len);
        let preserved = preserve_windows(
            zeros.view(),
            relative.view(),
            |m| filtered[m] != 0.0,
            self.config.relative_window,
        );
        Zip::from(&mut filtered).and(&preserved).for_each(|f, &p| {
            if p != *f {
                *f = p;
            }
        });

        Ok(DenoisedSignal {
            baseline,
            delta_f,
            relative_intensity: filtered,
        })
    }
}

/// Starts from `fill` and copies `source` into the clipped window around every
/// frame for which `is_significant` holds.
fn preserve_windows(
    fill: ArrayView1<f64>,
    source: ArrayView1<f64>,
    is_significant: impl Fn(usize) -> bool,
    window: PreservationWindow,
) -> Array1<f64> {
    let len = fill.len();
    let mut preserved = fill.to_owned();
    // Windows only move right, so overlaps are copied once
    let mut copied_until = 0;
    for m in (0..len).filter(|&m| is_significant(m)) {
        let range = window.range(m, len);
        let start = range.start.max(copied_until);
        if start < range.end {
            for j in start..range.end {
                preserved[j] = source[j];
            }
            copied_until = range.end;
        }
    }
    preserved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::ModPolyBaseline;

    struct ConstantBaseline(f64);

    impl BaselineEstimator for ConstantBaseline {
        fn estimate(&self, trace: ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(trace.len(), self.0))
        }
    }

    /// Returns the trace itself as its baseline
    struct EchoBaseline;

    impl BaselineEstimator for EchoBaseline {
        fn estimate(&self, trace: ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(trace.to_owned())
        }
    }

    /// Baseline of 10 that drops to zero on frames 40..60
    struct GappedBaseline;

    impl BaselineEstimator for GappedBaseline {
        fn estimate(&self, trace: ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_shape_fn(trace.len(), |i| if (40..60).contains(&i) { 0.0 } else { 10.0 }))
        }
    }

    struct TruncatedBaseline;

    impl BaselineEstimator for TruncatedBaseline {
        fn estimate(&self, trace: ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(trace.len().saturating_sub(1), 1.0))
        }
    }

    fn bump_trace() -> Array1<f64> {
        Array1::from_shape_fn(1000, |i| {
            let d = i as f64 - 500.0;
            let bump = if d.abs() <= 15.0 {
                2.5 * (1.0 + (std::f64::consts::PI * d / 15.0).cos())
            } else {
                0.0
            };
            10.0 + bump
        })
    }

    fn nonzero_frames(values: &Array1<f64>) -> Vec<usize> {
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_trace_on_baseline_yields_zeros() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let raw = Array1::from_shape_fn(300, |i| 5.0 + (i as f64 * 0.01).sin());
        let pipeline = DenoisingPipeline::builder().estimator(EchoBaseline).build();
        let result = pipeline.denoise(raw.view())?;
        assert_eq!(result.delta_f.len(), raw.len());
        assert_eq!(result.relative_intensity.len(), raw.len());
        assert!(result.delta_f.iter().all(|&v| v == 0.0));
        assert!(result.relative_intensity.iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn test_no_transient_resets_to_baseline() -> std::result::Result<(), Box<dyn std::error::Error>> {
        // Alternating ±0.1 never exceeds 1.3× its own deepest dip
        let raw = Array1::from_shape_fn(200, |i| if i % 2 == 0 { 10.1 } else { 9.9 });
        let pipeline = DenoisingPipeline::builder().estimator(ConstantBaseline(10.0)).build();
        let result = pipeline.denoise(raw.view())?;
        assert!(result.delta_f.iter().all(|&v| v == 0.0));
        assert!(result.relative_intensity.iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn test_preservation_window_widths() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut raw = Array1::from_elem(300, 10.01);
        raw[100] = 20.0;
        let pipeline = DenoisingPipeline::builder().estimator(ConstantBaseline(10.0)).build();
        let result = pipeline.denoise(raw.view())?;

        let restored = nonzero_frames(&result.delta_f);
        assert_eq!(restored.len(), 61);
        assert_eq!((restored[0], restored[60]), (80, 140));
        assert!((result.delta_f[100] - 10.0).abs() < 1e-12);

        // dF/F of the restored shoulders is below threshold, so only frame 100 survives it
        // and the second window can only re-add what the first restored
        let relative = nonzero_frames(&result.relative_intensity);
        assert_eq!((relative[0], relative[relative.len() - 1]), (80, 140));
        Ok(())
    }

    #[test]
    fn test_relative_window_width() -> std::result::Result<(), Box<dyn std::error::Error>> {
        // Small significant blips every 30 frames restore the whole trace in the first pass
        let mut raw = Array1::from_shape_fn(300, |i| if i % 30 == 0 { 10.02 } else { 10.01 });
        raw[100] = 20.0;
        let pipeline = DenoisingPipeline::builder().estimator(ConstantBaseline(10.0)).build();
        let result = pipeline.denoise(raw.view())?;

        assert_eq!(nonzero_frames(&result.delta_f).len(), 300);
        let relative = nonzero_frames(&result.relative_intensity);
        assert_eq!(relative.len(), 71);
        assert_eq!((relative[0], relative[70]), (80, 150));
        Ok(())
    }

    #[test]
    fn test_windows_clip_at_trace_edges() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut raw = Array1::from_elem(120, 10.01);
        raw[5] = 20.0;
        raw[115] = 20.0;
        let pipeline = DenoisingPipeline::builder().estimator(ConstantBaseline(10.0)).build();
        let result = pipeline.denoise(raw.view())?;

        let restored = nonzero_frames(&result.delta_f);
        assert_eq!(restored.first(), Some(&0));
        assert_eq!(restored.last(), Some(&119));
        // [0, 45] and [95, 119]
        assert_eq!(restored.len(), 46 + 25);
        Ok(())
    }

    #[test]
    fn test_zero_baseline_span_is_rejected() {
        let raw = Array1::from_elem(100, 10.0);
        let pipeline = DenoisingPipeline::builder().estimator(GappedBaseline).build();
        match pipeline.denoise(raw.view()) {
            Err(TraceError::DegenerateBaseline { index, value }) => {
                assert_eq!(index, 40);
                assert_eq!(value, 0.0);
            }
            other => panic!("expected DegenerateBaseline, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let pipeline = DenoisingPipeline::builder().estimator(ConstantBaseline(1.0)).build();
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(pipeline.denoise(empty.view()), Err(TraceError::InvalidInputShape(_))));
        let nan = Array1::from_vec(vec![1.0, f64::NAN]);
        assert!(matches!(pipeline.denoise(nan.view()), Err(TraceError::InvalidInputShape(_))));

        let truncated = DenoisingPipeline::builder().estimator(TruncatedBaseline).build();
        let raw = Array1::from_elem(10, 1.0);
        assert!(matches!(truncated.denoise(raw.view()), Err(TraceError::InvalidInputShape(_))));
    }

    #[test]
    fn test_expired_budget_stops_after_baseline() {
        let pipeline = DenoisingPipeline::builder().estimator(ConstantBaseline(1.0)).build();
        let raw = Array1::from_elem(10, 1.0);
        let budget = CellBudget::starting_now(Some(0), None);
        let result = pipeline.denoise_with_budget(raw.view(), &budget);
        assert!(matches!(result, Err(TraceError::TimedOut { .. })));
    }

    #[test]
    fn test_bump_is_isolated() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let raw = bump_trace();
        let pipeline = DenoisingPipeline::builder().estimator(ModPolyBaseline::default()).build();
        let result = pipeline.denoise(raw.view())?;

        let peak = result
            .delta_f
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((495..=505).contains(&peak.0));
        assert!((peak.1 - 5.0).abs() < 0.1);

        let active = nonzero_frames(&result.relative_intensity);
        assert!(!active.is_empty());
        assert!(active.iter().all(|&i| (460..=570).contains(&i)));
        Ok(())
    }

    #[test]
    fn test_repeated_runs_are_identical() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let raw = bump_trace();
        let pipeline = DenoisingPipeline::builder().estimator(ModPolyBaseline::default()).build();
        let first = pipeline.denoise(raw.view())?;
        let second = pipeline.denoise(raw.view())?;
        assert_eq!(first, second);
        Ok(())
    }
}
