//! Per-cell driver aggregating every cell of a recording into fixed-shape matrices

use crate::error::{Result, TraceError};
use crate::fitting::{
    BaselineEstimator, Deconvolution, ModPolyBaseline, OasisDeconvolver, PeakFinder,
    ProminencePeakFinder, SpikeDeconvolver,
};
use crate::processing::budget::CellBudget;
use crate::processing::denoise::{DenoisedSignal, DenoisingPipeline};
use crate::types::burst::{BurstEvent, DetectedPeak};
use crate::types::config::PipelineConfig;
use crate::utils::misc::time_points;
use bon::bon;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Everything computed for one successfully processed cell
#[derive(Debug, Clone)]
pub struct CellAnalysis {
    pub signal: DenoisedSignal,
    pub deconvolution: Deconvolution,
    /// `offset + calcium`
    pub denoised: Array1<f64>,
    pub peaks: Vec<DetectedPeak>,
    pub bursts: Vec<BurstEvent>,
    /// Frames whose spike amplitude exceeds the spike threshold
    pub selected_spikes: Vec<usize>,
}

impl CellAnalysis {
    /// Floored left intersection of every peak, in peak order
    pub fn burst_starts(&self) -> Vec<usize> {
        self.peaks.iter().map(DetectedPeak::start_frame).collect()
    }
}

#[derive(Debug)]
pub struct CellReport {
    pub cell: usize,
    pub outcome: Result<CellAnalysis>,
}

impl CellReport {
    pub fn analysis(&self) -> Option<&CellAnalysis> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TraceError> {
        self.outcome.as_ref().err()
    }
}

/// Aggregated output of [`BatchAligner::process_batch`]
#[derive(Debug)]
pub struct BatchResult {
    /// cells × frames; failed cells are all-NaN
    pub denoised: Array2<f64>,
    /// cells × max bursts, left-aligned and NaN-padded
    pub peak_start_frames: Array2<f64>,
    pub time_points: Array1<f64>,
    pub cells: Vec<CellReport>,
}

impl BatchResult {
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn max_bursts(&self) -> usize {
        self.peak_start_frames.ncols()
    }

    pub fn failed_cells(&self) -> Vec<usize> {
        self.cells
            .iter()
            .filter(|report| report.outcome.is_err())
            .map(|report| report.cell)
            .collect()
    }
}

/// Runs denoise → deconvolve → peak finding on every row of a recording.
///
/// Cells are independent: a failing cell is logged and left as NaN rows
/// without affecting the others.
#[derive(Debug, Clone)]
pub struct BatchAligner<B, D, P> {
    pipeline: DenoisingPipeline<B>,
    deconvolver: D,
    peak_finder: P,
    spike_threshold: f64,
    cell_timeout_ms: Option<u64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl BatchAligner<ModPolyBaseline, OasisDeconvolver, ProminencePeakFinder> {
    /// Default collaborators parameterised by `config`
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::builder()
            .pipeline(
                DenoisingPipeline::builder()
                    .estimator(ModPolyBaseline::new(config.baseline))
                    .config(config.denoise)
                    .build(),
            )
            .deconvolver(OasisDeconvolver::new(config.deconvolution))
            .peak_finder(ProminencePeakFinder::new(config.peaks))
            .spike_threshold(config.spike_threshold)
            .maybe_cell_timeout_ms(config.cell_timeout_ms)
            .build()
    }
}

#[bon]
impl<B, D, P> BatchAligner<B, D, P>
where
    B: BaselineEstimator,
    D: SpikeDeconvolver,
    P: PeakFinder,
{
    #[builder]
    pub fn new(
        pipeline: DenoisingPipeline<B>,
        deconvolver: D,
        peak_finder: P,
        #[builder(default = 0.015)] spike_threshold: f64,
        cell_timeout_ms: Option<u64>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            pipeline,
            deconvolver,
            peak_finder,
            spike_threshold,
            cell_timeout_ms,
            cancel,
        }
    }

    /// Processes a single trace under a fresh per-cell budget
    pub fn process_cell(&self, raw: ArrayView1<f64>) -> Result<CellAnalysis> {
        let budget = CellBudget::starting_now(self.cell_timeout_ms, self.cancel.clone());
        budget.check()?;

        let signal = self.pipeline.denoise_with_budget(raw, &budget)?;
        budget.check()?;

        let deconvolution = self.deconvolver.deconvolve(signal.relative_intensity.view())?;
        budget.check()?;

        let denoised = deconvolution.denoised();
        let peaks = self.peak_finder.find_peaks(denoised.view())?;
        let bursts = peaks.iter().map(DetectedPeak::to_burst_event).collect();
        let selected_spikes = deconvolution.spikes_above(self.spike_threshold);

        Ok(CellAnalysis {
            signal,
            deconvolution,
            denoised,
            peaks,
            bursts,
            selected_spikes,
        })
    }

    fn report(&self, cell: usize, raw: ArrayView1<f64>) -> CellReport {
        let outcome = self.process_cell(raw);
        match &outcome {
            Ok(analysis) => debug!("cell {cell}: {} bursts", analysis.peaks.len()),
            Err(e) => warn!("cell {cell} failed: {e}"),
        }
        CellReport { cell, outcome }
    }

    /// Processes every row of `raw` (cells × frames).
    ///
    /// `frames_to_time` scales frame indices into the returned time points.
    pub fn process_batch(&self, raw: ArrayView2<f64>, frames_to_time: f64) -> BatchResult {
        let (num_cells, num_frames) = raw.dim();
        info!("processing {num_cells} cells × {num_frames} frames");

        #[cfg(feature = "parallel")]
        let cells: Vec<CellReport> = {
            use rayon::prelude::*;
            (0..num_cells)
                .into_par_iter()
                .map(|cell| self.report(cell, raw.row(cell)))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let cells: Vec<CellReport> = (0..num_cells)
            .map(|cell| self.report(cell, raw.row(cell)))
            .collect();

        let max_bursts = cells
            .iter()
            .filter_map(CellReport::analysis)
            .map(|analysis| analysis.peaks.len())
            .max()
            .unwrap_or(0);

        let mut denoised = Array2::from_elem((num_cells, num_frames), f64::NAN);
        let mut peak_start_frames = Array2::from_elem((num_cells, max_bursts), f64::NAN);
        for report in &cells {
            let Some(analysis) = report.analysis() else {
                continue;
            };
            denoised.row_mut(report.cell).assign(&analysis.denoised);
            for (slot, start) in analysis.burst_starts().into_iter().enumerate() {
                peak_start_frames[[report.cell, slot]] = start as f64;
            }
        }

        let failed = cells.iter().filter(|report| report.outcome.is_err()).count();
        info!("{} cells processed, {failed} failed, at most {max_bursts} bursts per cell", num_cells - failed);

        BatchResult {
            denoised,
            peak_start_frames,
            time_points: time_points(num_frames, frames_to_time),
            cells,
        }
    }
}
