//! Sliding-window burst detection on a single trace

use crate::error::{Result, TraceError};
use crate::fitting::PeakFinder;
use crate::types::burst::{BurstEvent, DetectedPeak};
use crate::types::config::BurstConfig;
use crate::utils::misc::{box_offsets, centered_moving_average, first_argmax, first_argmin};
use itertools::Itertools;
use log::trace;
use ndarray::ArrayView1;

/// Finds bursts as steep rises of the smoothed trend.
///
/// Every window of `window_size` frames whose trend climbs by at least
/// `diff_threshold` from a trough to a later peak nominates that peak. Nearby
/// nominations are merged, and each merged group becomes one event around the
/// highest raw sample in its span.
#[derive(Debug, Clone, Default)]
pub struct BurstDetector {
    config: BurstConfig,
}

/// Run of nominated frames closer than the merge gap
#[derive(Debug, Clone, Copy)]
struct Batch {
    lo: usize,
    hi: usize,
    last: usize,
}

impl BurstDetector {
    pub fn new(config: BurstConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BurstConfig {
        &self.config
    }

    /// Frames nominated by the sliding-window scan, in scan order
    pub fn potential_peaks(&self, trend: &[f64]) -> Vec<usize> {
        let size = self.config.window_size;
        let (first_full, _) = box_offsets(self.config.trend_width);
        let mut nominated = Vec::new();

        let mut left = first_full;
        while left + size <= trend.len() {
            let right = left + size;
            let Some(offset) = first_argmax(&trend[left + 1..right]) else {
                break;
            };
            let peak = left + 1 + offset;
            if let Some(trough) = first_argmin(&trend[left..peak]).map(|t| left + t) {
                if trend[peak] - trend[trough] >= self.config.diff_threshold {
                    nominated.push(peak);
                }
            }
            left += 1;
        }
        nominated
    }

    pub fn find_bursts(&self, trace: ArrayView1<f64>) -> Result<Vec<BurstEvent>> {
        if trace.is_empty() {
            return Err(TraceError::InvalidInputShape("trace is empty".to_string()));
        }
        if self.config.window_size < 2 {
            return Err(TraceError::InvalidInputShape(format!(
                "window size {} leaves no room for a trough before the peak",
                self.config.window_size
            )));
        }
        let data = trace.to_vec();
        let trend = centered_moving_average(&data, self.config.trend_width);
        let nominated = self.potential_peaks(&trend);
        trace!("{} potential peaks", nominated.len());

        // Repeated nominations of one frame always share a batch
        let gap = self.config.merge_gap.max(1);
        let batches = nominated
            .iter()
            .map(|&p| Batch { lo: p, hi: p, last: p })
            .coalesce(|prev, next| {
                if next.last.abs_diff(prev.last) < gap {
                    Ok(Batch {
                        lo: prev.lo.min(next.lo),
                        hi: prev.hi.max(next.hi),
                        last: next.last,
                    })
                } else {
                    Err((prev, next))
                }
            });

        let mut events: Vec<BurstEvent> = batches
            .filter_map(|batch| {
                first_argmax(&data[batch.lo..=batch.hi]).map(|offset| self.expand(&data, batch.lo + offset))
            })
            .collect();
        debug_assert!(events.windows(2).all(|pair| pair[0].peak < pair[1].peak));
        events.sort_by_key(|event| event.start);
        Ok(events)
    }

    /// Walks outward from `peak` to the first frame at or below the crossing
    /// level on each side, stopping at the trace ends.
    fn expand(&self, data: &[f64], peak: usize) -> BurstEvent {
        let level = self.config.crossing_level;
        let last = data.len() - 1;

        let mut start = peak.saturating_sub(1);
        while start > 0 && data[start] > level {
            start -= 1;
        }
        let mut end = (peak + 1).min(last);
        while end < last && data[end] > level {
            end += 1;
        }
        BurstEvent::spanning(start, peak, end, data[peak])
    }
}

/// Lets the trend scanner stand in for the prominence finder in a batch.
/// Intersection points are the expansion frames; prominence is measured
/// against the higher of the two boundary samples.
impl PeakFinder for BurstDetector {
    fn find_peaks(&self, signal: ArrayView1<f64>) -> Result<Vec<DetectedPeak>> {
        let events = self.find_bursts(signal)?;
        Ok(events
            .into_iter()
            .map(|event| DetectedPeak {
                index: event.peak,
                height: event.amplitude,
                prominence: event.amplitude - signal[event.start].max(signal[event.end]),
                left_base: event.start,
                right_base: event.end,
                width: event.duration as f64,
                width_height: self.config.crossing_level,
                left_ips: event.start as f64,
                right_ips: event.end as f64,
            })
            .collect())
    }
}
