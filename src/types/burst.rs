//! Types describing detected activity

use bon::Builder;
use serde::{Deserialize, Serialize};

/// A single burst: the frames where a transient starts and ends and its peak.
///
/// `start <= peak <= end` and `duration == end - start` always hold for events
/// produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
pub struct BurstEvent {
    pub start: usize,
    pub end: usize,
    pub duration: usize,
    /// Frame of the peak
    pub peak: usize,
    /// Trace value at `peak`
    pub amplitude: f64,
}

impl BurstEvent {
    /// Builds an event from its bounds, deriving the duration
    pub fn spanning(start: usize, peak: usize, end: usize, amplitude: f64) -> Self {
        Self {
            start,
            end,
            duration: end - start,
            peak,
            amplitude,
        }
    }

    /// Trapezoidal area of `trace` over `[start, end)`
    pub fn area(&self, trace: &[f64]) -> f64 {
        let end = self.end.min(trace.len());
        if end <= self.start + 1 {
            return 0.0;
        }
        trace[self.start..end]
            .windows(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .sum()
    }
}

/// A peak reported by a [`crate::fitting::PeakFinder`], with the properties
/// measured while filtering it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
pub struct DetectedPeak {
    pub index: usize,
    pub height: f64,
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
    pub width: f64,
    /// Height at which `width` was measured
    pub width_height: f64,
    /// Interpolated left intersection with `width_height`
    pub left_ips: f64,
    /// Interpolated right intersection with `width_height`
    pub right_ips: f64,
}

impl DetectedPeak {
    /// Integer-floored left edge, the frame reported as the burst start
    pub fn start_frame(&self) -> usize {
        self.left_ips.floor().max(0.0) as usize
    }

    pub fn to_burst_event(&self) -> BurstEvent {
        let start = self.start_frame().min(self.index);
        let end = (self.right_ips.floor().max(0.0) as usize).max(self.index);
        BurstEvent::spanning(start, self.index, end, self.height)
    }
}
