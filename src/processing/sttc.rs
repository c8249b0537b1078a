//! Spike time tiling coefficient (Cutts & Eglen, 2014) between burst trains.
//!
//! Trains are event times in seconds, sorted ascending. The coefficient is
//! insensitive to firing rate and lies in `[-1, 1]`; it is NaN when either
//! train is empty.

use crate::utils::misc::percentile;
use ndarray::{Array2, ArrayView2};

/// Start and end of the recording in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingSpan {
    pub start: f64,
    pub end: f64,
}

impl RecordingSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Total time within `dt` of any event, clipped to the recording
fn tiled_time(train: &[f64], dt: f64, span: RecordingSpan) -> f64 {
    let (Some(&first), Some(&last)) = (train.first(), train.last()) else {
        return 0.0;
    };
    let mut covered = 2.0 * train.len() as f64 * dt;

    if train.len() == 1 {
        if first - span.start < dt {
            covered -= span.start - first + dt;
        } else if first + dt > span.end {
            covered -= first + dt - span.end;
        }
        return covered;
    }

    for pair in train.windows(2) {
        let gap = pair[1] - pair[0];
        if gap < 2.0 * dt {
            covered -= 2.0 * dt - gap;
        }
    }
    if first - span.start < dt {
        covered -= span.start - first + dt;
    }
    if span.end - last < dt {
        covered -= last + dt - span.end;
    }
    covered
}

/// Number of events in `a` within `dt` of some event in `b`
fn coincidences(a: &[f64], b: &[f64], dt: f64) -> usize {
    let mut count = 0;
    let mut j = 0;
    for &t in a {
        while j < b.len() {
            if (t - b[j]).abs() <= dt {
                count += 1;
                break;
            } else if b[j] > t {
                break;
            }
            j += 1;
        }
    }
    count
}

pub fn sttc(a: &[f64], b: &[f64], dt: f64, span: RecordingSpan) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::NAN;
    }
    let ta = tiled_time(a, dt, span) / span.duration();
    let tb = tiled_time(b, dt, span) / span.duration();
    let pa = coincidences(a, b, dt) as f64 / a.len() as f64;
    let pb = coincidences(b, a, dt) as f64 / b.len() as f64;
    0.5 * (pa - tb) / (1.0 - tb * pa) + 0.5 * (pb - ta) / (1.0 - ta * pb)
}

/// Event times of one row of a NaN-padded frame matrix, in seconds
pub fn train_from_frames(row: impl IntoIterator<Item = f64>, frames_to_time: f64) -> Vec<f64> {
    let mut train: Vec<f64> = row
        .into_iter()
        .filter(|v| !v.is_nan())
        .map(|frame| frame * frames_to_time)
        .collect();
    train.sort_by(|a, b| a.total_cmp(b));
    train
}

/// Pairwise coefficient between every pair of rows of a burst-start matrix
pub fn sttc_matrix(
    peak_start_frames: ArrayView2<f64>,
    frames_to_time: f64,
    dt: f64,
    span: RecordingSpan,
) -> Array2<f64> {
    let trains: Vec<Vec<f64>> = peak_start_frames
        .rows()
        .into_iter()
        .map(|row| train_from_frames(row.iter().copied(), frames_to_time))
        .collect();
    let n = trains.len();

    let row_values = |i: usize| -> Vec<f64> { (0..n).map(|j| sttc(&trains[i], &trains[j], dt, span)).collect() };

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<f64>> = {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(row_values).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<f64>> = (0..n).map(row_values).collect();

    Array2::from_shape_fn((n, n), |(i, j)| rows[i][j])
}

/// Rotates event times by `shift` seconds, wrapping around the recording
pub fn circular_shift(train: &[f64], shift: f64, span: RecordingSpan) -> Vec<f64> {
    let duration = span.duration();
    let mut shifted: Vec<f64> = train
        .iter()
        .map(|&t| span.start + (t - span.start + shift).rem_euclid(duration))
        .collect();
    shifted.sort_by(|a, b| a.total_cmp(b));
    shifted
}

/// `percentile` of the coefficient between `a` and circularly shifted copies of `b`.
///
/// Pairs whose observed coefficient exceeds this are unlikely to be correlated
/// by chance. `None` if no shifted copy gives a finite coefficient.
pub fn surrogate_threshold(
    a: &[f64],
    b: &[f64],
    dt: f64,
    span: RecordingSpan,
    shifts: &[f64],
    q: f64,
) -> Option<f64> {
    let values: Vec<f64> = shifts
        .iter()
        .map(|&shift| sttc(a, &circular_shift(b, shift, span), dt, span))
        .filter(|v| v.is_finite())
        .collect();
    percentile(&values, q)
}
