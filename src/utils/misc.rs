use ndarray::Array1;

/// Offsets `(before, after)` of a centered box filter of `width` frames.
///
/// Matches the alignment of a `[0; w] ++ [1; w] ++ [0; w]` kernel under
/// "same"-mode convolution, so even widths lean one frame to the left.
pub fn box_offsets(width: usize) -> (usize, usize) {
    let width = width.max(1);
    let center = (3 * width - 1) / 2;
    (2 * width - 1 - center, center - width)
}

/// Centered moving average with zeros beyond the trace bounds.
/// The divisor is always `width`, so frames near the edges are pulled toward zero.
pub fn centered_moving_average(trace: &[f64], width: usize) -> Vec<f64> {
    let width = width.max(1);
    let (before, after) = box_offsets(width);
    let mut prefix = Vec::with_capacity(trace.len() + 1);
    prefix.push(0.0);
    for value in trace {
        prefix.push(prefix[prefix.len() - 1] + value);
    }

    (0..trace.len())
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(trace.len());
            (prefix[hi] - prefix[lo]) / width as f64
        })
        .collect()
}

/// Index of the first maximum, `None` for an empty slice
pub fn first_argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the first minimum, `None` for an empty slice
pub fn first_argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if v >= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Percentile with linear interpolation between closest ranks (`q` in `[0, 100]`)
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Time of each frame: `frames_to_time * i`
pub fn time_points(num_frames: usize, frames_to_time: f64) -> Array1<f64> {
    Array1::from_iter((0..num_frames).map(|i| i as f64 * frames_to_time))
}
