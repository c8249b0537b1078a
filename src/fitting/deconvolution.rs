//! Spike deconvolution of relative-intensity signals.
//!
//! [`OasisDeconvolver`] solves the AR(1) problem
//!
//! minimize ||y - b - c||² + λ||s||₁
//!
//! subject to c\[t\] = γ·c\[t-1\] + s\[t\], s\[t\] ≥ 0, c ≥ 0
//!
//! with the pool-based active set method (Friedrich et al., 2017) over the
//! whole trace at once. The noise level, offset `b` and decay `γ` are estimated
//! from the signal; `λ` is the largest penalty whose residual stays within the
//! noise budget `σ²·T`.

use crate::error::{Result, TraceError};
use crate::types::config::DeconvolutionConfig;
use crate::utils::misc::{median, percentile};
use ndarray::{Array1, ArrayView1};

/// Output of a [`SpikeDeconvolver`]
#[derive(Debug, Clone, PartialEq)]
pub struct Deconvolution {
    /// Smoothed calcium component, offset removed
    pub calcium: Array1<f64>,
    pub spikes: Array1<f64>,
    pub offset: f64,
    /// AR(1) decay factor
    pub gamma: f64,
    /// Sparsity penalty used in the final solve
    pub lambda: f64,
    /// Estimated noise standard deviation
    pub noise: f64,
}

impl Deconvolution {
    /// `offset + calcium`, the denoised trace fed to peak finding
    pub fn denoised(&self) -> Array1<f64> {
        &self.calcium + self.offset
    }

    /// Frames whose spike amplitude is above `threshold`
    pub fn spikes_above(&self, threshold: f64) -> Vec<usize> {
        self.spikes
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s > threshold)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Reconstructs a smoothed trace and a spike train from a relative-intensity signal
pub trait SpikeDeconvolver: Send + Sync {
    fn deconvolve(&self, signal: ArrayView1<f64>) -> Result<Deconvolution>;
}

/// Run of frames sharing one exponentially decaying calcium value
#[derive(Debug, Clone, Copy)]
struct Pool {
    value: f64,
    weight: f64,
    start: usize,
    len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OasisDeconvolver {
    config: DeconvolutionConfig,
}

impl OasisDeconvolver {
    pub fn new(config: DeconvolutionConfig) -> Self {
        Self { config }
    }

    /// Noise estimate from first differences, robust to sparse transients
    fn estimate_noise(y: ArrayView1<f64>) -> f64 {
        let diffs: Vec<f64> = y.windows(2).into_iter().map(|w| (w[1] - w[0]).abs()).collect();
        median(&diffs).map_or(0.0, |m| m / (0.6745 * std::f64::consts::SQRT_2))
    }

    fn estimate_gamma(&self, y: ArrayView1<f64>, noise: f64) -> f64 {
        if let Some(gamma) = self.config.gamma {
            return gamma;
        }
        let len = y.len();
        if len < 3 {
            return self.config.default_gamma;
        }
        let mean = y.mean().unwrap_or(0.0);
        let centered = y.mapv(|v| v - mean);
        let acov0 = centered.dot(&centered) / len as f64;
        let acov1 = centered
            .slice(ndarray::s![1..])
            .dot(&centered.slice(ndarray::s![..len - 1]))
            / len as f64;
        let denom = acov0 - noise * noise;
        let gamma = acov1 / denom;
        if denom <= 0.0 || !gamma.is_finite() || gamma <= 0.0 {
            self.config.default_gamma
        } else {
            gamma.clamp(self.config.gamma_min, self.config.gamma_max)
        }
    }

    /// Pool-adjacent-violators pass for a fixed `gamma` and `lambda`
    fn solve(y: &[f64], gamma: f64, lambda: f64) -> Vec<f64> {
        let len = y.len();
        let mut pools: Vec<Pool> = Vec::with_capacity(len);

        for (t, &value) in y.iter().enumerate() {
            let shift = if t + 1 == len { lambda } else { lambda * (1.0 - gamma) };
            pools.push(Pool { value: value - shift, weight: 1.0, start: t, len: 1 });

            while pools.len() > 1 {
                let last = pools[pools.len() - 1];
                let prev = pools[pools.len() - 2];
                if prev.value * gamma.powi(prev.len as i32) <= last.value {
                    break;
                }
                let decay = gamma.powi(prev.len as i32);
                let weight = prev.weight + decay * decay * last.weight;
                let merged = Pool {
                    value: (prev.weight * prev.value + decay * last.weight * last.value) / weight,
                    weight,
                    start: prev.start,
                    len: prev.len + last.len,
                };
                pools.pop();
                if let Some(slot) = pools.last_mut() {
                    *slot = merged;
                }
            }
        }

        let mut calcium = vec![0.0; len];
        for pool in &pools {
            let mut value = pool.value.max(0.0);
            for c in &mut calcium[pool.start..pool.start + pool.len] {
                *c = value;
                value *= gamma;
            }
        }
        calcium
    }

    fn residual(y: &[f64], calcium: &[f64]) -> f64 {
        y.iter().zip(calcium).map(|(a, b)| (a - b) * (a - b)).sum()
    }
}

impl SpikeDeconvolver for OasisDeconvolver {
    fn deconvolve(&self, signal: ArrayView1<f64>) -> Result<Deconvolution> {
        if signal.is_empty() {
            return Err(TraceError::Deconvolution("signal is empty".to_string()));
        }
        if let Some(index) = signal.iter().position(|v| !v.is_finite()) {
            return Err(TraceError::Deconvolution(format!("non-finite sample at frame {index}")));
        }

        let values = signal.to_vec();
        let noise = Self::estimate_noise(signal);
        let offset = percentile(&values, self.config.offset_percentile)
            .unwrap_or(0.0)
            .max(0.0);
        let gamma = self.estimate_gamma(signal, noise);
        let y: Vec<f64> = values.iter().map(|v| v - offset).collect();

        let budget = noise * noise * y.len() as f64;
        let mut calcium = Self::solve(&y, gamma, 0.0);
        let mut lambda = 0.0;
        if Self::residual(&y, &calcium) <= budget {
            let mut lo = 0.0;
            let mut hi = y.iter().cloned().fold(0.0f64, f64::max);
            for _ in 0..self.config.lambda_iterations {
                let mid = 0.5 * (lo + hi);
                let candidate = Self::solve(&y, gamma, mid);
                if Self::residual(&y, &candidate) <= budget {
                    lo = mid;
                    calcium = candidate;
                } else {
                    hi = mid;
                }
            }
            lambda = lo;
        }

        let spikes = Array1::from_iter(calcium.iter().enumerate().map(|(t, &c)| {
            let previous = if t == 0 { 0.0 } else { calcium[t - 1] };
            (c - gamma * previous).max(0.0)
        }));

        Ok(Deconvolution {
            calcium: Array1::from_vec(calcium),
            spikes,
            offset,
            gamma,
            lambda,
            noise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Noise-free AR(1) trace with unit spikes at the given frames
    fn ar1_trace(len: usize, gamma: f64, spikes: &[usize], offset: f64) -> Array1<f64> {
        let mut c = 0.0;
        Array1::from_shape_fn(len, |t| {
            c = gamma * c + if spikes.contains(&t) { 1.0 } else { 0.0 };
            c + offset
        })
    }

    #[test]
    fn test_recovers_spikes_with_known_gamma() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let trace = ar1_trace(500, 0.9, &[100, 300], 0.2);
        let config = DeconvolutionConfig::builder().gamma(0.9).build();
        let result = OasisDeconvolver::new(config).deconvolve(trace.view())?;

        assert!((result.offset - 0.2).abs() < 1e-9);
        assert_eq!(result.gamma, 0.9);
        assert!((result.spikes[100] - 1.0).abs() < 0.02);
        assert!((result.spikes[300] - 1.0).abs() < 0.02);
        let stray: f64 = result
            .spikes
            .iter()
            .enumerate()
            .filter(|(t, _)| *t != 100 && *t != 300)
            .map(|(_, s)| s)
            .sum();
        assert!(stray < 0.05);
        assert_eq!(result.spikes_above(0.5), vec![100, 300]);

        let denoised = result.denoised();
        assert!((denoised[150] - trace[150]).abs() < 0.02);
        Ok(())
    }

    #[test]
    fn test_outputs_are_nonnegative() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let signal = Array1::from_shape_fn(300, |t| ((t as f64) * 0.37).sin() * 0.5);
        let result = OasisDeconvolver::default().deconvolve(signal.view())?;
        assert_eq!(result.calcium.len(), 300);
        assert_eq!(result.spikes.len(), 300);
        assert!(result.calcium.iter().all(|&c| c >= 0.0));
        assert!(result.spikes.iter().all(|&s| s >= 0.0));
        assert!(result.gamma >= 0.01 && result.gamma <= 0.999);
        Ok(())
    }

    #[test]
    fn test_flat_zero_signal() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let signal = Array1::zeros(100);
        let result = OasisDeconvolver::default().deconvolve(signal.view())?;
        assert!(result.denoised().iter().all(|&v| v == 0.0));
        assert_eq!(result.lambda, 0.0);
        Ok(())
    }

    #[test]
    fn test_rejects_empty_and_nan() {
        let deconvolver = OasisDeconvolver::default();
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(deconvolver.deconvolve(empty.view()), Err(TraceError::Deconvolution(_))));
        let nan = Array1::from_vec(vec![0.0, f64::INFINITY]);
        assert!(matches!(deconvolver.deconvolve(nan.view()), Err(TraceError::Deconvolution(_))));
    }
}
