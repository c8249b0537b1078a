//! Slow baseline estimation for fluorescence traces

use crate::error::{Result, TraceError};
use crate::fitting::linalg;
use crate::types::config::BaselineConfig;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Fits a slowly varying baseline to a single trace.
///
/// Implementations must be deterministic and return a baseline with the same
/// length as the trace.
pub trait BaselineEstimator: Send + Sync {
    fn estimate(&self, trace: ArrayView1<f64>) -> Result<Array1<f64>>;
}

/// Improved modified polynomial baseline.
///
/// Repeatedly clips the signal to `fit + num_std · dev` and refits, so
/// transients are pulled down onto the baseline while the slow drift is kept.
#[derive(Debug, Clone, Default)]
pub struct ModPolyBaseline {
    config: BaselineConfig,
}

impl ModPolyBaseline {
    pub fn new(config: BaselineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Vandermonde matrix over frame indices mapped to `[-1, 1]`
    fn vandermonde(len: usize, order: usize) -> Array2<f64> {
        let span = (len.max(2) - 1) as f64;
        Array2::from_shape_fn((len, order + 1), |(i, p)| {
            let x = if len == 1 { 0.0 } else { 2.0 * i as f64 / span - 1.0 };
            x.powi(p as i32)
        })
    }

    /// Weighted least-squares polynomial evaluated at every frame
    fn weighted_fit(
        vander: &Array2<f64>,
        weights: &Array1<f64>,
        y: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        let weighted = vander * &weights.view().insert_axis(Axis(1));
        let normal = weighted.t().dot(vander);
        let rhs = weighted.t().dot(y);
        let coef = linalg::solve(normal.view(), rhs.view())
            .map_err(|e| TraceError::BaselineFit(format!("normal equations: {e}")))?;
        Ok(vander.dot(&coef))
    }

    fn residual_std(y: &Array1<f64>, fit: &Array1<f64>) -> f64 {
        (y - fit).std(0.0)
    }
}

impl BaselineEstimator for ModPolyBaseline {
    fn estimate(&self, trace: ArrayView1<f64>) -> Result<Array1<f64>> {
        if trace.is_empty() {
            return Err(TraceError::InvalidInputShape("cannot fit a baseline to an empty trace".to_string()));
        }
        if let Some(index) = trace.iter().position(|v| !v.is_finite()) {
            return Err(TraceError::BaselineFit(format!("non-finite sample at frame {index}")));
        }

        let len = trace.len();
        let order = self.config.poly_order.min(len - 1);
        let vander = Self::vandermonde(len, order);
        let mut y = trace.to_owned();
        let exact_fit = 1e-9 * y.mapv(f64::abs).mean().unwrap_or(0.0).max(1.0);

        let mut weights = Array1::ones(len);
        let mut baseline = Self::weighted_fit(&vander, &weights, &y)?;
        let mut dev = Self::residual_std(&y, &baseline);
        if dev <= exact_fit {
            return Ok(baseline);
        }

        if self.config.mask_initial_peaks {
            weights.zip_mut_with(&(&y - &baseline), |w, &r| {
                if r > dev {
                    *w = 0.0;
                }
            });
        }

        for _ in 0..self.config.max_iter {
            let ceiling = &baseline + self.config.num_std * dev;
            y.zip_mut_with(&ceiling, |v, &c| *v = v.min(c));
            baseline = Self::weighted_fit(&vander, &weights, &y)?;
            let new_dev = Self::residual_std(&y, &baseline);

            let change = (dev - new_dev).abs() / dev.abs().max(f64::EPSILON);
            if change < self.config.tol || new_dev <= exact_fit {
                return Ok(baseline);
            }
            dev = new_dev;
        }

        Err(TraceError::BaselineFit(format!(
            "no convergence after {} iterations (residual std {dev:.3e})",
            self.config.max_iter
        )))
    }
}
