//! Peak finding with height, distance, prominence and width filters

use crate::error::Result;
use crate::types::burst::DetectedPeak;
use crate::types::config::PeakFinderConfig;
use ndarray::ArrayView1;

/// Locates transients in a denoised trace
pub trait PeakFinder: Send + Sync {
    fn find_peaks(&self, signal: ArrayView1<f64>) -> Result<Vec<DetectedPeak>>;
}

/// Filters are applied in order: height, distance, prominence, width.
/// Prominence is measured within `wlen` frames centered on each peak, and
/// widths are taken at `rel_height` of the prominence below the peak.
#[derive(Debug, Clone, Default)]
pub struct ProminencePeakFinder {
    config: PeakFinderConfig,
}

#[derive(Debug, Clone, Copy)]
struct Prominence {
    value: f64,
    left_base: usize,
    right_base: usize,
}

#[derive(Debug, Clone, Copy)]
struct Width {
    width: f64,
    height: f64,
    left_ips: f64,
    right_ips: f64,
}

impl ProminencePeakFinder {
    pub fn new(config: PeakFinderConfig) -> Self {
        Self { config }
    }

    /// Strict local maxima; flat tops report their middle frame (rounded down)
    fn local_maxima(x: &[f64]) -> Vec<usize> {
        let mut peaks = Vec::new();
        if x.len() < 3 {
            return peaks;
        }
        let last = x.len() - 1;
        let mut i = 1;
        while i < last {
            if x[i - 1] < x[i] {
                let mut ahead = i + 1;
                while ahead < last && x[ahead] == x[i] {
                    ahead += 1;
                }
                if x[ahead] < x[i] {
                    peaks.push((i + ahead - 1) / 2);
                    i = ahead;
                }
            }
            i += 1;
        }
        peaks
    }

    /// Drops peaks closer than `distance` to a higher one, highest first
    fn select_by_distance(x: &[f64], peaks: Vec<usize>, distance: usize) -> Vec<usize> {
        if distance <= 1 || peaks.len() < 2 {
            return peaks;
        }
        let mut keep = vec![true; peaks.len()];
        let mut by_priority: Vec<usize> = (0..peaks.len()).collect();
        by_priority.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

        for &j in by_priority.iter().rev() {
            if !keep[j] {
                continue;
            }
            for k in (0..j).rev() {
                if peaks[j] - peaks[k] >= distance {
                    break;
                }
                keep[k] = false;
            }
            for k in j + 1..peaks.len() {
                if peaks[k] - peaks[j] >= distance {
                    break;
                }
                keep[k] = false;
            }
        }

        peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect()
    }

    fn prominence(&self, x: &[f64], peak: usize) -> Prominence {
        let mut lo = 0;
        let mut hi = x.len() - 1;
        if self.config.wlen >= 2 {
            let half = self.config.wlen / 2;
            lo = lo.max(peak.saturating_sub(half));
            hi = hi.min(peak + half);
        }

        let mut left_base = peak;
        let mut left_min = x[peak];
        let mut i = peak;
        loop {
            if x[i] > x[peak] {
                break;
            }
            if x[i] < left_min {
                left_min = x[i];
                left_base = i;
            }
            if i == lo {
                break;
            }
            i -= 1;
        }

        let mut right_base = peak;
        let mut right_min = x[peak];
        for (j, &v) in x.iter().enumerate().take(hi + 1).skip(peak) {
            if v > x[peak] {
                break;
            }
            if v < right_min {
                right_min = v;
                right_base = j;
            }
        }

        Prominence {
            value: x[peak] - left_min.max(right_min),
            left_base,
            right_base,
        }
    }

    fn width(&self, x: &[f64], peak: usize, prominence: &Prominence) -> Width {
        let height = x[peak] - prominence.value * self.config.rel_height;

        let mut i = peak;
        while prominence.left_base < i && height < x[i] {
            i -= 1;
        }
        let mut left_ips = i as f64;
        if x[i] < height {
            left_ips += (height - x[i]) / (x[i + 1] - x[i]);
        }

        let mut i = peak;
        while i < prominence.right_base && height < x[i] {
            i += 1;
        }
        let mut right_ips = i as f64;
        if x[i] < height {
            right_ips -= (height - x[i]) / (x[i - 1] - x[i]);
        }

        Width {
            width: right_ips - left_ips,
            height,
            left_ips,
            right_ips,
        }
    }
}

impl PeakFinder for ProminencePeakFinder {
    fn find_peaks(&self, signal: ArrayView1<f64>) -> Result<Vec<DetectedPeak>> {
        let x = signal.to_vec();
        let candidates: Vec<usize> = Self::local_maxima(&x)
            .into_iter()
            .filter(|&p| x[p] >= self.config.height)
            .collect();
        let candidates = Self::select_by_distance(&x, candidates, self.config.distance);

        Ok(candidates
            .into_iter()
            .filter_map(|peak| {
                let prominence = self.prominence(&x, peak);
                if prominence.value < self.config.prominence {
                    return None;
                }
                let width = self.width(&x, peak, &prominence);
                if width.width < self.config.width {
                    return None;
                }
                Some(DetectedPeak {
                    index: peak,
                    height: x[peak],
                    prominence: prominence.value,
                    left_base: prominence.left_base,
                    right_base: prominence.right_base,
                    width: width.width,
                    width_height: width.height,
                    left_ips: width.left_ips,
                    right_ips: width.right_ips,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn permissive() -> PeakFinderConfig {
        PeakFinderConfig::builder()
            .height(f64::NEG_INFINITY)
            .width(0.0)
            .distance(1)
            .prominence(0.0)
            .rel_height(0.5)
            .wlen(0)
            .build()
    }

    #[test]
    fn test_plateau_reports_middle() {
        let x = [0.0, 1.0, 2.0, 2.0, 2.0, 2.0, 1.0, 0.0];
        assert_eq!(ProminencePeakFinder::local_maxima(&x), vec![3]);
        // Rising edge at the end is not a peak
        assert!(ProminencePeakFinder::local_maxima(&[0.0, 1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_prominence_and_bases() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let x = Array1::from_vec(vec![0.0, 3.0, 1.0, 5.0, 0.5, 2.0, 0.0]);
        let peaks = ProminencePeakFinder::new(permissive()).find_peaks(x.view())?;
        let summary: Vec<(usize, f64, usize, usize)> = peaks
            .iter()
            .map(|p| (p.index, p.prominence, p.left_base, p.right_base))
            .collect();
        assert_eq!(summary, vec![(1, 2.0, 0, 2), (3, 5.0, 0, 6), (5, 1.5, 4, 6)]);
        Ok(())
    }

    #[test]
    fn test_wlen_limits_prominence() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut values = vec![0.0; 21];
        values[10] = 5.0;
        for (i, v) in values.iter_mut().enumerate().skip(5).take(11) {
            if i != 10 {
                *v = 4.0;
            }
        }
        // Shoulders are [0,4,4,4,4,4,5,4,...]; without a window the base is 0
        values[9] = 3.0;
        values[11] = 3.0;
        let x = Array1::from_vec(values);
        let wide = ProminencePeakFinder::new(permissive()).find_peaks(x.view())?;
        let narrow = ProminencePeakFinder::new(PeakFinderConfig { wlen: 3, ..permissive() })
            .find_peaks(x.view())?;
        let wide_peak = wide.iter().find(|p| p.index == 10).expect("peak at 10");
        let narrow_peak = narrow.iter().find(|p| p.index == 10).expect("peak at 10");
        assert_eq!(wide_peak.prominence, 5.0);
        assert_eq!(narrow_peak.prominence, 2.0);
        Ok(())
    }

    #[test]
    fn test_distance_keeps_highest() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let x = Array1::from_vec(vec![0.0, 2.0, 0.0, 3.0, 0.0, 1.0, 0.0, 0.0, 0.0, 4.0, 0.0]);
        let config = PeakFinderConfig { distance: 4, ..permissive() };
        let indices: Vec<usize> = ProminencePeakFinder::new(config)
            .find_peaks(x.view())?
            .iter()
            .map(|p| p.index)
            .collect();
        assert_eq!(indices, vec![3, 9]);
        Ok(())
    }

    #[test]
    fn test_width_interpolates_and_filters() -> std::result::Result<(), Box<dyn std::error::Error>> {
        // Triangle rising 0..10 then falling, peak 10 at frame 10
        let x = Array1::from_shape_fn(21, |i| 10.0 - (i as f64 - 10.0).abs());
        let finder = ProminencePeakFinder::new(permissive());
        let peaks = finder.find_peaks(x.view())?;
        assert_eq!(peaks.len(), 1);
        let peak = peaks[0];
        assert_eq!(peak.width_height, 5.0);
        assert_eq!(peak.left_ips, 5.0);
        assert_eq!(peak.right_ips, 15.0);
        assert_eq!(peak.width, 10.0);

        let strict = ProminencePeakFinder::new(PeakFinderConfig { width: 17.0, ..permissive() });
        assert!(strict.find_peaks(x.view())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_default_filters_on_calcium_transient() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let x = Array1::from_shape_fn(400, |i| {
            let t = i as f64 - 100.0;
            if t < 0.0 { 0.0 } else { 0.3 * (-t / 40.0).exp() * (1.0 - (-t / 3.0).exp()) }
        });
        let peaks = ProminencePeakFinder::default().find_peaks(x.view())?;
        assert_eq!(peaks.len(), 1);
        let peak = peaks[0];
        assert!(peak.index > 100 && peak.index < 120);
        assert!(peak.start_frame() >= 99 && peak.start_frame() <= peak.index);
        assert!(peak.width >= 17.0);
        Ok(())
    }
}
