//! Python bindings, enabled with the `python` feature

use crate::error::TraceError;
use crate::fitting::ModPolyBaseline;
use crate::processing::{BatchAligner, BurstDetector, DenoisingPipeline};
use crate::recording::process_folder;
use crate::types::config::{BurstConfig, PipelineConfig};
use ndarray::{Array1, Array2};
use pyo3::{
    Bound, PyErr, PyResult, pyfunction, pymodule,
    types::{PyModule, PyModuleMethods},
    wrap_pyfunction,
};
use pyo3_polars::PyDataFrame;
use std::path::PathBuf;

impl From<TraceError> for PyErr {
    fn from(err: TraceError) -> PyErr {
        let message = err.to_string();
        match err {
            TraceError::Io(_) => pyo3::exceptions::PyIOError::new_err(message),
            TraceError::TimedOut { .. } => pyo3::exceptions::PyTimeoutError::new_err(message),
            TraceError::InvalidInputShape(_) | TraceError::Config(_) | TraceError::NpyFormat(_) => {
                pyo3::exceptions::PyValueError::new_err(message)
            }
            _ => pyo3::exceptions::PyRuntimeError::new_err(message),
        }
    }
}

fn config_from(config_json: Option<&str>) -> Result<PipelineConfig, TraceError> {
    match config_json {
        Some(json) => PipelineConfig::from_json_str(json),
        None => Ok(PipelineConfig::default()),
    }
}

fn matrix_from_rows(rows: Vec<Vec<f64>>) -> Result<Array2<f64>, TraceError> {
    let num_cells = rows.len();
    let num_frames = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != num_frames) {
        return Err(TraceError::InvalidInputShape("rows have different lengths".to_string()));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((num_cells, num_frames), flat)
        .map_err(|e| TraceError::InvalidInputShape(e.to_string()))
}

fn rows_of(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Denoises one trace with the polynomial baseline.
///
/// Returns:
///     tuple[list[float], list[float], list[float]]: baseline, dF and filtered dF/F.
#[pyfunction]
#[pyo3(signature = (trace, config_json = None))]
fn denoise_trace(trace: Vec<f64>, config_json: Option<String>) -> PyResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let config = config_from(config_json.as_deref())?;
    let pipeline = DenoisingPipeline::builder()
        .estimator(ModPolyBaseline::new(config.baseline))
        .config(config.denoise)
        .build();
    let signal = pipeline.denoise(Array1::from_vec(trace).view())?;
    Ok((
        signal.baseline.to_vec(),
        signal.delta_f.to_vec(),
        signal.relative_intensity.to_vec(),
    ))
}

/// Finds bursts with the sliding-window scanner.
///
/// Returns:
///     list[tuple[int, int, int, int, float]]: (start, end, duration, peak, amplitude) per burst.
#[pyfunction]
#[pyo3(signature = (trace, window_size = 20, merge_gap = 10, diff_threshold = 4.0))]
fn find_bursts(
    trace: Vec<f64>,
    window_size: usize,
    merge_gap: usize,
    diff_threshold: f64,
) -> PyResult<Vec<(usize, usize, usize, usize, f64)>> {
    let detector = BurstDetector::new(
        BurstConfig::builder()
            .window_size(window_size)
            .merge_gap(merge_gap)
            .diff_threshold(diff_threshold)
            .build(),
    );
    let events = detector.find_bursts(Array1::from_vec(trace).view())?;
    Ok(events
        .into_iter()
        .map(|e| (e.start, e.end, e.duration, e.peak, e.amplitude))
        .collect())
}

/// Processes a cells × frames matrix.
///
/// Returns:
///     tuple: denoised traces, NaN-padded burst start frames, time points and failed cell indices.
#[pyfunction]
#[pyo3(signature = (raw, frames_to_time, config_json = None))]
#[allow(clippy::type_complexity)]
fn process_batch(
    raw: Vec<Vec<f64>>,
    frames_to_time: f64,
    config_json: Option<String>,
) -> PyResult<(Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>, Vec<usize>)> {
    let config = config_from(config_json.as_deref())?;
    let raw = matrix_from_rows(raw)?;
    let result = BatchAligner::from_config(&config).process_batch(raw.view(), frames_to_time);
    Ok((
        rows_of(&result.denoised),
        rows_of(&result.peak_start_frames),
        result.time_points.to_vec(),
        result.failed_cells(),
    ))
}

/// Processes `F.npy` in a suite2p folder and saves the outputs next to it.
///
/// Returns:
///     bool: False if the folder was skipped because outputs already exist.
#[pyfunction]
#[pyo3(signature = (folder, frames_to_time, overwrite = false, config_json = None))]
fn process_suite2p_folder(
    folder: PathBuf,
    frames_to_time: f64,
    overwrite: bool,
    config_json: Option<String>,
) -> PyResult<bool> {
    let config = config_from(config_json.as_deref())?;
    Ok(process_folder(&folder, frames_to_time, &config, overwrite)?.is_some())
}

/// Processes a cells × frames matrix and returns one row per detected burst.
///
/// Returns:
///     polars.DataFrame: cell, burst, start, end, duration, peak, amplitude, area.
#[pyfunction]
#[pyo3(signature = (raw, frames_to_time, config_json = None))]
fn burst_table(raw: Vec<Vec<f64>>, frames_to_time: f64, config_json: Option<String>) -> PyResult<PyDataFrame> {
    let config = config_from(config_json.as_deref())?;
    let raw = matrix_from_rows(raw)?;
    let result = BatchAligner::from_config(&config).process_batch(raw.view(), frames_to_time);
    Ok(PyDataFrame(crate::utils::burst_table(&result)?))
}

/// The name of this function must match the `lib.name` setting in `Cargo.toml`.
#[pymodule]
fn caburst(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(denoise_trace, m)?)?;
    m.add_function(wrap_pyfunction!(find_bursts, m)?)?;
    m.add_function(wrap_pyfunction!(process_batch, m)?)?;
    m.add_function(wrap_pyfunction!(process_suite2p_folder, m)?)?;
    m.add_function(wrap_pyfunction!(burst_table, m)?)?;
    Ok(())
}
