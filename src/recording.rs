use crate::error::Result;
use crate::processing::{BatchAligner, BatchResult};
use crate::types::config::PipelineConfig;
use crate::utils::file_utils::{read_npy_matrix, write_npy};
use log::info;
use ndarray::{Array2, ArrayView2};
use std::path::{Path, PathBuf};

pub const FLUORESCENCE_FILE: &str = "F.npy";
pub const DENOISED_FILE: &str = "Fdenoised.npy";
pub const TIME_POINTS_FILE: &str = "timePoints.npy";
pub const PEAK_START_FRAMES_FILE: &str = "peakStartFrames.npy";

/// A suite2p output folder holding a cells × frames fluorescence matrix
pub struct Suite2pFolder {
    folder: PathBuf,
    fluorescence: Array2<f64>,
    frames_to_time: f64,
}

impl Suite2pFolder {
    /// Load `F.npy` from `folder`.
    ///
    /// `frames_to_time` scales frame indices into the saved time points.
    pub fn open(folder: impl AsRef<Path>, frames_to_time: f64) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        let fluorescence = read_npy_matrix(folder.join(FLUORESCENCE_FILE))?;
        info!(
            "loaded {} cells × {} frames from {}",
            fluorescence.nrows(),
            fluorescence.ncols(),
            folder.display()
        );
        Ok(Self {
            folder,
            fluorescence,
            frames_to_time,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn fluorescence(&self) -> ArrayView2<'_, f64> {
        self.fluorescence.view()
    }

    pub fn num_cells(&self) -> usize {
        self.fluorescence.nrows()
    }

    pub fn num_frames(&self) -> usize {
        self.fluorescence.ncols()
    }

    pub fn frames_to_time(&self) -> f64 {
        self.frames_to_time
    }

    /// True once `Fdenoised.npy` has been written to the folder
    pub fn outputs_exist(&self) -> bool {
        outputs_exist(&self.folder)
    }

    /// Run the default pipeline over every cell
    pub fn process(&self, config: &PipelineConfig) -> BatchResult {
        BatchAligner::from_config(config).process_batch(self.fluorescence.view(), self.frames_to_time)
    }

    /// Write `Fdenoised.npy`, `timePoints.npy` and `peakStartFrames.npy`
    pub fn save_outputs(&self, result: &BatchResult) -> Result<()> {
        write_npy(self.folder.join(DENOISED_FILE), &result.denoised)?;
        write_npy(self.folder.join(TIME_POINTS_FILE), &result.time_points)?;
        write_npy(self.folder.join(PEAK_START_FRAMES_FILE), &result.peak_start_frames)?;
        info!("saved outputs to {}", self.folder.display());
        Ok(())
    }

    /// Get a summary of the folder contents
    pub fn get_summary(&self) -> String {
        let mut result = String::new();
        result.push_str(&format!("Suite2p folder: {}\n", self.folder.display()));
        result.push_str(&format!("  Cells: {}\n", self.num_cells()));
        result.push_str(&format!("  Frames: {}\n", self.num_frames()));
        result.push_str(&format!("  Frames to time: {}\n", self.frames_to_time));
        let duration = self.num_frames().saturating_sub(1) as f64 * self.frames_to_time;
        result.push_str(&format!("  Last time point: {duration}\n"));
        result.push_str(&format!("  Outputs present: {}\n", self.outputs_exist()));
        result
    }
}

fn outputs_exist(folder: &Path) -> bool {
    folder.join(DENOISED_FILE).exists()
}

/// Denoise and align every cell in `folder`, saving the outputs next to `F.npy`.
///
/// Returns `None` without reading anything when the outputs already exist and
/// `overwrite` is false.
pub fn process_folder(
    folder: impl AsRef<Path>,
    frames_to_time: f64,
    config: &PipelineConfig,
    overwrite: bool,
) -> Result<Option<BatchResult>> {
    let folder = folder.as_ref();
    if outputs_exist(folder) && !overwrite {
        info!("{} already processed, skipping", folder.display());
        return Ok(None);
    }
    let recording = Suite2pFolder::open(folder, frames_to_time)?;
    let result = recording.process(config);
    recording.save_outputs(&result)?;
    Ok(Some(result))
}
