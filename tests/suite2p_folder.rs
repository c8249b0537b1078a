use caburst::recording::{DENOISED_FILE, FLUORESCENCE_FILE, PEAK_START_FRAMES_FILE, TIME_POINTS_FILE};
use caburst::utils::{read_npy_matrix, read_npy_vector, write_npy};
use caburst::{PipelineConfig, Suite2pFolder, process_folder};
use ndarray::Array2;
use std::path::PathBuf;

fn scratch_folder(name: &str) -> std::io::Result<PathBuf> {
    let folder = std::env::temp_dir().join(format!("caburst-it-{}-{}", std::process::id(), name));
    if folder.exists() {
        std::fs::remove_dir_all(&folder)?;
    }
    std::fs::create_dir_all(&folder)?;
    Ok(folder)
}

/// Two cells at level 10 with a transient of 5 at frames 150 and 300
fn fluorescence() -> Array2<f64> {
    Array2::from_shape_fn((2, 400), |(cell, i)| {
        let center = if cell == 0 { 150.0 } else { 300.0 };
        let d = i as f64 - center;
        let bump = if d.abs() <= 15.0 {
            2.5 * (1.0 + (std::f64::consts::PI * d / 15.0).cos())
        } else {
            0.0
        };
        10.0 + bump
    })
}

fn same_with_nan(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    a.dim() == b.dim()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}

#[test]
fn test_outputs_round_trip() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let folder = scratch_folder("round-trip")?;
    write_npy(folder.join(FLUORESCENCE_FILE), &fluorescence())?;

    let result = process_folder(&folder, 0.25, &PipelineConfig::default(), false)?.expect("first run processes");
    assert_eq!(result.num_cells(), 2);

    let denoised = read_npy_matrix(folder.join(DENOISED_FILE))?;
    let starts = read_npy_matrix(folder.join(PEAK_START_FRAMES_FILE))?;
    let time_points = read_npy_vector(folder.join(TIME_POINTS_FILE))?;

    assert!(same_with_nan(&denoised, &result.denoised));
    assert!(same_with_nan(&starts, &result.peak_start_frames));
    assert_eq!(time_points, result.time_points);
    assert_eq!(time_points.len(), 400);
    assert_eq!(time_points[4], 1.0);

    std::fs::remove_dir_all(&folder)?;
    Ok(())
}

#[test]
fn test_existing_outputs_are_skipped_unless_overwriting() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let folder = scratch_folder("skip")?;
    write_npy(folder.join(FLUORESCENCE_FILE), &fluorescence())?;
    let config = PipelineConfig::default();

    assert!(process_folder(&folder, 0.1, &config, false)?.is_some());
    assert!(Suite2pFolder::open(&folder, 0.1)?.outputs_exist());
    assert!(process_folder(&folder, 0.1, &config, false)?.is_none());

    // Overwriting recomputes with the new time scale
    assert!(process_folder(&folder, 0.5, &config, true)?.is_some());
    let time_points = read_npy_vector(folder.join(TIME_POINTS_FILE))?;
    assert_eq!(time_points[2], 1.0);

    std::fs::remove_dir_all(&folder)?;
    Ok(())
}

#[test]
fn test_skip_does_not_need_fluorescence() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let folder = scratch_folder("skip-without-input")?;
    write_npy(folder.join(DENOISED_FILE), &Array2::<f64>::zeros((1, 5)))?;
    assert!(process_folder(&folder, 0.1, &PipelineConfig::default(), false)?.is_none());
    assert!(process_folder(&folder, 0.1, &PipelineConfig::default(), true).is_err());
    std::fs::remove_dir_all(&folder)?;
    Ok(())
}
