use crate::error::Result;
use crate::processing::BatchResult;
use polars::prelude::*;

/// Create a DataFrame with one row per burst of every successfully processed cell
///
/// Columns: `cell`, `burst`, `start`, `end`, `duration`, `peak`, `amplitude`, `area`.
/// `area` is the trapezoidal integral of the denoised trace over `[start, end)`.
pub fn burst_table(result: &BatchResult) -> Result<DataFrame> {
    let mut cells = Vec::new();
    let mut bursts = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut durations = Vec::new();
    let mut peaks = Vec::new();
    let mut amplitudes = Vec::new();
    let mut areas = Vec::new();

    for report in &result.cells {
        let Some(analysis) = report.analysis() else {
            continue;
        };
        let trace = analysis.denoised.to_vec();
        for (index, event) in analysis.bursts.iter().enumerate() {
            cells.push(report.cell as u64);
            bursts.push(index as u64);
            starts.push(event.start as u64);
            ends.push(event.end as u64);
            durations.push(event.duration as u64);
            peaks.push(event.peak as u64);
            amplitudes.push(event.amplitude);
            areas.push(event.area(&trace));
        }
    }

    Ok(DataFrame::new(vec![
        Series::new("cell".into(), &cells).into(),
        Series::new("burst".into(), &bursts).into(),
        Series::new("start".into(), &starts).into(),
        Series::new("end".into(), &ends).into(),
        Series::new("duration".into(), &durations).into(),
        Series::new("peak".into(), &peaks).into(),
        Series::new("amplitude".into(), &amplitudes).into(),
        Series::new("area".into(), &areas).into(),
    ])?)
}

/// Per-cell burst count, total area and mean duration, ordered by cell
pub fn bursts_per_cell(table: &DataFrame) -> LazyFrame {
    table
        .clone()
        .lazy()
        .group_by([col("cell")])
        .agg([
            col("burst").count().alias("num_bursts"),
            col("area").sum().alias("total_area"),
            col("duration").cast(DataType::Float64).mean().alias("mean_duration"),
        ])
        .sort(["cell"], Default::default())
}
