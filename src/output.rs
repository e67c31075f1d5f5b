//! CSV export of the harvested dataset.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::WriterBuilder;
use std::path::Path;
use tracing::debug;

use crate::metrics::MetricRow;

/// `music_school_data_<minYear>_<maxYear>_<YYYYMMDD>.csv`
pub fn csv_filename(years: &[i32], date: NaiveDate) -> Result<String> {
    let min = years.iter().min().context("no years to name the file after")?;
    let max = years.iter().max().context("no years to name the file after")?;
    Ok(format!(
        "music_school_data_{min}_{max}_{}.csv",
        date.format("%Y%m%d")
    ))
}

/// Writes `rows` to `path` with a header row, replacing any existing file.
///
/// Missing metrics are written as empty cells.
pub fn write_dataset(path: &Path, rows: &[MetricRow]) -> Result<()> {
    debug!(path = %path.display(), rows = rows.len(), "Writing CSV");

    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
