//! Combining per-year frames into one dataset.

use anyhow::{Result, bail};
use std::collections::BTreeSet;

use crate::metrics::MetricRow;

/// Rows collected so far, one frame per successful year, plus the years that
/// produced nothing.
#[derive(Debug, Default)]
pub struct Harvest {
    pub frames: Vec<Vec<MetricRow>>,
    pub failed_years: Vec<i32>,
}

impl Harvest {
    /// Records the rows fetched for `year`. An empty frame counts as a failure.
    pub fn record(&mut self, year: i32, rows: Vec<MetricRow>) {
        if rows.is_empty() {
            self.failed_years.push(year);
        } else {
            self.frames.push(rows);
        }
    }

    /// Concatenates every frame into one dataset, in fetch order.
    ///
    /// Fails when no year produced any rows. Partial failure is not an error;
    /// callers report `failed_years` themselves.
    pub fn into_dataset(self) -> Result<Vec<MetricRow>> {
        if self.frames.is_empty() {
            bail!(
                "No data retrieved for any years ({} attempted). Check API key and network connection.",
                self.failed_years.len()
            );
        }

        Ok(concat_frames(self.frames))
    }
}

/// Appends all frames, keeping every row (no deduplication).
pub fn concat_frames(frames: Vec<Vec<MetricRow>>) -> Vec<MetricRow> {
    frames.into_iter().flatten().collect()
}

/// Stable sort by institution name, then year.
pub fn sort_rows(mut rows: Vec<MetricRow>) -> Vec<MetricRow> {
    rows.sort_by(|a, b| {
        a.institution
            .cmp(&b.institution)
            .then_with(|| a.year.cmp(&b.year))
    });
    rows
}

/// Number of distinct institutions (by unit id) in `rows`.
pub fn institution_count(rows: &[MetricRow]) -> usize {
    rows.iter().map(|r| r.unitid).collect::<BTreeSet<_>>().len()
}
