//! Year-by-year harvest and the two export targets.
//!
//! Years are fetched one at a time. Nothing is written to disk until at
//! least one year has produced data.

use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::info;

use crate::config::RunConfig;
use crate::dataset::{Harvest, institution_count, sort_rows};
use crate::fetch::HttpClient;
use crate::fetch::scorecard::fetch_year;
use crate::normalize::{DEFAULT_PERCENTAGE_FIELDS, normalize_percentages};
use crate::output::{csv_filename, write_dataset};
use crate::store::{MetricsStore, UpsertReport, db_filename};

/// What a finished export produced.
#[derive(Debug)]
pub struct Export {
    pub path: PathBuf,
    pub rows: usize,
    pub institutions: usize,
    pub failed_years: Vec<i32>,
    /// Only set for the SQLite target.
    pub upsert: Option<UpsertReport>,
}

/// Fetches and normalizes every configured year, in order.
pub async fn harvest<C: HttpClient>(client: &C, config: &RunConfig) -> Harvest {
    let mut harvest = Harvest::default();

    for &year in &config.years {
        info!(year, "Fetching data");
        let rows = fetch_year(client, &config.api, &config.roster, year).await;
        let rows = normalize_percentages(&rows, DEFAULT_PERCENTAGE_FIELDS);
        info!(year, rows = rows.len(), "Year complete");
        harvest.record(year, rows);
    }

    harvest
}

/// Harvests all years and writes them, sorted, to a dated CSV in the output directory.
#[tracing::instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
pub async fn export_csv<C: HttpClient>(
    client: &C,
    config: &RunConfig,
    date: NaiveDate,
) -> Result<Export> {
    let harvest = harvest(client, config).await;
    let failed_years = harvest.failed_years.clone();
    let rows = sort_rows(harvest.into_dataset()?);

    let path = config.output_dir.join(csv_filename(&config.years, date)?);
    write_dataset(&path, &rows)?;

    let export = Export {
        path,
        rows: rows.len(),
        institutions: institution_count(&rows),
        failed_years,
        upsert: None,
    };
    info!(
        path = %export.path.display(),
        rows = export.rows,
        institutions = export.institutions,
        "Saved data"
    );
    Ok(export)
}

/// Harvests all years and loads them into a dated SQLite database.
#[tracing::instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
pub async fn export_sqlite<C: HttpClient>(
    client: &C,
    config: &RunConfig,
    date: NaiveDate,
) -> Result<Export> {
    let harvest = harvest(client, config).await;
    let failed_years = harvest.failed_years.clone();
    let rows = harvest.into_dataset()?;

    let path = config.output_dir.join(db_filename(date));
    let mut store = MetricsStore::open(&path)?;
    store.insert_institutions(&config.roster)?;
    let report = store.upsert_metrics(&rows)?;

    let export = Export {
        path,
        rows: report.written,
        institutions: institution_count(&rows),
        failed_years,
        upsert: Some(report),
    };
    info!(
        path = %export.path.display(),
        rows = export.rows,
        "Database saved"
    );
    Ok(export)
}
