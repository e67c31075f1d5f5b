//! SQLite export: a `schools` dimension, a `school_metrics` fact table keyed
//! by (school, year), and three views for querying.
//!
//! The database is opened once per run. Schema creation, the dimension load
//! and the metrics batch each commit in their own transaction.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::metrics::{Metric, MetricRow};
use crate::schools::Roster;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schools (
    school_id INTEGER PRIMARY KEY AUTOINCREMENT,
    unitid INTEGER UNIQUE NOT NULL,
    institution_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS school_metrics (
    school_id INTEGER NOT NULL,
    year INTEGER NOT NULL,
    enrollment_total INTEGER,
    admission_rate REAL,
    retention_rate_ft REAL,
    grad_rate_150 REAL,
    tuition_fees REAL,
    avg_net_price REAL,
    PRIMARY KEY (school_id, year),
    FOREIGN KEY (school_id) REFERENCES schools(school_id)
);

CREATE INDEX IF NOT EXISTS idx_metrics_year ON school_metrics(year);
CREATE INDEX IF NOT EXISTS idx_metrics_school ON school_metrics(school_id);

CREATE VIEW IF NOT EXISTS v_school_metrics AS
SELECT
    s.institution_name,
    s.unitid,
    m.school_id,
    m.year,
    m.enrollment_total,
    m.admission_rate,
    m.retention_rate_ft,
    m.grad_rate_150,
    m.tuition_fees,
    m.avg_net_price
FROM school_metrics m
JOIN schools s ON m.school_id = s.school_id;

CREATE VIEW IF NOT EXISTS v_metrics_yoy AS
SELECT
    s.institution_name,
    s.unitid,
    m.school_id,
    m.year,
    m.enrollment_total,
    m.enrollment_total - LAG(m.enrollment_total) OVER (
        PARTITION BY m.school_id ORDER BY m.year
    ) AS enrollment_change,
    m.tuition_fees,
    m.tuition_fees - LAG(m.tuition_fees) OVER (
        PARTITION BY m.school_id ORDER BY m.year
    ) AS tuition_change,
    m.avg_net_price,
    m.avg_net_price - LAG(m.avg_net_price) OVER (
        PARTITION BY m.school_id ORDER BY m.year
    ) AS net_price_change,
    m.admission_rate,
    m.retention_rate_ft,
    m.grad_rate_150
FROM school_metrics m
JOIN schools s ON m.school_id = s.school_id;

CREATE VIEW IF NOT EXISTS v_school_summary AS
SELECT
    s.institution_name,
    s.unitid,
    COUNT(m.year) AS years_of_data,
    MIN(m.year) AS first_year,
    MAX(m.year) AS last_year,
    ROUND(AVG(m.enrollment_total), 0) AS avg_enrollment,
    ROUND(AVG(m.admission_rate), 2) AS avg_admission_rate,
    ROUND(AVG(m.retention_rate_ft), 2) AS avg_retention_rate,
    ROUND(AVG(m.grad_rate_150), 2) AS avg_grad_rate,
    ROUND(AVG(m.tuition_fees), 2) AS avg_tuition,
    ROUND(AVG(m.avg_net_price), 2) AS avg_net_price
FROM schools s
LEFT JOIN school_metrics m ON s.school_id = m.school_id
GROUP BY s.school_id, s.institution_name, s.unitid;
"#;

/// `INSERT OR REPLACE` for one fact row: the key columns, then one column per
/// [`Metric`] in [`Metric::ALL`] order.
fn upsert_metrics_sql() -> String {
    let columns: Vec<&str> = Metric::ALL.iter().map(|m| m.column()).collect();
    let placeholders: Vec<String> = (1..=columns.len() + 2).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR REPLACE INTO school_metrics (school_id, year, {}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Bind values matching [`upsert_metrics_sql`].
fn metric_params(school_id: i64, row: &MetricRow) -> Vec<Value> {
    let mut values = Vec::with_capacity(Metric::ALL.len() + 2);
    values.push(Value::Integer(school_id));
    values.push(Value::Integer(row.year.into()));
    for metric in Metric::ALL {
        values.push(match metric {
            Metric::EnrollmentTotal => row.enrollment_total.map_or(Value::Null, Value::Integer),
            _ => row.get(metric).map_or(Value::Null, Value::Real),
        });
    }
    values
}

/// `music_schools_<YYYYMMDD>.db`
pub fn db_filename(date: NaiveDate) -> String {
    format!("music_schools_{}.db", date.format("%Y%m%d"))
}

/// Counts from one [`MetricsStore::upsert_metrics`] batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    pub written: usize,
    /// Rows whose unit id is not in the `schools` table.
    pub skipped_unknown: usize,
    pub failed: usize,
}

/// One row of `v_school_summary`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolSummary {
    pub institution_name: String,
    pub unitid: i64,
    pub years_of_data: i64,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub avg_enrollment: Option<f64>,
    pub avg_admission_rate: Option<f64>,
    pub avg_retention_rate: Option<f64>,
    pub avg_grad_rate: Option<f64>,
    pub avg_tuition: Option<f64>,
    pub avg_net_price: Option<f64>,
}

/// One row of `v_metrics_yoy`. Changes are `None` for an institution's first year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearOverYear {
    pub year: i32,
    pub enrollment_total: Option<i64>,
    pub enrollment_change: Option<i64>,
    pub tuition_fees: Option<f64>,
    pub tuition_change: Option<f64>,
    pub avg_net_price: Option<f64>,
    pub net_price_change: Option<f64>,
    pub admission_rate: Option<f64>,
    pub retention_rate_ft: Option<f64>,
    pub grad_rate_150: Option<f64>,
}

pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Self::init(conn)
    }

    /// Opens an existing database without touching its schema or settings.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let mut store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    /// Creates tables, indexes and views that do not exist yet.
    pub fn create_schema(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(SCHEMA_SQL)
            .context("failed to create database schema")?;
        tx.commit()?;
        debug!("Schema ready");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Inserts every institution on the roster. Institutions already present
    /// (by unit id) are left alone. Returns how many were newly added.
    #[tracing::instrument(skip_all, fields(institutions = roster.len()))]
    pub fn insert_institutions(&mut self, roster: &Roster) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO schools (unitid, institution_name) VALUES (?1, ?2)",
            )?;
            for institution in roster.iter() {
                inserted += stmt.execute(params![institution.unitid, institution.name])?;
            }
        }
        tx.commit()?;

        info!(inserted, "Schools loaded");
        Ok(inserted)
    }

    /// Surrogate `school_id` for a unit id, if the school is known.
    pub fn institution_key(&self, unitid: i64) -> Result<Option<i64>> {
        lookup_key(&self.conn, unitid)
    }

    /// Inserts `rows`, replacing any existing row for the same (school, year).
    ///
    /// Rows for unknown schools are skipped. A row that fails to insert is
    /// logged and counted; the rest of the batch still goes in, even when the
    /// failure rolled back the whole transaction.
    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub fn upsert_metrics(&mut self, rows: &[MetricRow]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            match lookup_key(&self.conn, row.unitid)? {
                Some(school_id) => keyed.push((school_id, row)),
                None => {
                    debug!(unitid = row.unitid, year = row.year, "Skipping unknown school");
                    report.skipped_unknown += 1;
                }
            }
        }
        keyed.sort_by_key(|(school_id, row)| (*school_id, row.year));

        let sql = upsert_metrics_sql();
        let mut failed = vec![false; keyed.len()];
        loop {
            let tx = self.conn.transaction()?;
            let mut rolled_back = false;
            {
                let mut stmt = tx.prepare(&sql)?;
                for (i, (school_id, row)) in keyed.iter().enumerate() {
                    if failed[i] {
                        continue;
                    }
                    if let Err(e) = stmt.execute(params_from_iter(metric_params(*school_id, row))) {
                        error!(school_id, year = row.year, error = %e, "Error inserting metrics row");
                        failed[i] = true;
                        // Statement-level errors keep the transaction; anything
                        // else discards every row written so far.
                        if tx.is_autocommit() {
                            rolled_back = true;
                            break;
                        }
                    }
                }
            }
            if rolled_back {
                warn!("Transaction rolled back, replaying batch without failed rows");
                continue;
            }
            tx.commit()?;
            break;
        }

        report.failed = failed.iter().filter(|f| **f).count();
        report.written = keyed.len() - report.failed;

        info!(
            written = report.written,
            skipped_unknown = report.skipped_unknown,
            failed = report.failed,
            "Metrics upserted"
        );
        Ok(report)
    }

    pub fn metric_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM school_metrics", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Reads `v_school_summary`, ordered by institution name.
    pub fn summaries(&self) -> Result<Vec<SchoolSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT institution_name, unitid, years_of_data, first_year, last_year,
                    avg_enrollment, avg_admission_rate, avg_retention_rate,
                    avg_grad_rate, avg_tuition, avg_net_price
             FROM v_school_summary
             ORDER BY institution_name",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(SchoolSummary {
                institution_name: r.get(0)?,
                unitid: r.get(1)?,
                years_of_data: r.get(2)?,
                first_year: r.get(3)?,
                last_year: r.get(4)?,
                avg_enrollment: r.get(5)?,
                avg_admission_rate: r.get(6)?,
                avg_retention_rate: r.get(7)?,
                avg_grad_rate: r.get(8)?,
                avg_tuition: r.get(9)?,
                avg_net_price: r.get(10)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Reads `v_metrics_yoy` for one school, ordered by year.
    pub fn year_over_year(&self, unitid: i64) -> Result<Vec<YearOverYear>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, enrollment_total, enrollment_change, tuition_fees, tuition_change,
                    avg_net_price, net_price_change, admission_rate, retention_rate_ft,
                    grad_rate_150
             FROM v_metrics_yoy
             WHERE unitid = ?1
             ORDER BY year",
        )?;
        let rows = stmt.query_map(params![unitid], |r| {
            Ok(YearOverYear {
                year: r.get(0)?,
                enrollment_total: r.get(1)?,
                enrollment_change: r.get(2)?,
                tuition_fees: r.get(3)?,
                tuition_change: r.get(4)?,
                avg_net_price: r.get(5)?,
                net_price_change: r.get(6)?,
                admission_rate: r.get(7)?,
                retention_rate_ft: r.get(8)?,
                grad_rate_150: r.get(9)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn lookup_key(conn: &Connection, unitid: i64) -> Result<Option<i64>> {
    let key = conn
        .query_row(
            "SELECT school_id FROM schools WHERE unitid = ?1",
            params![unitid],
            |r| r.get(0),
        )
        .optional()?;
    Ok(key)
}
