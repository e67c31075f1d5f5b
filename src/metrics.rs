//! Metric definitions and the per-(institution, year) row type.
//!
//! [`Metric`] carries the static mapping between our column names and the
//! College Scorecard field paths. [`MetricRow`] is what every stage of the
//! pipeline passes around and what the CSV writer serializes.

use serde::Serialize;

/// One of the six metrics collected for every institution and year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    EnrollmentTotal,
    AdmissionRate,
    RetentionRateFt,
    GradRate150,
    /// Published tuition and required fees only (no room/board).
    TuitionFees,
    /// Cost of attendance minus federal, state and institutional grants.
    AvgNetPrice,
}

impl Metric {
    /// All metrics, in output column order.
    pub const ALL: [Metric; 6] = [
        Metric::EnrollmentTotal,
        Metric::AdmissionRate,
        Metric::RetentionRateFt,
        Metric::GradRate150,
        Metric::TuitionFees,
        Metric::AvgNetPrice,
    ];

    /// Column name shared by the CSV header (the matching `MetricRow` field)
    /// and the `school_metrics` table. The upsert statement is built from it.
    pub fn column(self) -> &'static str {
        match self {
            Metric::EnrollmentTotal => "enrollment_total",
            Metric::AdmissionRate => "admission_rate",
            Metric::RetentionRateFt => "retention_rate_ft",
            Metric::GradRate150 => "grad_rate_150",
            Metric::TuitionFees => "tuition_fees",
            Metric::AvgNetPrice => "avg_net_price",
        }
    }

    /// Scorecard field path, without the leading `<year>.` qualifier.
    pub fn field_path(self) -> &'static str {
        match self {
            Metric::EnrollmentTotal => "student.size",
            Metric::AdmissionRate => "admissions.admission_rate.overall",
            Metric::RetentionRateFt => "student.retention_rate.four_year.full_time",
            Metric::GradRate150 => "completion.completion_rate_4yr_150nt",
            Metric::TuitionFees => "cost.tuition.in_state",
            Metric::AvgNetPrice => "cost.avg_net_price.private",
        }
    }

    /// Field path qualified by year, e.g. `2020.student.size`.
    pub fn year_field(self, year: i32) -> String {
        format!("{year}.{}", self.field_path())
    }
}

/// One observation of an institution for a single year.
///
/// Field order matters: it is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricRow {
    pub institution: String,
    pub unitid: i64,
    pub year: i32,

    pub enrollment_total: Option<i64>,
    pub admission_rate: Option<f64>,
    pub retention_rate_ft: Option<f64>,
    pub grad_rate_150: Option<f64>,
    pub tuition_fees: Option<f64>,
    pub avg_net_price: Option<f64>,
}

impl MetricRow {
    /// Creates a row with every metric missing.
    pub fn new(institution: impl Into<String>, unitid: i64, year: i32) -> Self {
        Self {
            institution: institution.into(),
            unitid,
            year,
            ..Default::default()
        }
    }

    /// Reads a metric as a float, regardless of its storage type.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::EnrollmentTotal => self.enrollment_total.map(|v| v as f64),
            Metric::AdmissionRate => self.admission_rate,
            Metric::RetentionRateFt => self.retention_rate_ft,
            Metric::GradRate150 => self.grad_rate_150,
            Metric::TuitionFees => self.tuition_fees,
            Metric::AvgNetPrice => self.avg_net_price,
        }
    }

    /// Writes a metric. Enrollment is a head count and is rounded to a whole number.
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::EnrollmentTotal => self.enrollment_total = value.map(|v| v.round() as i64),
            Metric::AdmissionRate => self.admission_rate = value,
            Metric::RetentionRateFt => self.retention_rate_ft = value,
            Metric::GradRate150 => self.grad_rate_150 = value,
            Metric::TuitionFees => self.tuition_fees = value,
            Metric::AvgNetPrice => self.avg_net_price = value,
        }
    }

    /// Builder-style variant of [`MetricRow::set`].
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, Some(value));
        self
    }
}
