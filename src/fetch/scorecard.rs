//! College Scorecard "schools" endpoint: one request per year.
//!
//! A failed year never aborts a multi-year pull. [`try_fetch_year`] reports
//! what went wrong as a [`FetchOutcome`]; [`fetch_year`] flattens that to an
//! empty row set for callers that only care about the data.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

use super::{HttpClient, fetch_bytes};
use crate::metrics::{Metric, MetricRow};
use crate::normalize::coerce_numeric;
use crate::schools::Roster;

pub const DEFAULT_API_URL: &str = "https://api.data.gov/ed/collegescorecard/v1/schools";
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Name used when neither the roster nor the API knows the institution.
pub const UNKNOWN_INSTITUTION: &str = "Unknown";

/// Where and how to query the Scorecard API.
#[derive(Debug, Clone)]
pub struct ScorecardApi {
    pub base_url: reqwest::Url,
    pub per_page: u32,
}

impl ScorecardApi {
    pub fn new(base_url: &str, per_page: u32) -> Result<Self> {
        Ok(Self {
            base_url: base_url.parse()?,
            per_page,
        })
    }

    /// Builds the request URL for `year`, asking only for the fields we use.
    /// The API key is not included; [`crate::fetch::auth::UrlParam`] adds it.
    pub fn year_url(&self, unitids: &[i64], year: i32) -> reqwest::Url {
        let ids = unitids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut fields = vec!["id".to_string(), "school.name".to_string()];
        fields.extend(Metric::ALL.iter().map(|m| m.year_field(year)));

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("id__in", &ids)
            .append_pair("fields", &fields.join(","))
            .append_pair("per_page", &self.per_page.to_string());
        url
    }
}

/// Why a year produced no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// Year not four digits, or nothing to ask for.
    InvalidRequest,
    /// Timeout, connection refused, or the body could not be read.
    Transport,
    /// The server answered with a non-2xx status.
    Status,
    /// The body was not the JSON we expected.
    Body,
    /// The response parsed but contained no results.
    NoResults,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchFailure::InvalidRequest => "invalid request",
            FetchFailure::Transport => "transport error",
            FetchFailure::Status => "HTTP error status",
            FetchFailure::Body => "unparsable response",
            FetchFailure::NoResults => "no results",
        };
        f.write_str(s)
    }
}

/// Result of fetching a single year.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Rows(Vec<MetricRow>),
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn into_rows(self) -> Vec<MetricRow> {
        match self {
            FetchOutcome::Rows(rows) => rows,
            FetchOutcome::Failed(_) => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct SchoolsPage {
    #[serde(default)]
    results: Vec<Map<String, Value>>,
}

/// Fetches every metric for every institution on the roster for one year.
///
/// Returns an empty vector when the year could not be retrieved.
pub async fn fetch_year<C: HttpClient>(
    client: &C,
    api: &ScorecardApi,
    roster: &Roster,
    year: i32,
) -> Vec<MetricRow> {
    try_fetch_year(client, api, roster, year).await.into_rows()
}

/// Like [`fetch_year`], but says why a year came back empty.
#[tracing::instrument(skip(client, api, roster))]
pub async fn try_fetch_year<C: HttpClient>(
    client: &C,
    api: &ScorecardApi,
    roster: &Roster,
    year: i32,
) -> FetchOutcome {
    if !(1000..=9999).contains(&year) || roster.is_empty() {
        warn!(year, "Refusing to fetch: year must have four digits and roster must not be empty");
        return FetchOutcome::Failed(FetchFailure::InvalidRequest);
    }

    let url = api.year_url(&roster.unitids(), year);

    let bytes = match fetch_bytes(client, url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let failure = match e.downcast_ref::<reqwest::Error>() {
                Some(re) if re.is_status() => FetchFailure::Status,
                _ => FetchFailure::Transport,
            };
            warn!(year, error = %e, %failure, "Error fetching data for year");
            return FetchOutcome::Failed(failure);
        }
    };
    debug!(year, bytes = bytes.len(), "Response received");

    match parse_results(&bytes, roster, year) {
        Ok(rows) if rows.is_empty() => {
            warn!(year, "No data returned for year");
            FetchOutcome::Failed(FetchFailure::NoResults)
        }
        Ok(rows) => {
            debug!(year, rows = rows.len(), "Parsed results");
            FetchOutcome::Rows(rows)
        }
        Err(e) => {
            warn!(year, error = %e, "Error parsing JSON response for year");
            FetchOutcome::Failed(FetchFailure::Body)
        }
    }
}

/// Turns a Scorecard response body into rows for `year`.
///
/// Results without a usable `id` are dropped.
pub fn parse_results(body: &[u8], roster: &Roster, year: i32) -> Result<Vec<MetricRow>> {
    let page: SchoolsPage = serde_json::from_slice(body)?;

    let rows = page
        .results
        .iter()
        .filter_map(|item| row_from_item(item, roster, year))
        .collect();

    Ok(rows)
}

fn row_from_item(item: &Map<String, Value>, roster: &Roster, year: i32) -> Option<MetricRow> {
    let unitid = item.get("id").and_then(Value::as_i64).filter(|id| *id != 0)?;

    let name = roster
        .name_of(unitid)
        .or_else(|| item.get("school.name").and_then(Value::as_str))
        .unwrap_or(UNKNOWN_INSTITUTION);

    let mut row = MetricRow::new(name, unitid, year);
    for metric in Metric::ALL {
        let value = item.get(&metric.year_field(year)).and_then(coerce_numeric);
        row.set(metric, value);
    }

    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    enum Reply {
        Json(u16, Value),
        Raw(u16, &'static str),
        TransportError,
    }

    struct FakeClient(Reply);

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let (status, body) = match &self.0 {
                Reply::Json(status, v) => (*status, v.to_string()),
                Reply::Raw(status, s) => (*status, s.to_string()),
                Reply::TransportError => {
                    // A malformed URL is the simplest way to obtain a reqwest::Error offline.
                    return Err(reqwest::Client::new().get("http://[::1").build().unwrap_err());
                }
            };
            Ok(http::Response::builder()
                .status(status)
                .body(body)
                .unwrap()
                .into())
        }
    }

    fn api_result(unitid: i64, year: i32, name: &str) -> Value {
        json!({
            "id": unitid,
            "school.name": name,
            format!("{year}.student.size"): 1000,
            format!("{year}.admissions.admission_rate.overall"): 0.5,
            format!("{year}.student.retention_rate.four_year.full_time"): 0.9,
            format!("{year}.completion.completion_rate_4yr_150nt"): 0.75,
            format!("{year}.cost.tuition.in_state"): 50000,
            format!("{year}.cost.avg_net_price.private"): 30000,
        })
    }

    fn api() -> ScorecardApi {
        ScorecardApi::new(DEFAULT_API_URL, DEFAULT_PER_PAGE).unwrap()
    }

    async fn run(reply: Reply) -> FetchOutcome {
        let client = FakeClient(reply);
        try_fetch_year(&client, &api(), &Roster::default(), 2020).await
    }

    #[test]
    fn test_year_url_lists_only_needed_fields() {
        let api = api();
        let url = api.year_url(&[164748, 192110], 2020);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs[0], ("id__in".into(), "164748,192110".into()));
        assert_eq!(pairs[1].0, "fields");
        let fields: Vec<&str> = pairs[1].1.split(',').collect();
        assert_eq!(fields.len(), 2 + Metric::ALL.len());
        assert_eq!(&fields[..3], &["id", "school.name", "2020.student.size"]);
        assert_eq!(pairs[2], ("per_page".into(), "100".into()));
    }

    #[tokio::test]
    async fn test_happy_path_returns_rows() {
        let body = json!({"results": [
            api_result(164748, 2020, "Berklee"),
            api_result(192110, 2020, "Juilliard"),
        ]});

        let rows = run(Reply::Json(200, body)).await.into_rows();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].institution, "Berklee College of Music");
        assert_eq!(rows[1].institution, "The Juilliard School");
        assert_eq!(rows[0].year, 2020);
        assert_eq!(rows[0].enrollment_total, Some(1000));
        assert_eq!(rows[0].admission_rate, Some(0.5));
        assert_eq!(rows[0].retention_rate_ft, Some(0.9));
        assert_eq!(rows[0].grad_rate_150, Some(0.75));
        assert_eq!(rows[0].tuition_fees, Some(50000.0));
        assert_eq!(rows[0].avg_net_price, Some(30000.0));
    }

    #[tokio::test]
    async fn test_skips_results_with_missing_id() {
        let mut no_id = api_result(0, 2020, "Ghost");
        no_id.as_object_mut().unwrap().remove("id");
        let body = json!({"results": [
            api_result(164748, 2020, "Berklee"),
            no_id,
            api_result(0, 2020, "Zero"),
            {"id": null},
        ]});

        let rows = run(Reply::Json(200, body)).await.into_rows();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unitid, 164748);
    }

    #[tokio::test]
    async fn test_uses_remote_name_then_unknown() {
        let mut nameless = api_result(222222, 2020, "");
        nameless.as_object_mut().unwrap().remove("school.name");
        let body = json!({"results": [
            api_result(111111, 2020, "Unknown Music Academy"),
            nameless,
        ]});

        let rows = run(Reply::Json(200, body)).await.into_rows();

        assert_eq!(rows[0].institution, "Unknown Music Academy");
        assert_eq!(rows[1].institution, UNKNOWN_INSTITUTION);
    }

    #[tokio::test]
    async fn test_missing_metric_values_are_none() {
        let body = json!({"results": [{
            "id": 164748,
            "2020.student.size": null,
            "2020.admissions.admission_rate.overall": "0.42",
            "2020.cost.tuition.in_state": "n/a",
        }]});

        let rows = run(Reply::Json(200, body)).await.into_rows();

        assert_eq!(rows[0].enrollment_total, None);
        assert_eq!(rows[0].admission_rate, Some(0.42));
        assert_eq!(rows[0].tuition_fees, None);
        assert_eq!(rows[0].avg_net_price, None);
    }

    #[tokio::test]
    async fn test_empty_results_is_failure() {
        let outcome = run(Reply::Json(200, json!({"results": []}))).await;
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::NoResults));

        let outcome = run(Reply::Json(200, json!({"metadata": {}}))).await;
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::NoResults));
    }

    #[tokio::test]
    async fn test_http_error_is_failure() {
        let outcome = run(Reply::Json(500, json!({"error": "boom"}))).await;
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::Status));
    }

    #[tokio::test]
    async fn test_invalid_json_is_failure() {
        let outcome = run(Reply::Raw(200, "<html>not json</html>")).await;
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::Body));
    }

    #[tokio::test]
    async fn test_transport_error_is_failure() {
        let outcome = run(Reply::TransportError).await;
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::Transport));
    }

    #[tokio::test]
    async fn test_fetch_year_flattens_failures_to_empty() {
        let client = FakeClient(Reply::TransportError);
        let rows =
            fetch_year(&client, &api(), &Roster::default(), 2020).await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_year_is_rejected() {
        let client = FakeClient(Reply::Json(200, json!({"results": []})));
        let outcome =
            try_fetch_year(&client, &api(), &Roster::default(), 99).await;
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::InvalidRequest));
    }
}
