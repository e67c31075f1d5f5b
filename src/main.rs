//! CLI entry point for the music school metrics harvester.
//!
//! Pulls College Scorecard data for a fixed roster of music schools and
//! exports it either as a CSV file or as a SQLite database with views.

use anyhow::{Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use music_school_metrics::config::{
    DEFAULT_END_YEAR, DEFAULT_START_YEAR, DEFAULT_TIMEOUT_SECS, RunConfig,
};
use music_school_metrics::fetch::auth::UrlParam;
use music_school_metrics::fetch::scorecard::{DEFAULT_API_URL, DEFAULT_PER_PAGE, ScorecardApi};
use music_school_metrics::fetch::BasicClient;
use music_school_metrics::interrupt::until_interrupted;
use music_school_metrics::pipeline::{Export, export_csv, export_sqlite};
use music_school_metrics::schools::Roster;
use music_school_metrics::store::MetricsStore;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "music_school_metrics")]
#[command(about = "Export College Scorecard metrics for music schools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all years and save them as a CSV file
    Csv(FetchArgs),
    /// Fetch all years and save them in a SQLite database with query views
    Sqlite(FetchArgs),
    /// Print the per-school summary from an existing database
    Summary {
        /// Database produced by the `sqlite` command
        #[arg(value_name = "DB")]
        db: PathBuf,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// api.data.gov key
    #[arg(long, env = "SCORECARD_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Scorecard schools endpoint
    #[arg(long, env = "SCORECARD_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// First year to fetch
    #[arg(long, default_value_t = DEFAULT_START_YEAR)]
    start_year: i32,

    /// Last year to fetch (inclusive)
    #[arg(long, default_value_t = DEFAULT_END_YEAR)]
    end_year: i32,

    /// Directory the output file is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// JSON file mapping unit ids to school names (replaces the built-in list)
    #[arg(long)]
    schools: Option<String>,

    /// Results requested per API call
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,

    /// Timeout for each API call, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl FetchArgs {
    fn into_config(self) -> Result<(RunConfig, String)> {
        let roster = match &self.schools {
            Some(path) => Roster::load(path)?,
            None => Roster::default(),
        };
        let config = RunConfig::new(
            ScorecardApi::new(&self.api_url, self.per_page)?,
            roster,
            self.start_year,
            self.end_year,
            self.output_dir,
            Duration::from_secs(self.timeout_secs),
        )?;
        Ok((config, self.api_key))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing();
    let cli = Cli::parse();

    match until_interrupted(run(cli), tokio::signal::ctrl_c()).await {
        Some(Ok(())) => ExitCode::SUCCESS,
        Some(Err(e)) => {
            error!(error = %format!("{e:#}"), "Operation failed. Check your API key and network connection.");
            ExitCode::FAILURE
        }
        None => {
            warn!("Operation cancelled by user.");
            ExitCode::SUCCESS
        }
    }
}

/// Colored stderr output plus a JSON rolling log file.
fn init_tracing() -> WorkerGuard {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/music_school_metrics.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("music_school_metrics.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    file_guard
}

async fn run(cli: Cli) -> Result<()> {
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Csv(args) => {
            let (config, api_key) = args.into_config()?;
            let client = UrlParam::api_key(BasicClient::new(config.timeout)?, api_key);
            let export = export_csv(&client, &config, today).await?;
            report(&export);
        }
        Commands::Sqlite(args) => {
            let (config, api_key) = args.into_config()?;
            let client = UrlParam::api_key(BasicClient::new(config.timeout)?, api_key);
            let export = export_sqlite(&client, &config, today).await?;
            report(&export);
            info!(
                "Available views: v_school_metrics (all data with school names), \
                 v_metrics_yoy (year-over-year changes), v_school_summary (per-school statistics)"
            );
            info!(
                "Example query: sqlite3 -header -column {} \"SELECT * FROM v_school_metrics;\"",
                export.path.display()
            );
        }
        Commands::Summary { db } => {
            if !db.exists() {
                bail!("database {} does not exist", db.display());
            }
            let store = MetricsStore::open_read_only(&db)?;
            for s in store.summaries()? {
                info!(
                    school = %s.institution_name,
                    unitid = s.unitid,
                    years = s.years_of_data,
                    first_year = ?s.first_year,
                    last_year = ?s.last_year,
                    avg_enrollment = ?s.avg_enrollment,
                    avg_admission_rate = ?s.avg_admission_rate,
                    avg_retention_rate = ?s.avg_retention_rate,
                    avg_grad_rate = ?s.avg_grad_rate,
                    avg_tuition = ?s.avg_tuition,
                    avg_net_price = ?s.avg_net_price,
                    "School summary"
                );
            }
        }
    }

    Ok(())
}

fn report(export: &Export) {
    if !export.failed_years.is_empty() {
        warn!(failed_years = ?export.failed_years, "Failed to retrieve data for years");
    }
    if let Some(upsert) = &export.upsert {
        if upsert.skipped_unknown > 0 || upsert.failed > 0 {
            warn!(
                skipped_unknown = upsert.skipped_unknown,
                failed = upsert.failed,
                "Some rows were not stored"
            );
        }
    }
    info!(
        path = %export.path.display(),
        rows = export.rows,
        institutions = export.institutions,
        "Export complete"
    );
}
