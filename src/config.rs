use anyhow::{Result, bail};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::scorecard::ScorecardApi;
use crate::schools::Roster;

pub const DEFAULT_START_YEAR: i32 = 2012;
pub const DEFAULT_END_YEAR: i32 = 2022;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything a run needs besides the HTTP client and today's date.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub api: ScorecardApi,
    pub roster: Roster,
    pub years: Vec<i32>,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl RunConfig {
    pub fn new(
        api: ScorecardApi,
        roster: Roster,
        start_year: i32,
        end_year: i32,
        output_dir: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        for year in [start_year, end_year] {
            if !(1000..=9999).contains(&year) {
                bail!("year {year} is not a four-digit calendar year");
            }
        }
        if start_year > end_year {
            bail!("start year {start_year} is after end year {end_year}");
        }
        if roster.is_empty() {
            bail!("no institutions to fetch");
        }
        if api.per_page == 0 {
            bail!("page size must be positive");
        }
        if roster.len() > api.per_page as usize {
            bail!(
                "{} institutions will not fit in one page of {} results",
                roster.len(),
                api.per_page
            );
        }
        if timeout.is_zero() {
            bail!("timeout must be positive");
        }

        Ok(Self {
            api,
            roster,
            years: (start_year..=end_year).collect(),
            output_dir,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::scorecard::{DEFAULT_API_URL, DEFAULT_PER_PAGE};

    fn build(start: i32, end: i32, roster: Roster, per_page: u32) -> Result<RunConfig> {
        RunConfig::new(
            ScorecardApi::new(DEFAULT_API_URL, per_page).unwrap(),
            roster,
            start,
            end,
            PathBuf::from("."),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    #[test]
    fn test_default_years() {
        let config = build(
            DEFAULT_START_YEAR,
            DEFAULT_END_YEAR,
            Roster::default(),
            DEFAULT_PER_PAGE,
        )
        .unwrap();
        assert_eq!(config.years.len(), 11);
        assert_eq!(config.years.first(), Some(&2012));
        assert_eq!(config.years.last(), Some(&2022));
    }

    #[test]
    fn test_rejects_bad_years() {
        assert!(build(2022, 2012, Roster::default(), 100).is_err());
        assert!(build(99, 2012, Roster::default(), 100).is_err());
        assert!(build(2012, 20222, Roster::default(), 100).is_err());
    }

    #[test]
    fn test_rejects_empty_roster_and_small_pages() {
        let empty = Roster::from_pairs(Vec::<(i64, String)>::new());
        assert!(build(2020, 2020, empty, 100).is_err());
        assert!(build(2020, 2020, Roster::default(), 0).is_err());
        assert!(build(2020, 2020, Roster::default(), 3).is_err());
    }
}
