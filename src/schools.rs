//! The institutions we track and their display names.

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;

/// An institution identified by its Department of Education unit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Institution {
    pub unitid: i64,
    pub name: String,
}

/// Default set of music schools, by DOE unit identification number.
const DEFAULT_SCHOOLS: &[(i64, &str)] = &[
    (164748, "Berklee College of Music"),
    (192110, "The Juilliard School"),
    (167057, "New England Conservatory"),
    (192712, "Manhattan School of Music"),
    (211893, "Curtis Institute of Music"),
];

/// Immutable list of institutions to fetch, doubling as the display-name lookup.
#[derive(Debug, Clone)]
pub struct Roster {
    institutions: Vec<Institution>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_SCHOOLS.iter().map(|(id, name)| (*id, *name)))
    }
}

impl Roster {
    pub fn from_pairs<N: Into<String>>(pairs: impl IntoIterator<Item = (i64, N)>) -> Self {
        let institutions = pairs
            .into_iter()
            .map(|(unitid, name)| Institution {
                unitid,
                name: name.into(),
            })
            .collect();
        Self { institutions }
    }

    /// Loads a roster from a JSON file mapping unit ids to names:
    /// ```json
    /// {
    ///   "164748": "Berklee College of Music",
    ///   "192110": "The Juilliard School"
    /// }
    /// ```
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster file '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("invalid roster file '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, String> = serde_json::from_str(content)?;

        let mut pairs = Vec::with_capacity(entries.len());
        for (key, name) in entries {
            let unitid: i64 = key
                .trim()
                .parse()
                .with_context(|| format!("unit id '{key}' is not a number"))?;
            if unitid <= 0 {
                bail!("unit id {unitid} must be positive");
            }
            pairs.push((unitid, name));
        }
        pairs.sort_by_key(|(id, _)| *id);

        Ok(Self::from_pairs(pairs))
    }

    /// Display name for `unitid`, if it is on the roster.
    pub fn name_of(&self, unitid: i64) -> Option<&str> {
        self.institutions
            .iter()
            .find(|i| i.unitid == unitid)
            .map(|i| i.name.as_str())
    }

    pub fn unitids(&self) -> Vec<i64> {
        self.institutions.iter().map(|i| i.unitid).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Institution> {
        self.institutions.iter()
    }

    pub fn len(&self) -> usize {
        self.institutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.institutions.is_empty()
    }
}
