//! Declarative skip table for known-failing (variable, scenario, model) runs
//!
//! Some CMIP6 runs break normalization (duplicate lat/lon names, duplicate
//! time indices, calendars the reindexer cannot decode). They are listed
//! here once and consulted with a single lookup per key.

use crate::errors::{Result, WranglerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Entries shipped with the crate, in `{variable}_{scenario}_{model}` form
pub const DEFAULT_EXCEPTIONS: [&str; 11] = [
    "tas_historical_CESM2",
    "tas_ssp126_CanESM5",
    "tas_ssp126_CAMS-CSM1-0",
    "tas_ssp245_CAMS-CSM1-0",
    "tas_ssp245_HadGEM3-GC31-LL",
    "tas_ssp370_CESM2-WACCM",
    "tas_ssp370_MPI-ESM1-2-HR",
    "tas_ssp370_CAMS-CSM1-0",
    "tas_ssp370_BCC-ESM1",
    "tas_ssp585_CAMS-CSM1-0",
    "tas_ssp585_CanESM5",
];

/// One skipped combination
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExceptionKey {
    pub variable: String,
    pub scenario: String,
    pub model: String,
}

impl ExceptionKey {
    pub fn new(variable: &str, scenario: &str, model: &str) -> Self {
        Self {
            variable: variable.to_string(),
            scenario: scenario.to_string(),
            model: model.to_string(),
        }
    }
}

impl fmt::Display for ExceptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.variable, self.scenario, self.model)
    }
}

impl FromStr for ExceptionKey {
    type Err = WranglerError;

    /// Parses `tas_ssp126_CAMS-CSM1-0`; the model part may itself contain
    /// underscores, variable and scenario may not.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(sc), Some(m)) if !v.is_empty() && !sc.is_empty() && !m.is_empty() => {
                Ok(Self::new(v, sc, m))
            }
            _ => Err(WranglerError::InvalidConfig(format!(
                "exception entry '{s}' is not of the form <variable>_<scenario>_<model>"
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExceptionEntry {
    Name(String),
    Key(ExceptionKey),
}

/// Set of combinations to skip during normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionList {
    entries: BTreeSet<ExceptionKey>,
}

impl ExceptionList {
    /// An empty list: nothing is skipped
    pub fn empty() -> Self {
        Self::default()
    }

    /// The eleven combinations known to fail for `tas`
    pub fn builtin() -> Self {
        Self::from_names(DEFAULT_EXCEPTIONS).unwrap_or_default()
    }

    /// Build from `{variable}_{scenario}_{model}` strings
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = names
            .into_iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(Self { entries })
    }

    /// Load a JSON array whose items are either names or
    /// `{"variable", "scenario", "model"}` objects
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: Vec<ExceptionEntry> = serde_json::from_str(json)?;
        let mut entries = BTreeSet::new();
        for entry in raw {
            let key = match entry {
                ExceptionEntry::Name(name) => name.parse()?,
                ExceptionEntry::Key(key) => key,
            };
            entries.insert(key);
        }
        Ok(Self { entries })
    }

    /// Load from a JSON file, see [`ExceptionList::from_json_str`]
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn insert(&mut self, key: ExceptionKey) -> bool {
        self.entries.insert(key)
    }

    /// Whether normalization of this combination must be skipped
    pub fn contains(&self, variable: &str, scenario: &str, model: &str) -> bool {
        self.entries
            .contains(&ExceptionKey::new(variable, scenario, model))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExceptionKey> {
        self.entries.iter()
    }
}
