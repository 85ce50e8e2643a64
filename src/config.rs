//! Pipeline configuration
//!
//! Every field has a default matching the standard five-scenario `tas`
//! analysis, so a config file only needs the values it changes. Directories
//! not given explicitly are derived from `data_dir`.

use crate::baseline::BaselinePeriod;
use crate::catalog::{CatalogQuery, CompositeKey};
use crate::errors::{Result, WranglerError};
use crate::exceptions::ExceptionList;
use crate::observations::DEFAULT_SKIP_MONTHS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SCENARIOS: [&str; 5] = ["historical", "ssp126", "ssp370", "ssp245", "ssp585"];
pub const DEFAULT_REFERENCE_KEY: &str = "CMIP.BCC.BCC-CSM2-MR.historical.Amon.gn";
pub const DEFAULT_NUM_CHUNKS: usize = 20;

const CATALOG_FILE_NAME: &str = "catalog.json";
const STORE_DIR_NAME: &str = "stores";

/// Parameters of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Base directory for every derived path
    pub data_dir: PathBuf,
    /// ESM collection JSON; defaults to `<data_dir>/catalog.json`
    pub catalog: Option<PathBuf>,
    /// Root of persisted stores; defaults to `<data_dir>/stores`
    pub store_dir: Option<PathBuf>,
    pub scenarios: Vec<String>,
    pub variable: String,
    pub table: String,
    pub grid_label: String,
    /// Run whose lat/lon become the reference grid
    pub reference_key: CompositeKey,
    /// Latitude bands used by the multi-model reducer
    pub num_chunks: usize,
    /// Gridded observation file; the observation stage is skipped when unset
    pub observations_file: Option<PathBuf>,
    pub skip_months: usize,
    /// Also produce baseline-normalized stores and their statistics
    pub baseline_enabled: bool,
    pub baseline: BaselinePeriod,
    /// JSON exception list replacing the built-in one
    pub exceptions_file: Option<PathBuf>,
    pub use_builtin_exceptions: bool,
    pub global_means: bool,
    /// Worker threads for per-cell reductions; all cores when unset
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            catalog: None,
            store_dir: None,
            scenarios: DEFAULT_SCENARIOS.iter().map(|s| s.to_string()).collect(),
            variable: "tas".to_string(),
            table: "Amon".to_string(),
            grid_label: "gn".to_string(),
            reference_key: CompositeKey::new("CMIP", "BCC", "BCC-CSM2-MR", "historical", "Amon", "gn"),
            num_chunks: DEFAULT_NUM_CHUNKS,
            observations_file: None,
            skip_months: DEFAULT_SKIP_MONTHS,
            baseline_enabled: false,
            baseline: BaselinePeriod::default(),
            exceptions_file: None,
            use_builtin_exceptions: true,
            global_means: true,
            threads: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can run with
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(WranglerError::InvalidConfig(
                "at least one scenario is required".to_string(),
            ));
        }
        if self.num_chunks == 0 {
            return Err(WranglerError::InvalidConfig(
                "num_chunks must be at least 1".to_string(),
            ));
        }
        if self.variable.is_empty() {
            return Err(WranglerError::InvalidConfig("variable is empty".to_string()));
        }
        if self.threads == Some(0) {
            return Err(WranglerError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.baseline.start_year > self.baseline.end_year {
            return Err(WranglerError::InvalidConfig(format!(
                "baseline start {} is after end {}",
                self.baseline.start_year, self.baseline.end_year
            )));
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| self.data_dir.join(CATALOG_FILE_NAME))
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(STORE_DIR_NAME))
    }

    pub fn query(&self) -> CatalogQuery {
        CatalogQuery {
            scenarios: self.scenarios.clone(),
            variable: self.variable.clone(),
            table: self.table.clone(),
            grid_label: self.grid_label.clone(),
        }
    }

    /// Exception list from the configured file, the built-in table, or none
    pub fn exception_list(&self) -> Result<ExceptionList> {
        match (&self.exceptions_file, self.use_builtin_exceptions) {
            (Some(path), _) => ExceptionList::from_file(path),
            (None, true) => Ok(ExceptionList::builtin()),
            (None, false) => Ok(ExceptionList::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reference_key.to_string(), DEFAULT_REFERENCE_KEY);
        assert_eq!(config.store_dir(), PathBuf::from("data/stores"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"data_dir": "/tmp/run", "scenarios": ["ssp585"], "num_chunks": 4}"#,
        )
        .unwrap();
        assert_eq!(config.scenarios, vec!["ssp585".to_string()]);
        assert_eq!(config.variable, "tas");
        assert_eq!(config.catalog_path(), PathBuf::from("/tmp/run/catalog.json"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(PipelineConfig::from_json_str(r#"{"scenarios": []}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"num_chunks": 0}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"reference_key": "CMIP.BCC"}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"unknown": 1}"#).is_err());
    }
}
