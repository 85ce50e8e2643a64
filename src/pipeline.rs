//! Batch driver running the stages in order
//!
//! - A: resolve the catalog
//! - B: clear `{variable}_*`, build the reference grid, normalize every key
//! - optional: baseline normalization into `Normalized_*` stores
//! - C: clear `modelData_{variable}_*`, reduce every scenario
//! - D: clear and rebuild `historical_obs`, when an observation file is set
//! - E: global means per model and across models
//!
//! Item-level errors (one key, one scenario) are logged and counted in a
//! [`BatchReport`]; stage-level errors end the run.

use crate::baseline::normalize_to_baseline;
use crate::catalog::{self, Resolution};
use crate::config::PipelineConfig;
use crate::errors::{Result, WranglerError};
use crate::grid::build_reference_grid;
use crate::normalize::normalize_all;
use crate::observations::{process_observations, save_observations};
use crate::statistics::{process_global_means, process_scenario};
use crate::store::{names, DatasetStore};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One failed item of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Per-item outcome counts of one batch stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub stage: String,
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, item: impl Into<String>, err: &WranglerError) {
        self.failures.push(ItemFailure {
            item: item.into(),
            error: err.to_string(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn log_summary(&self) {
        if self.is_clean() {
            info!(
                stage = %self.stage,
                succeeded = self.succeeded,
                skipped = self.skipped,
                "📋 Batch finished"
            );
        } else {
            warn!(
                stage = %self.stage,
                succeeded = self.succeeded,
                skipped = self.skipped,
                failed = self.failed(),
                "📋 Batch finished with failures"
            );
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} skipped, {} failed",
            self.stage,
            self.succeeded,
            self.skipped,
            self.failed()
        )?;
        for failure in &self.failures {
            write!(f, "\n  - {}: {}", failure.item, failure.error)?;
        }
        Ok(())
    }
}

/// Wall-clock time of one stage
#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed: Duration,
}

impl StageTiming {
    pub fn minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}

/// Everything a full run produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<BatchReport>,
    pub timings: Vec<StageTiming>,
    /// Statistics and observation stores written
    pub written: Vec<String>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.reports.iter().all(BatchReport::is_clean)
    }
}

/// Pipeline over one configuration and one store root
pub struct Pipeline {
    config: PipelineConfig,
    store: DatasetStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let store = DatasetStore::new(config.store_dir());
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Stage A
    pub fn resolve(&self) -> Result<Resolution> {
        let catalog_path = self.config.catalog_path();
        catalog::resolve_path(&catalog_path.to_string_lossy(), &self.config.query())
    }

    /// Stage B
    pub fn normalize_models(&self, resolution: &Resolution) -> Result<BatchReport> {
        let variable = &self.config.variable;
        self.store.delete_matching(&format!("{variable}_*"))?;
        let grid = build_reference_grid(&resolution.datasets, &self.config.reference_key)?;
        let exceptions = self.config.exception_list()?;
        let report = normalize_all(&resolution.datasets, &grid, &exceptions, &self.store);
        report.log_summary();
        Ok(report)
    }

    /// Baseline normalization of every stored model
    pub fn normalize_baselines(&self, model_names: &[String]) -> Result<BatchReport> {
        let variable = &self.config.variable;
        self.store
            .delete_matching(&format!("{}{variable}_*", names::NORMALIZED_PREFIX))?;
        let report = normalize_to_baseline(
            &self.store,
            model_names,
            variable,
            &self.config.scenarios,
            self.config.baseline,
        );
        report.log_summary();
        Ok(report)
    }

    /// Stage C; returns the report and the written store names
    pub fn compute_statistics(&self, model_names: &[String], normalized: bool) -> Result<(BatchReport, Vec<String>)> {
        let variable = &self.config.variable;
        let pattern = if normalized {
            format!("modelData_normalized_{variable}_*")
        } else {
            format!("modelData_{variable}_*")
        };
        self.store.delete_matching(&pattern)?;

        let stage = if normalized { "statistics (normalized)" } else { "statistics" };
        let mut report = BatchReport::new(stage);
        let mut written = Vec::new();
        for scenario in &self.config.scenarios {
            match process_scenario(
                &self.store,
                model_names,
                variable,
                scenario,
                self.config.num_chunks,
                normalized,
            ) {
                Ok(Some(name)) => {
                    report.record_success();
                    written.push(name);
                }
                Ok(None) => report.record_skip(),
                Err(e) => {
                    error!(scenario = %scenario, error = %e, "❌ Scenario statistics failed");
                    report.record_failure(scenario.clone(), &e);
                }
            }
        }
        report.log_summary();
        Ok((report, written))
    }

    /// Stage D; `None` when no observation file is configured
    pub fn process_observations(&self) -> Result<Option<String>> {
        let Some(path) = &self.config.observations_file else {
            info!("No observation file configured, skipping observations");
            return Ok(None);
        };
        self.store.delete_matching(names::OBSERVATIONS)?;
        let obs = process_observations(path, self.config.skip_months)?;
        save_observations(&self.store, &obs).map(Some)
    }

    /// Stage E
    pub fn compute_global_means(&self, model_names: &[String]) -> Result<(BatchReport, Vec<String>)> {
        let variable = &self.config.variable;
        self.store.delete_matching(&format!("{variable}_*_GLOBALMEAN"))?;
        self.store
            .delete_matching(&format!("{variable}_*_GLOBALMEAN_STATS"))?;

        let mut report = BatchReport::new("global means");
        let mut written = Vec::new();
        for scenario in &self.config.scenarios {
            match process_global_means(&self.store, model_names, variable, scenario) {
                Ok(Some(name)) => {
                    report.record_success();
                    written.push(name);
                }
                Ok(None) => report.record_skip(),
                Err(e) => {
                    error!(scenario = %scenario, error = %e, "❌ Global means failed");
                    report.record_failure(scenario.clone(), &e);
                }
            }
        }
        report.log_summary();
        Ok((report, written))
    }

    /// Run every stage in order
    pub fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let resolution = timed(&mut summary, "A: resolve", || self.resolve())?;
        if resolution.datasets.is_empty() {
            return Err(WranglerError::EmptyInput(format!(
                "catalog has no entries for {} in {:?}",
                self.config.variable, self.config.scenarios
            )));
        }
        let models = resolution.model_names.clone();

        let report = timed(&mut summary, "B: normalize", || self.normalize_models(&resolution))?;
        summary.reports.push(report);

        if self.config.baseline_enabled {
            let report = timed(&mut summary, "baseline", || self.normalize_baselines(&models))?;
            summary.reports.push(report);
        }

        let (report, written) = timed(&mut summary, "C: statistics", || {
            self.compute_statistics(&models, false)
        })?;
        summary.reports.push(report);
        summary.written.extend(written);

        if self.config.baseline_enabled {
            let (report, written) = timed(&mut summary, "C: statistics (normalized)", || {
                self.compute_statistics(&models, true)
            })?;
            summary.reports.push(report);
            summary.written.extend(written);
        }

        if let Some(name) = timed(&mut summary, "D: observations", || self.process_observations())? {
            summary.written.push(name);
        }

        if self.config.global_means {
            let (report, written) = timed(&mut summary, "E: global means", || {
                self.compute_global_means(&models)
            })?;
            summary.reports.push(report);
            summary.written.extend(written);
        }

        Ok(summary)
    }
}

fn timed<T>(summary: &mut RunSummary, stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    info!(stage, "🚀 Stage started");
    let start = Instant::now();
    let result = f();
    let timing = StageTiming {
        stage,
        elapsed: start.elapsed(),
    };
    info!(stage, minutes = timing.minutes(), "⏱ Time elapsed");
    summary.timings.push(timing);
    result
}
