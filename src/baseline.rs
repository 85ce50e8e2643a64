//! Anomalies against each model's own historical baseline
//!
//! For every stored `{variable}_{scenario}_{model}` the per-cell mean of
//! `{variable}_historical_{model}` over the baseline years is subtracted,
//! and the result is written as `Normalized_{variable}_{scenario}_{model}`.

use crate::dataset::NormalizedModelDataset;
use crate::errors::{Result, WranglerError};
use crate::pipeline::BatchReport;
use crate::statistics::nan_mean;
use crate::store::{names, DatasetStore};
use chrono::Datelike;
use ndarray::{Array2, Axis, Zip};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

/// Scenario holding the baseline period
pub const HISTORICAL: &str = "historical";

/// Inclusive range of years averaged into the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselinePeriod {
    pub start_year: i32,
    pub end_year: i32,
}

impl Default for BaselinePeriod {
    fn default() -> Self {
        Self {
            start_year: 1850,
            end_year: 1950,
        }
    }
}

impl BaselinePeriod {
    pub fn contains(&self, year: i32) -> bool {
        (self.start_year..=self.end_year).contains(&year)
    }
}

/// Per-cell NaN-aware mean of `historical` over `period`
pub fn baseline_mean(historical: &NormalizedModelDataset, period: BaselinePeriod) -> Result<Array2<f32>> {
    let selected: Vec<usize> = historical
        .time
        .iter()
        .enumerate()
        .filter(|(_, date)| period.contains(date.year()))
        .map(|(i, _)| i)
        .collect();
    if selected.is_empty() {
        return Err(WranglerError::EmptyInput(format!(
            "no time steps between {} and {}",
            period.start_year, period.end_year
        )));
    }

    let window = historical.data.select(Axis(0), &selected);
    let mut baseline = Array2::<f32>::from_elem((historical.grid.nlat(), historical.grid.nlon()), f32::NAN);
    Zip::from(&mut baseline)
        .and(window.lanes(Axis(0)))
        .par_for_each(|b, lane| *b = nan_mean(lane.iter().copied()));
    Ok(baseline)
}

/// Subtract a `(lat, lon)` baseline from every time step
pub fn subtract_baseline(
    dataset: &NormalizedModelDataset,
    baseline: &Array2<f32>,
    period: BaselinePeriod,
) -> Result<NormalizedModelDataset> {
    if baseline.dim() != (dataset.grid.nlat(), dataset.grid.nlon()) {
        return Err(WranglerError::ShapeMismatch {
            name: "baseline".to_string(),
            expected: vec![dataset.grid.nlat(), dataset.grid.nlon()],
            found: baseline.shape().to_vec(),
        });
    }
    let mut data = dataset.data.clone();
    for mut field in data.axis_iter_mut(Axis(0)) {
        field -= baseline;
    }
    let mut attrs = dataset.attrs.clone();
    attrs.insert(
        "baseline_period".to_string(),
        json!([period.start_year, period.end_year]),
    );
    NormalizedModelDataset::new(&dataset.variable, dataset.time.clone(), dataset.grid.clone(), data, attrs)
}

/// Write `Normalized_*` stores for every scenario and model that has both a
/// scenario store and a historical store
pub fn normalize_to_baseline(
    store: &DatasetStore,
    model_names: &[String],
    variable: &str,
    scenarios: &[String],
    period: BaselinePeriod,
) -> BatchReport {
    let mut report = BatchReport::new("baseline");
    for model in model_names {
        let historical_name = names::model(variable, HISTORICAL, model);
        if !store.exists(&historical_name) {
            warn!(model = %model, "⚠ No historical store, skipping baseline normalization");
            report.record_skip();
            continue;
        }

        let baseline = match store
            .load_model(&historical_name, variable)
            .and_then(|historical| baseline_mean(&historical, period))
        {
            Ok(baseline) => baseline,
            Err(e) => {
                error!(model = %model, error = %e, "❌ Baseline computation failed");
                report.record_failure(historical_name, &e);
                continue;
            }
        };

        for scenario in scenarios {
            let source = names::model(variable, scenario, model);
            if !store.exists(&source) {
                continue;
            }
            let target = names::normalized_model(variable, scenario, model);
            let result = store
                .load_model(&source, variable)
                .and_then(|dataset| subtract_baseline(&dataset, &baseline, period))
                .and_then(|normalized| store.save_model_as(&target, &normalized));
            match result {
                Ok(()) => {
                    info!(store = %target, "✅ Baseline normalized");
                    report.record_success();
                }
                Err(e) => {
                    error!(store = %target, error = %e, "❌ Baseline normalization failed");
                    report.record_failure(target, &e);
                }
            }
        }
    }
    report
}
