//! Spatial means per model and their spread across models

use super::operations::nan_mean;
use super::parallel::reduce_models_series;
use crate::dataset::{GlobalMeanSeries, NormalizedModelDataset, SeriesStatistics};
use crate::errors::{Result, WranglerError};
use crate::store::{names, DatasetStore};
use ndarray::{Array1, Array2, Axis, Zip};
use tracing::{info, warn};

/// NaN-aware mean over lat and lon for every time step
pub fn global_mean(dataset: &NormalizedModelDataset, scenario: &str, model: &str) -> GlobalMeanSeries {
    let mut values = Array1::<f32>::from_elem(dataset.ntime(), f32::NAN);
    Zip::from(&mut values)
        .and(dataset.data.axis_iter(Axis(0)))
        .par_for_each(|value, field| *value = nan_mean(field.iter().copied()));

    GlobalMeanSeries {
        variable: dataset.variable.clone(),
        scenario: scenario.to_string(),
        model: model.to_string(),
        time: dataset.time.clone(),
        values,
    }
}

/// Mean/min/max/std across models of their global-mean series
pub fn reduce_series(series: &[GlobalMeanSeries]) -> Result<SeriesStatistics> {
    let first = series
        .first()
        .ok_or_else(|| WranglerError::EmptyInput("no global-mean series to reduce".to_string()))?;
    for other in &series[1..] {
        if other.time != first.time {
            return Err(WranglerError::CoordinateMismatch {
                name: other.model.clone(),
                axis: "time".to_string(),
            });
        }
    }

    let ntime = first.time.len();
    let mut stack = Array2::<f32>::zeros((series.len(), ntime));
    for (mut row, s) in stack.axis_iter_mut(Axis(0)).zip(series) {
        row.assign(&s.values);
    }
    let stats = reduce_models_series(stack.view());

    Ok(SeriesStatistics {
        variable: first.variable.clone(),
        scenario: first.scenario.clone(),
        time: first.time.clone(),
        model_count: series.len(),
        mean: stats.mean,
        min: stats.min,
        max: stats.max,
        std: stats.std,
    })
}

/// Compute, persist and reduce global means for every stored model of
/// `scenario`; returns the statistics store name when any model was found
pub fn process_global_means(
    store: &DatasetStore,
    model_names: &[String],
    variable: &str,
    scenario: &str,
) -> Result<Option<String>> {
    let mut series = Vec::new();
    for model in model_names {
        let name = names::model(variable, scenario, model);
        if !store.exists(&name) {
            continue;
        }
        let dataset = store.load_model(&name, variable)?;
        let s = global_mean(&dataset, scenario, model);
        store.save_series(&s)?;
        series.push(s);
    }

    if series.is_empty() {
        warn!(variable, scenario, "⚠ No model stores found for global means");
        return Ok(None);
    }

    let stats = reduce_series(&series)?;
    let name = store.save_series_statistics(&stats)?;
    info!(store = %name, models = stats.model_count, "🌍 Global-mean statistics written");
    Ok(Some(name))
}
