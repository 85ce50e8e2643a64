//! Model normalization: one catalog entry to one dataset on the reference grid
//!
//! Steps, in order: ensemble mean, calendar canonicalization, axis renaming,
//! nearest-neighbour regridding, unit conversion.

use crate::calendar;
use crate::catalog::{CompositeKey, DatasetDictionary};
use crate::data_source::LazyDataReader;
use crate::dataset::{EnsembleDataset, NormalizedModelDataset};
use crate::errors::{Result, WranglerError};
use crate::exceptions::ExceptionList;
use crate::grid::ReferenceGrid;
use crate::pipeline::BatchReport;
use crate::regrid::NearestNeighborRegridder;
use crate::statistics::mean_leading_axis;
use crate::store::DatasetStore;
use serde_json::json;
use tracing::{debug, error, info};

/// Variables reported in degrees Celsius
pub const TEMPERATURE_VARIABLES: [&str; 3] = ["tas", "tasmin", "tasmax"];

const KELVIN_OFFSET: f32 = 273.15;
const CELSIUS_UNITS: &str = "degC";

/// Result of one normalization attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeOutcome {
    /// Store written under the given name
    Written { key: CompositeKey, store: String },
    /// Listed in the exception table; nothing was read
    Skipped { key: CompositeKey },
}

/// Normalize the entry `key` of `datasets` onto `grid`
pub fn normalize(
    datasets: &DatasetDictionary,
    key: &CompositeKey,
    grid: &ReferenceGrid,
) -> Result<NormalizedModelDataset> {
    let lazy = datasets.get(key).ok_or_else(|| WranglerError::MissingKey {
        key: key.to_string(),
    })?;
    let ensemble = lazy.load()?;
    normalize_ensemble(ensemble, grid)
}

/// Normalize an already materialized ensemble
pub fn normalize_ensemble(ensemble: EnsembleDataset, grid: &ReferenceGrid) -> Result<NormalizedModelDataset> {
    let EnsembleDataset {
        key,
        variable,
        members,
        time_values,
        time_units,
        calendar: calendar_name,
        axis_names,
        lat,
        lon,
        data,
        mut attrs,
    } = ensemble;

    let mean = mean_leading_axis(data.view());
    debug!(key = %key, members = members.len(), "Ensemble mean computed");

    let time = calendar::canonicalize_times(&time_values, &time_units, &calendar_name)?;

    if !axis_names.is_canonical() {
        debug!(
            key = %key,
            lat = %axis_names.lat,
            lon = %axis_names.lon,
            "Renaming horizontal axes to lat/lon"
        );
    }

    let regridder = NearestNeighborRegridder::new(&lat, &lon, grid)?;
    let mut regridded = regridder.apply(mean.view())?;

    if TEMPERATURE_VARIABLES.contains(&variable.as_str()) {
        let already_celsius = attrs
            .get("units")
            .and_then(|u| u.as_str())
            .is_some_and(|u| u == CELSIUS_UNITS);
        if !already_celsius {
            regridded.mapv_inplace(|k| k - KELVIN_OFFSET);
            attrs.insert("units".to_string(), json!(CELSIUS_UNITS));
        }
    }
    attrs.insert("ensemble_members".to_string(), json!(members));
    attrs.insert("source_key".to_string(), json!(key.to_string()));

    NormalizedModelDataset::new(&variable, time, grid.clone(), regridded, attrs)
}

/// Normalize and persist every entry of `datasets`
///
/// Entries listed in `exceptions` are skipped without any I/O. A failing
/// entry is logged and counted; the batch continues with the next one.
pub fn normalize_all(
    datasets: &DatasetDictionary,
    grid: &ReferenceGrid,
    exceptions: &ExceptionList,
    store: &DatasetStore,
) -> BatchReport {
    let mut report = BatchReport::new("normalize");
    for (key, lazy) in datasets.iter() {
        let outcome = if exceptions.contains(&lazy.variable, key.scenario(), key.model()) {
            info!(key = %key, "⏭ Skipping listed exception");
            Ok(NormalizeOutcome::Skipped { key: key.clone() })
        } else {
            normalize(datasets, key, grid)
                .and_then(|dataset| store.save_model(&dataset, key.scenario(), key.model()))
                .map(|store| NormalizeOutcome::Written {
                    key: key.clone(),
                    store,
                })
        };

        match outcome {
            Ok(NormalizeOutcome::Written { store, .. }) => {
                info!(key = %key, store = %store, "✅ Normalized");
                report.record_success();
            }
            Ok(NormalizeOutcome::Skipped { .. }) => report.record_skip(),
            Err(e) => {
                error!(key = %key, error = %e, "❌ Normalization failed");
                report.record_failure(key.to_string(), &e);
            }
        }
    }
    report
}
