//! Gridded historical observations (anomaly + monthly climatology files)

use crate::calendar::decimal_year_anchor;
use crate::dataset::Attributes;
use crate::errors::Result;
use crate::grid::ReferenceGrid;
use crate::netcdf_io::read_observation_file;
use crate::store::{names, DatasetStore};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array3, Axis, Zip};
use serde_json::json;
use std::path::Path;
use tracing::info;

/// Months before 1850 in a record starting in 1750
pub const DEFAULT_SKIP_MONTHS: usize = 1200;

/// Observed absolute temperature on the observation grid
#[derive(Debug, Clone)]
pub struct ObservationDataset {
    pub time: Vec<NaiveDate>,
    pub grid: ReferenceGrid,
    /// (time, lat, lon), longitudes ascending in `[0, 360)`
    pub mean: Array3<f32>,
    pub attrs: Attributes,
}

/// Read an observation file and rebuild absolute temperatures
pub fn process_observations(path: &Path, skip_months: usize) -> Result<ObservationDataset> {
    let raw = read_observation_file(path, skip_months)?;
    let time = raw
        .time
        .iter()
        .map(|&t| decimal_year_anchor(t))
        .collect::<Result<Vec<_>>>()?;

    let mut absolute = raw.anomaly;
    for (mut field, date) in absolute.axis_iter_mut(Axis(0)).zip(&time) {
        let month = date.month0() as usize;
        Zip::from(&mut field)
            .and(&raw.climatology.index_axis(Axis(0), month))
            .for_each(|v, &clim| *v += clim);
    }

    let (lon, order) = wrap_longitudes(&raw.lon);
    let absolute = absolute.select(Axis(2), &order);

    let mut attrs = raw.attrs;
    attrs.insert("units".to_string(), json!("degC"));
    attrs.insert("source_file".to_string(), json!(path.display().to_string()));

    info!(
        file = %path.display(),
        ntime = time.len(),
        skipped = skip_months,
        "🌡 Processed observations"
    );

    Ok(ObservationDataset {
        time,
        grid: ReferenceGrid::new(raw.lat, lon)?,
        mean: absolute,
        attrs,
    })
}

/// Persist observations as `historical_obs` with one `mean` field
pub fn save_observations(store: &DatasetStore, obs: &ObservationDataset) -> Result<String> {
    store.save_gridded(
        names::OBSERVATIONS,
        &obs.time,
        &obs.grid,
        &[("mean", &obs.mean)],
        obs.attrs.clone(),
    )?;
    Ok(names::OBSERVATIONS.to_string())
}

/// Map longitudes into `[0, 360)` and return them sorted with the
/// permutation that sorts the data
fn wrap_longitudes(lon: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let wrapped: Vec<f64> = lon.iter().map(|l| l.rem_euclid(360.0)).collect();
    let mut order: Vec<usize> = (0..wrapped.len()).collect();
    order.sort_by(|&a, &b| wrapped[a].total_cmp(&wrapped[b]));
    let sorted = order.iter().map(|&i| wrapped[i]).collect();
    (sorted, order)
}
