//! Multi-model statistics for one scenario
//!
//! Model stores are opened lazily and read one latitude band at a time, so
//! peak memory is bounded by `models × time × band × lon` rather than the
//! full stack.

use super::parallel::reduce_models_grid;
use crate::dataset::{check_shape, StatisticsDataset};
use crate::errors::{Result, WranglerError};
use crate::store::{names, DatasetStore, StoredDataset};
use ndarray::{s, stack, Array3, ArrayView3, Axis};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Split `0..nlat` into `num_chunks` bands of `nlat / num_chunks` rows; the
/// last band takes the remainder
pub fn lat_bands(nlat: usize, num_chunks: usize) -> Result<Vec<Range<usize>>> {
    if num_chunks == 0 {
        return Err(WranglerError::InvalidConfig(
            "num_chunks must be at least 1".to_string(),
        ));
    }
    let width = nlat / num_chunks;
    if width == 0 {
        return Ok(vec![0..nlat]);
    }
    let mut bands: Vec<Range<usize>> = (0..num_chunks - 1)
        .map(|i| i * width..(i + 1) * width)
        .collect();
    bands.push((num_chunks - 1) * width..nlat);
    Ok(bands)
}

/// Compute mean/min/max/std across the given model stores
pub fn reduce_scenario(
    store: &DatasetStore,
    store_names: &[String],
    variable: &str,
    scenario: &str,
    num_chunks: usize,
) -> Result<StatisticsDataset> {
    if store_names.is_empty() {
        return Err(WranglerError::EmptyInput(format!(
            "no model stores for {variable}/{scenario}"
        )));
    }

    let opened = store_names
        .iter()
        .map(|name| store.open(name))
        .collect::<Result<Vec<StoredDataset>>>()?;
    let first = &opened[0];
    let grid = first.grid()?.clone();
    for model in &opened[1..] {
        if model.time != first.time {
            return Err(WranglerError::CoordinateMismatch {
                name: model.name.clone(),
                axis: "time".to_string(),
            });
        }
        if !model.grid()?.same_axes(&grid) {
            return Err(WranglerError::CoordinateMismatch {
                name: model.name.clone(),
                axis: "lat/lon".to_string(),
            });
        }
    }

    let (ntime, nlat, nlon) = (first.ntime(), grid.nlat(), grid.nlon());
    for model in &opened {
        let field = model.reader().metadata(variable)?;
        check_shape(&model.name, &[ntime, nlat, nlon], &field.shape)?;
    }
    let bands = lat_bands(nlat, num_chunks)?;
    let mut mean = Array3::<f32>::from_elem((ntime, nlat, nlon), f32::NAN);
    let mut min = mean.clone();
    let mut max = mean.clone();
    let mut std = mean.clone();

    info!(
        variable,
        scenario,
        models = opened.len(),
        bands = bands.len(),
        "📊 Computing multi-model statistics"
    );

    for band in bands {
        let rows = band.len();
        let slices = opened
            .iter()
            .map(|model| model.read_lat_band(variable, band.start, rows))
            .collect::<Result<Vec<Array3<f32>>>>()?;
        let views: Vec<ArrayView3<'_, f32>> = slices.iter().map(Array3::view).collect();
        let stacked = stack(Axis(0), &views)?;
        let reduced = reduce_models_grid(stacked.view());

        mean.slice_mut(s![.., band.clone(), ..]).assign(&reduced.mean);
        min.slice_mut(s![.., band.clone(), ..]).assign(&reduced.min);
        max.slice_mut(s![.., band.clone(), ..]).assign(&reduced.max);
        std.slice_mut(s![.., band.clone(), ..]).assign(&reduced.std);
        debug!(scenario, start = band.start, rows, "Band done");
    }

    Ok(StatisticsDataset {
        variable: variable.to_string(),
        scenario: scenario.to_string(),
        time: first.time.clone(),
        grid,
        model_count: opened.len(),
        mean,
        min,
        max,
        std,
    })
}

/// Reduce every available model of `scenario` and persist the result
///
/// Models without a store (skipped or failed during normalization) are left
/// out. Returns the written store name, or `None` when no model was found.
pub fn process_scenario(
    store: &DatasetStore,
    model_names: &[String],
    variable: &str,
    scenario: &str,
    num_chunks: usize,
    normalized: bool,
) -> Result<Option<String>> {
    let store_names: Vec<String> = model_names
        .iter()
        .map(|model| {
            if normalized {
                names::normalized_model(variable, scenario, model)
            } else {
                names::model(variable, scenario, model)
            }
        })
        .filter(|name| store.exists(name))
        .collect();

    if store_names.is_empty() {
        warn!(variable, scenario, "⚠ No model stores found, skipping scenario");
        return Ok(None);
    }

    let stats = reduce_scenario(store, &store_names, variable, scenario, num_chunks)?;
    let name = names::statistics(variable, scenario, normalized);
    store.save_statistics(&stats, &name)?;
    info!(store = %name, models = stats.model_count, "✅ Scenario statistics written");
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_bands_cover_every_row_once() {
        for nlat in [1, 7, 20, 64, 181] {
            for chunks in 1..=25 {
                let bands = lat_bands(nlat, chunks).unwrap();
                let covered: Vec<usize> = bands.iter().flat_map(|b| b.clone()).collect();
                assert_eq!(covered, (0..nlat).collect::<Vec<_>>(), "nlat={nlat} chunks={chunks}");
            }
        }
    }

    #[test]
    fn test_last_band_takes_remainder() {
        let bands = lat_bands(10, 3).unwrap();
        assert_eq!(bands, vec![0..3, 3..6, 6..10]);
        assert!(lat_bands(10, 0).is_err());
    }
}
