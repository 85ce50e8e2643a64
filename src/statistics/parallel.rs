//! Parallel reductions along the leading (model or member) axis
//!
//! Cells are independent, so each output cell is computed on its own rayon
//! task via `Zip::par_for_each`.

use super::operations::{nan_mean, CellStats};
use ndarray::{Array1, Array3, ArrayView2, ArrayView4, Axis, Zip};
use tracing::debug;

/// Four statistics over a `(time, lat, lon)` block
#[derive(Debug, Clone)]
pub struct GridStats {
    pub mean: Array3<f32>,
    pub min: Array3<f32>,
    pub max: Array3<f32>,
    pub std: Array3<f32>,
}

/// Four statistics over a time series
#[derive(Debug, Clone)]
pub struct SeriesStats {
    pub mean: Array1<f32>,
    pub min: Array1<f32>,
    pub max: Array1<f32>,
    pub std: Array1<f32>,
}

/// Reduce `(model, time, lat, lon)` along the model axis
pub fn reduce_models_grid(stack: ArrayView4<'_, f32>) -> GridStats {
    let (_, ntime, nlat, nlon) = stack.dim();
    let shape = (ntime, nlat, nlon);
    let mut mean = Array3::<f32>::from_elem(shape, f32::NAN);
    let mut min = mean.clone();
    let mut max = mean.clone();
    let mut std = mean.clone();

    debug!(
        cells = ntime * nlat * nlon,
        threads = rayon::current_num_threads(),
        "⚡ Reducing across models"
    );

    Zip::from(&mut mean)
        .and(&mut min)
        .and(&mut max)
        .and(&mut std)
        .and(stack.lanes(Axis(0)))
        .par_for_each(|mean, min, max, std, lane| {
            let stats = CellStats::from_values(lane.iter().copied());
            *mean = stats.mean;
            *min = stats.min;
            *max = stats.max;
            *std = stats.std;
        });

    GridStats { mean, min, max, std }
}

/// Reduce `(model, time)` along the model axis
pub fn reduce_models_series(stack: ArrayView2<'_, f32>) -> SeriesStats {
    let ntime = stack.len_of(Axis(1));
    let mut mean = Array1::<f32>::from_elem(ntime, f32::NAN);
    let mut min = mean.clone();
    let mut max = mean.clone();
    let mut std = mean.clone();

    Zip::from(&mut mean)
        .and(&mut min)
        .and(&mut max)
        .and(&mut std)
        .and(stack.lanes(Axis(0)))
        .for_each(|mean, min, max, std, lane| {
            let stats = CellStats::from_values(lane.iter().copied());
            *mean = stats.mean;
            *min = stats.min;
            *max = stats.max;
            *std = stats.std;
        });

    SeriesStats { mean, min, max, std }
}

/// NaN-aware mean along the leading axis of `(member, time, lat, lon)`
pub fn mean_leading_axis(stack: ArrayView4<'_, f32>) -> Array3<f32> {
    let (_, ntime, nlat, nlon) = stack.dim();
    let mut out = Array3::<f32>::from_elem((ntime, nlat, nlon), f32::NAN);
    Zip::from(&mut out)
        .and(stack.lanes(Axis(0)))
        .par_for_each(|out, lane| *out = nan_mean(lane.iter().copied()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4};

    #[test]
    fn test_single_member_mean_is_identity() {
        let data = Array4::from_shape_fn((1, 2, 3, 4), |(_, t, i, j)| (t * 100 + i * 10 + j) as f32);
        let mean = mean_leading_axis(data.view());
        assert_eq!(mean, data.index_axis(Axis(0), 0));
    }

    #[test]
    fn test_series_reduction() {
        let stack = Array2::from_shape_vec((2, 2), vec![1.0, f32::NAN, 3.0, f32::NAN]).unwrap();
        let stats = reduce_models_series(stack.view());
        assert_eq!(stats.mean[0], 2.0);
        assert_eq!(stats.std[0], 1.0);
        assert!(stats.mean[1].is_nan());
    }
}
