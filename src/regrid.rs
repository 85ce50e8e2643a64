//! Nearest-neighbour regridding between rectilinear lat/lon grids
//!
//! For a target point the closest source longitude is the one with the
//! smallest periodic separation, independent of latitude. With that
//! longitude fixed, the great-circle distance to each source latitude is
//! monotone in `sin φ1 sin φ2 + cos φ1 cos φ2 cos Δλ`, so the best latitude
//! is the one maximising it. Together this gives the exact great-circle
//! nearest source cell.

use crate::errors::{Result, WranglerError};
use crate::grid::ReferenceGrid;
use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};

/// Precomputed source index for every target cell
#[derive(Debug, Clone)]
pub struct NearestNeighborRegridder {
    src_shape: (usize, usize),
    /// (target lat, target lon) -> (source lat, source lon)
    index: Array2<(usize, usize)>,
}

impl NearestNeighborRegridder {
    /// Build the index map from `src_lat`/`src_lon` (degrees) to `grid`
    pub fn new(src_lat: &[f64], src_lon: &[f64], grid: &ReferenceGrid) -> Result<Self> {
        if src_lat.is_empty() || src_lon.is_empty() {
            return Err(WranglerError::EmptyInput(
                "source grid has an empty axis".to_string(),
            ));
        }
        if src_lat.iter().chain(src_lon).any(|v| v.is_nan()) {
            return Err(WranglerError::CoordinateMismatch {
                name: "source grid".to_string(),
                axis: "lat/lon".to_string(),
            });
        }

        let src_lat_trig: Vec<(f64, f64)> = src_lat
            .iter()
            .map(|lat| lat.to_radians().sin_cos())
            .collect();

        let mut index = Array2::from_elem((grid.nlat(), grid.nlon()), (0, 0));
        Zip::indexed(&mut index).par_for_each(|(a, b), cell| {
            let (j, dlon) = nearest_longitude(src_lon, grid.lon()[b]);
            let (sin_t, cos_t) = grid.lat()[a].to_radians().sin_cos();
            let cos_dlon = dlon.to_radians().cos();
            let i = src_lat_trig
                .iter()
                .map(|(sin_s, cos_s)| sin_t * sin_s + cos_t * cos_s * cos_dlon)
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, c)| if c > best.1 { (i, c) } else { best })
                .0;
            *cell = (i, j);
        });

        Ok(Self {
            src_shape: (src_lat.len(), src_lon.len()),
            index,
        })
    }

    /// Target shape `(nlat, nlon)`
    pub fn target_shape(&self) -> (usize, usize) {
        self.index.dim()
    }

    /// Source cell chosen for target cell `(a, b)`
    pub fn source_of(&self, a: usize, b: usize) -> Option<(usize, usize)> {
        self.index.get((a, b)).copied()
    }

    /// Regrid a `(time, lat, lon)` field
    pub fn apply(&self, data: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let (ntime, nlat, nlon) = data.dim();
        if (nlat, nlon) != self.src_shape {
            return Err(WranglerError::ShapeMismatch {
                name: "regrid input".to_string(),
                expected: vec![ntime, self.src_shape.0, self.src_shape.1],
                found: vec![ntime, nlat, nlon],
            });
        }

        let (tlat, tlon) = self.target_shape();
        let mut out = Array3::<f32>::zeros((ntime, tlat, tlon));
        Zip::from(out.axis_iter_mut(Axis(0)))
            .and(data.axis_iter(Axis(0)))
            .par_for_each(|mut dst, src| {
                Zip::from(&mut dst)
                    .and(&self.index)
                    .for_each(|v, &(i, j)| *v = src[[i, j]]);
            });
        Ok(out)
    }
}

/// Index of the closest longitude and its absolute separation in degrees
fn nearest_longitude(src_lon: &[f64], target: f64) -> (usize, f64) {
    src_lon
        .iter()
        .map(|&lon| periodic_separation(lon, target))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (j, d)| if d < best.1 { (j, d) } else { best })
}

/// Absolute longitude difference folded into `[0, 180]`
fn periodic_separation(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}
