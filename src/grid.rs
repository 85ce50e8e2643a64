//! Reference grid shared by every regridding call in a run

use crate::catalog::{CompositeKey, DatasetDictionary};
use crate::errors::{Result, WranglerError};
use std::sync::Arc;
use tracing::info;

/// Target latitude/longitude axes
///
/// Cloning is cheap: the coordinate arrays are reference counted, so every
/// normalized dataset of a run points at the same allocation.
#[derive(Debug, Clone)]
pub struct ReferenceGrid {
    lat: Arc<[f64]>,
    lon: Arc<[f64]>,
}

impl ReferenceGrid {
    /// Create a grid, rejecting empty axes and missing values
    pub fn new(lat: Vec<f64>, lon: Vec<f64>) -> Result<Self> {
        for (axis, values) in [("lat", &lat), ("lon", &lon)] {
            if values.is_empty() {
                return Err(WranglerError::EmptyInput(format!(
                    "reference grid axis '{axis}' has no values"
                )));
            }
            if values.iter().any(|v| v.is_nan()) {
                return Err(WranglerError::CoordinateMismatch {
                    name: "reference grid".to_string(),
                    axis: axis.to_string(),
                });
            }
        }
        Ok(Self {
            lat: lat.into(),
            lon: lon.into(),
        })
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }

    /// True when both grids point at the same coordinate allocations
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lat, &other.lat) && Arc::ptr_eq(&self.lon, &other.lon)
    }

    /// Value equality of both axes
    pub fn same_axes(&self, other: &Self) -> bool {
        self.lat == other.lat && self.lon == other.lon
    }
}

/// Extract the coordinates of the configured reference run
///
/// Only the coordinate variables are read; the data payload stays on disk.
pub fn build_reference_grid(datasets: &DatasetDictionary, key: &CompositeKey) -> Result<ReferenceGrid> {
    let dataset = datasets.get(key).ok_or_else(|| WranglerError::MissingKey {
        key: key.to_string(),
    })?;
    let (lat, lon) = dataset.load_coordinates()?;
    info!(
        key = %key,
        nlat = lat.len(),
        nlon = lon.len(),
        "🌐 Built reference grid"
    );
    ReferenceGrid::new(lat, lon)
}
