//! In-memory dataset types passed between pipeline stages

use crate::catalog::CompositeKey;
use crate::errors::{Result, WranglerError};
use crate::grid::ReferenceGrid;
use crate::statistics::StatOperation;
use chrono::NaiveDate;
use ndarray::{Array1, Array3, Array4};
use serde_json::Value as JsonValue;

/// Free-form attributes carried from source files to stores
pub type Attributes = serde_json::Map<String, JsonValue>;

/// Canonical axis names
pub const LAT: &str = "lat";
pub const LON: &str = "lon";
pub const TIME: &str = "time";

/// Names the source uses for its horizontal axes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisNames {
    pub lat: String,
    pub lon: String,
}

impl Default for AxisNames {
    fn default() -> Self {
        Self {
            lat: LAT.to_string(),
            lon: LON.to_string(),
        }
    }
}

impl AxisNames {
    pub fn is_canonical(&self) -> bool {
        self.lat == LAT && self.lon == LON
    }
}

/// All ensemble members of one catalog entry, materialized
#[derive(Debug, Clone)]
pub struct EnsembleDataset {
    pub key: CompositeKey,
    pub variable: String,
    pub members: Vec<String>,
    /// Raw CF time values, decoded later against `time_units`/`calendar`
    pub time_values: Vec<f64>,
    pub time_units: String,
    pub calendar: String,
    pub axis_names: AxisNames,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// (member, time, lat, lon)
    pub data: Array4<f32>,
    pub attrs: Attributes,
}

/// One model and scenario on the reference grid with a canonical time axis
#[derive(Debug, Clone)]
pub struct NormalizedModelDataset {
    pub variable: String,
    pub time: Vec<NaiveDate>,
    pub grid: ReferenceGrid,
    /// (time, lat, lon)
    pub data: Array3<f32>,
    pub attrs: Attributes,
}

impl NormalizedModelDataset {
    /// Build a dataset, checking that `data` matches the axes
    pub fn new(
        variable: &str,
        time: Vec<NaiveDate>,
        grid: ReferenceGrid,
        data: Array3<f32>,
        attrs: Attributes,
    ) -> Result<Self> {
        let expected = [time.len(), grid.nlat(), grid.nlon()];
        check_shape(variable, &expected, data.shape())?;
        Ok(Self {
            variable: variable.to_string(),
            time,
            grid,
            data,
            attrs,
        })
    }

    pub fn ntime(&self) -> usize {
        self.time.len()
    }
}

/// Cross-model statistics over (time, lat, lon) for one scenario
#[derive(Debug, Clone)]
pub struct StatisticsDataset {
    pub variable: String,
    pub scenario: String,
    pub time: Vec<NaiveDate>,
    pub grid: ReferenceGrid,
    pub model_count: usize,
    pub mean: Array3<f32>,
    pub min: Array3<f32>,
    pub max: Array3<f32>,
    pub std: Array3<f32>,
}

impl StatisticsDataset {
    /// Named fields in persisted order
    pub fn fields(&self) -> [(&'static str, &Array3<f32>); 4] {
        [
            (StatOperation::Mean.as_str(), &self.mean),
            (StatOperation::Min.as_str(), &self.min),
            (StatOperation::Max.as_str(), &self.max),
            (StatOperation::Std.as_str(), &self.std),
        ]
    }
}

/// Spatial mean of one model over time
#[derive(Debug, Clone)]
pub struct GlobalMeanSeries {
    pub variable: String,
    pub scenario: String,
    pub model: String,
    pub time: Vec<NaiveDate>,
    pub values: Array1<f32>,
}

/// Cross-model statistics of global-mean series
#[derive(Debug, Clone)]
pub struct SeriesStatistics {
    pub variable: String,
    pub scenario: String,
    pub time: Vec<NaiveDate>,
    pub model_count: usize,
    pub mean: Array1<f32>,
    pub min: Array1<f32>,
    pub max: Array1<f32>,
    pub std: Array1<f32>,
}

impl SeriesStatistics {
    pub fn fields(&self) -> [(&'static str, &Array1<f32>); 4] {
        [
            (StatOperation::Mean.as_str(), &self.mean),
            (StatOperation::Min.as_str(), &self.min),
            (StatOperation::Max.as_str(), &self.max),
            (StatOperation::Std.as_str(), &self.std),
        ]
    }
}

pub(crate) fn check_shape(name: &str, expected: &[usize], found: &[usize]) -> Result<()> {
    if expected != found {
        return Err(WranglerError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}
