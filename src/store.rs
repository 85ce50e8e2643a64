//! Per-dataset file store
//!
//! Every dataset is one Zarr directory `<name>.zarr` under the store root.
//! Names are deterministic (see [`names`]) so stages can find each other's
//! outputs without any index. A store is never overwritten: clearing is an
//! explicit, pattern-based step.

use crate::calendar::{self, CANONICAL_CALENDAR, CANONICAL_TIME_UNITS};
use crate::data_source::LazyDataReader;
use crate::dataset::{
    check_shape, Attributes, GlobalMeanSeries, NormalizedModelDataset, SeriesStatistics,
    StatisticsDataset, LAT, LON, TIME,
};
use crate::errors::{Result, WranglerError};
use crate::grid::ReferenceGrid;
use crate::statistics::StatOperation;
use crate::zarr_io::{ZarrReader, ZarrSource, ZarrWriter};
use chrono::NaiveDate;
use ndarray::{Array1, Array3};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory suffix of every store
pub const STORE_SUFFIX: &str = ".zarr";

/// Storage chunk edge along lat and lon
pub const SPATIAL_CHUNK: usize = 10;

/// Store naming conventions
pub mod names {
    /// Observation store
    pub const OBSERVATIONS: &str = "historical_obs";

    /// Prefix of baseline-normalized stores
    pub const NORMALIZED_PREFIX: &str = "Normalized_";

    pub fn model(variable: &str, scenario: &str, model: &str) -> String {
        format!("{variable}_{scenario}_{model}")
    }

    pub fn normalized_model(variable: &str, scenario: &str, model: &str) -> String {
        format!("{NORMALIZED_PREFIX}{}", self::model(variable, scenario, model))
    }

    /// Multi-model statistics, optionally over baseline-normalized inputs
    pub fn statistics(variable: &str, scenario: &str, normalized: bool) -> String {
        if normalized {
            format!("modelData_normalized_{variable}_{scenario}")
        } else {
            format!("modelData_{variable}_{scenario}")
        }
    }

    pub fn global_mean(variable: &str, scenario: &str, model: &str) -> String {
        format!("{variable}_{scenario}_{model}_GLOBALMEAN")
    }

    pub fn global_mean_statistics(variable: &str, scenario: &str) -> String {
        format!("{variable}_{scenario}_GLOBALMEAN_STATS")
    }
}

/// Root directory holding named stores
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{STORE_SUFFIX}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Persist one normalized model under `{variable}_{scenario}_{model}`
    pub fn save_model(&self, dataset: &NormalizedModelDataset, scenario: &str, model: &str) -> Result<String> {
        let name = names::model(&dataset.variable, scenario, model);
        let mut attrs = dataset.attrs.clone();
        attrs.insert("variable".to_string(), json!(dataset.variable));
        attrs.insert("scenario".to_string(), json!(scenario));
        attrs.insert("model".to_string(), json!(model));
        self.save_gridded(
            &name,
            &dataset.time,
            &dataset.grid,
            &[(dataset.variable.as_str(), &dataset.data)],
            attrs,
        )?;
        Ok(name)
    }

    /// Persist a normalized model under an explicit name
    pub fn save_model_as(&self, name: &str, dataset: &NormalizedModelDataset) -> Result<()> {
        self.save_gridded(
            name,
            &dataset.time,
            &dataset.grid,
            &[(dataset.variable.as_str(), &dataset.data)],
            dataset.attrs.clone(),
        )
    }

    /// Read back a model store written by [`DatasetStore::save_model`]
    pub fn load_model(&self, name: &str, variable: &str) -> Result<NormalizedModelDataset> {
        let stored = self.open(name)?;
        let data = stored.read_field(variable)?;
        let mut attrs = stored.attrs.clone();
        for key in ["variable", "scenario", "model"] {
            attrs.remove(key);
        }
        let grid = stored.grid()?.clone();
        NormalizedModelDataset::new(variable, stored.time, grid, data, attrs)
    }

    /// Persist cross-model statistics under `name`
    pub fn save_statistics(&self, stats: &StatisticsDataset, name: &str) -> Result<()> {
        let mut attrs = Attributes::new();
        attrs.insert("variable".to_string(), json!(stats.variable));
        attrs.insert("scenario".to_string(), json!(stats.scenario));
        attrs.insert("model_count".to_string(), json!(stats.model_count));
        self.save_gridded(name, &stats.time, &stats.grid, &stats.fields(), attrs)
    }

    /// Read back statistics written by [`DatasetStore::save_statistics`]
    pub fn load_statistics(&self, name: &str) -> Result<StatisticsDataset> {
        let stored = self.open(name)?;
        let attr_str = |key: &str| {
            stored
                .attrs
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let grid = stored.grid()?.clone();
        Ok(StatisticsDataset {
            variable: attr_str("variable"),
            scenario: attr_str("scenario"),
            model_count: stored
                .attrs
                .get("model_count")
                .and_then(|v| v.as_u64())
                .unwrap_or_default() as usize,
            mean: stored.read_field(StatOperation::Mean.as_str())?,
            min: stored.read_field(StatOperation::Min.as_str())?,
            max: stored.read_field(StatOperation::Max.as_str())?,
            std: stored.read_field(StatOperation::Std.as_str())?,
            time: stored.time,
            grid,
        })
    }

    /// Persist one model's global-mean series
    pub fn save_series(&self, series: &GlobalMeanSeries) -> Result<String> {
        let name = names::global_mean(&series.variable, &series.scenario, &series.model);
        let mut attrs = Attributes::new();
        attrs.insert("variable".to_string(), json!(series.variable));
        attrs.insert("scenario".to_string(), json!(series.scenario));
        attrs.insert("model".to_string(), json!(series.model));
        self.save_series_fields(&name, &series.time, &[(series.variable.as_str(), &series.values)], attrs)?;
        Ok(name)
    }

    /// Persist the cross-model statistics of global-mean series
    pub fn save_series_statistics(&self, stats: &SeriesStatistics) -> Result<String> {
        let name = names::global_mean_statistics(&stats.variable, &stats.scenario);
        let mut attrs = Attributes::new();
        attrs.insert("variable".to_string(), json!(stats.variable));
        attrs.insert("scenario".to_string(), json!(stats.scenario));
        attrs.insert("model_count".to_string(), json!(stats.model_count));
        self.save_series_fields(&name, &stats.time, &stats.fields(), attrs)?;
        Ok(name)
    }

    /// Write `(time, lat, lon)` fields with shared coordinates
    pub fn save_gridded(
        &self,
        name: &str,
        time: &[NaiveDate],
        grid: &ReferenceGrid,
        fields: &[(&str, &Array3<f32>)],
        attrs: Attributes,
    ) -> Result<()> {
        let shape = [time.len(), grid.nlat(), grid.nlon()];
        for (field, data) in fields {
            check_shape(field, &shape, data.shape())?;
        }
        let writer = self.create(name, attrs)?;
        write_time_axis(&writer, time)?;
        writer.write_coordinate(LAT, grid.lat(), axis_attributes("latitude", "degrees_north"))?;
        writer.write_coordinate(LON, grid.lon(), axis_attributes("longitude", "degrees_east"))?;

        let chunks = [time.len(), SPATIAL_CHUNK, SPATIAL_CHUNK];
        for (field, data) in fields {
            let standard = data.as_standard_layout();
            let values = standard.as_slice().ok_or_else(|| {
                WranglerError::Zarr(format!("field '{field}' is not contiguous"))
            })?;
            writer.write_field(field, &shape, &chunks, &[TIME, LAT, LON], values, Attributes::new())?;
        }
        info!(store = name, fields = fields.len(), shape = ?shape, "💾 Saved store");
        Ok(())
    }

    fn save_series_fields(
        &self,
        name: &str,
        time: &[NaiveDate],
        fields: &[(&str, &Array1<f32>)],
        attrs: Attributes,
    ) -> Result<()> {
        for (field, data) in fields {
            check_shape(field, &[time.len()], data.shape())?;
        }
        let writer = self.create(name, attrs)?;
        write_time_axis(&writer, time)?;
        for (field, data) in fields {
            let values = data.to_vec();
            writer.write_field(field, &[time.len()], &[time.len()], &[TIME], &values, Attributes::new())?;
        }
        info!(store = name, fields = fields.len(), ntime = time.len(), "💾 Saved series store");
        Ok(())
    }

    fn create(&self, name: &str, attrs: Attributes) -> Result<ZarrWriter> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(WranglerError::DestinationExists { path });
        }
        std::fs::create_dir_all(&self.root)?;
        ZarrWriter::create(&ZarrSource::new(path), attrs)
    }

    /// Open a store: coordinates and attributes only
    pub fn open(&self, name: &str) -> Result<StoredDataset> {
        let path = self.path_for(name);
        let reader = ZarrReader::open(ZarrSource::new(&path))?;
        let time = calendar::decode_days(&reader.read_f64(TIME)?)?;
        let grid = if reader.contains(LAT) && reader.contains(LON) {
            Some(ReferenceGrid::new(reader.read_f64(LAT)?, reader.read_f64(LON)?)?)
        } else {
            None
        };
        let attrs = reader.group_attributes()?;
        let fields = reader
            .list_arrays()?
            .into_iter()
            .filter(|a| a != TIME && a != LAT && a != LON)
            .collect();
        debug!(store = name, ntime = time.len(), "📂 Opened store");
        Ok(StoredDataset {
            name: name.to_string(),
            reader,
            time,
            grid,
            attrs,
            fields,
        })
    }

    /// Names of every store under the root starting with `prefix`, sorted
    pub fn list_names(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = file_name.strip_suffix(STORE_SUFFIX) {
                if name.starts_with(prefix) && entry.path().is_dir() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove every store whose name matches the glob `pattern`
    pub fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let full = self.root.join(format!("{pattern}{STORE_SUFFIX}"));
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| WranglerError::InvalidConfig(format!("bad pattern '{pattern}': {e}")))?;
        let mut removed = 0;
        for entry in paths {
            let path = entry.map_err(|e| WranglerError::Io(e.into_error()))?;
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
                removed += 1;
            }
        }
        info!(pattern, removed, "🧹 Cleared stores");
        Ok(removed)
    }
}

fn write_time_axis(writer: &ZarrWriter, time: &[NaiveDate]) -> Result<()> {
    let mut attrs = axis_attributes("time", "");
    attrs.insert("units".to_string(), json!(CANONICAL_TIME_UNITS));
    attrs.insert("calendar".to_string(), json!(CANONICAL_CALENDAR));
    writer.write_coordinate(TIME, &calendar::encode_days(time), attrs)
}

fn axis_attributes(standard_name: &str, units: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("standard_name".to_string(), json!(standard_name));
    if !units.is_empty() {
        attrs.insert("units".to_string(), json!(units));
    }
    attrs
}

/// An opened store whose data arrays have not been read yet
pub struct StoredDataset {
    pub name: String,
    reader: ZarrReader,
    pub time: Vec<NaiveDate>,
    /// `None` for series stores, which have no spatial axes
    pub grid: Option<ReferenceGrid>,
    pub attrs: Attributes,
    /// Data arrays, coordinates excluded
    pub fields: Vec<String>,
}

impl StoredDataset {
    pub fn ntime(&self) -> usize {
        self.time.len()
    }

    /// Spatial grid, failing for series stores
    pub fn grid(&self) -> Result<&ReferenceGrid> {
        self.grid.as_ref().ok_or_else(|| {
            WranglerError::VariableNotFound {
                var: format!("{LAT}/{LON}"),
                source_name: self.name.clone(),
            }
        })
    }

    /// Materialize a whole `(time, lat, lon)` field
    pub fn read_field(&self, field: &str) -> Result<Array3<f32>> {
        self.read_lat_band(field, 0, self.grid()?.nlat())
    }

    /// Materialize rows `start..start + len` of a `(time, lat, lon)` field
    pub fn read_lat_band(&self, field: &str, start: usize, len: usize) -> Result<Array3<f32>> {
        let shape = [self.ntime(), len, self.grid()?.nlon()];
        let values = self
            .reader
            .read_f32_subset(field, &[0, start, 0], &shape)?;
        Ok(Array3::from_shape_vec(shape, values)?)
    }

    /// Materialize a 1-D series field
    pub fn read_series(&self, field: &str) -> Result<Array1<f32>> {
        let values = self.reader.read_f32_subset(field, &[0], &[self.ntime()])?;
        Ok(Array1::from(values))
    }

    pub fn reader(&self) -> &ZarrReader {
        &self.reader
    }
}

/// A store location together with the variable to materialize from it
#[derive(Debug, Clone)]
pub struct ModelStoreHandle {
    pub store: DatasetStore,
    pub name: String,
    pub variable: String,
}

impl LazyDataReader for ModelStoreHandle {
    type Output = NormalizedModelDataset;

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<NormalizedModelDataset> {
        self.store.load_model(&self.name, &self.variable)
    }
}
