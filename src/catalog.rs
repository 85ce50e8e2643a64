//! ESM collection catalog resolution
//!
//! A catalog is a JSON description plus a table of rows, either in a CSV
//! file next to it (`catalog_file`) or inline (`catalog_dict`). Resolving a
//! query selects the rows for the requested scenarios and groups them into
//! one [`LazyDataset`] per [`CompositeKey`]. No array data is read until a
//! dataset is loaded.

use crate::data_source::LazyDataReader;
use crate::dataset::EnsembleDataset;
use crate::errors::{Result, WranglerError};
use crate::netcdf_io::{self, MemberField};
use ndarray::{stack, ArrayView3, Axis};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const REMOTE_PREFIXES: [&str; 4] = ["http://", "https://", "s3://", "gs://"];
const NETCDF_FORMAT: &str = "netcdf";

/// Identity of one model run: `activity.institution.source.experiment.table.grid`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey {
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub table_id: String,
    pub grid_label: String,
}

impl CompositeKey {
    pub fn new(
        activity_id: &str,
        institution_id: &str,
        source_id: &str,
        experiment_id: &str,
        table_id: &str,
        grid_label: &str,
    ) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            institution_id: institution_id.to_string(),
            source_id: source_id.to_string(),
            experiment_id: experiment_id.to_string(),
            table_id: table_id.to_string(),
            grid_label: grid_label.to_string(),
        }
    }

    /// Model name (`source_id`)
    pub fn model(&self) -> &str {
        &self.source_id
    }

    /// Scenario name (`experiment_id`)
    pub fn scenario(&self) -> &str {
        &self.experiment_id
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}",
            self.activity_id,
            self.institution_id,
            self.source_id,
            self.experiment_id,
            self.table_id,
            self.grid_label
        )
    }
}

impl FromStr for CompositeKey {
    type Err = WranglerError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [a, i, src, e, t, g] if parts.iter().all(|p| !p.is_empty()) => {
                Ok(Self::new(a, i, src, e, t, g))
            }
            _ => Err(WranglerError::InvalidConfig(format!(
                "'{s}' is not a dotted key of six non-empty fields"
            ))),
        }
    }
}

impl Serialize for CompositeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompositeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One row of the catalog metadata table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub member_id: String,
    pub table_id: String,
    pub variable_id: String,
    pub grid_label: String,
    pub path: PathBuf,
    pub version: Option<String>,
}

impl CatalogRow {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(
            &self.activity_id,
            &self.institution_id,
            &self.source_id,
            &self.experiment_id,
            &self.table_id,
            &self.grid_label,
        )
    }

    fn from_fields(fields: &HashMap<String, String>, path_column: &str, base_dir: &Path) -> Result<Self> {
        let get = |column: &str| -> Result<String> {
            fields.get(column).cloned().ok_or_else(|| {
                WranglerError::CatalogUnavailable(format!("catalog row has no '{column}' column"))
            })
        };
        let raw_path = get(path_column)?;
        if is_remote(&raw_path) {
            return Err(WranglerError::CatalogUnavailable(format!(
                "remote asset '{raw_path}' cannot be read locally"
            )));
        }
        let path = PathBuf::from(&raw_path);
        let path = if path.is_relative() {
            base_dir.join(path)
        } else {
            path
        };
        Ok(Self {
            activity_id: get("activity_id")?,
            institution_id: get("institution_id")?,
            source_id: get("source_id")?,
            experiment_id: get("experiment_id")?,
            member_id: get("member_id")?,
            table_id: get("table_id")?,
            variable_id: get("variable_id")?,
            grid_label: get("grid_label")?,
            path,
            version: fields.get("version").filter(|v| !v.is_empty()).cloned(),
        })
    }
}

/// Search parameters, matched exactly against the catalog columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub scenarios: Vec<String>,
    pub variable: String,
    pub table: String,
    pub grid_label: String,
}

impl CatalogQuery {
    fn matches(&self, row: &CatalogRow) -> bool {
        self.scenarios.iter().any(|s| *s == row.experiment_id)
            && row.variable_id == self.variable
            && row.table_id == self.table
            && row.grid_label == self.grid_label
    }
}

#[derive(Debug, Deserialize)]
struct AssetSpec {
    column_name: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    format_column_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionSpec {
    #[serde(default)]
    id: Option<String>,
    assets: AssetSpec,
    #[serde(default)]
    catalog_file: Option<String>,
    #[serde(default)]
    catalog_dict: Option<Vec<serde_json::Map<String, JsonValue>>>,
}

/// A parsed local catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    pub id: Option<String>,
    pub rows: Vec<CatalogRow>,
}

impl Catalog {
    /// Read an ESM collection JSON and its rows
    pub fn open(location: &str) -> Result<Self> {
        if is_remote(location) {
            return Err(WranglerError::CatalogUnavailable(format!(
                "'{location}' is a remote catalog; only local files are supported"
            )));
        }
        let json_path = Path::new(location);
        let content = std::fs::read_to_string(json_path).map_err(|e| {
            WranglerError::CatalogUnavailable(format!("cannot read {location}: {e}"))
        })?;
        let spec: CollectionSpec = serde_json::from_str(&content).map_err(|e| {
            WranglerError::CatalogUnavailable(format!("cannot parse {location}: {e}"))
        })?;

        if let Some(format) = &spec.assets.format {
            if !format.eq_ignore_ascii_case(NETCDF_FORMAT) {
                return Err(WranglerError::CatalogUnavailable(format!(
                    "asset format '{format}' is not supported, expected '{NETCDF_FORMAT}'"
                )));
            }
        }

        let base_dir = json_path.parent().unwrap_or_else(|| Path::new("."));
        let raw_rows = match (&spec.catalog_file, &spec.catalog_dict) {
            (Some(file), _) => read_csv_rows(&base_dir.join(file))?,
            (None, Some(dict)) => dict.iter().map(stringify_row).collect(),
            (None, None) => {
                return Err(WranglerError::CatalogUnavailable(format!(
                    "{location} has neither 'catalog_file' nor 'catalog_dict'"
                )))
            }
        };

        let mut rows = Vec::with_capacity(raw_rows.len());
        for fields in &raw_rows {
            if let Some(column) = &spec.assets.format_column_name {
                let is_netcdf = fields
                    .get(column)
                    .is_some_and(|f| f.eq_ignore_ascii_case(NETCDF_FORMAT));
                if !is_netcdf {
                    continue;
                }
            }
            rows.push(CatalogRow::from_fields(fields, &spec.assets.column_name, base_dir)?);
        }

        debug!(catalog = location, rows = rows.len(), "📖 Opened catalog");
        Ok(Self { id: spec.id, rows })
    }

    /// Rows matching `query`, in catalog order
    pub fn search(&self, query: &CatalogQuery) -> Vec<CatalogRow> {
        self.rows.iter().filter(|r| query.matches(r)).cloned().collect()
    }
}

fn is_remote(location: &str) -> bool {
    REMOTE_PREFIXES.iter().any(|p| location.starts_with(p))
}

fn read_csv_rows(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        WranglerError::CatalogUnavailable(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<HashMap<String, String>>() {
        rows.push(record?);
    }
    Ok(rows)
}

fn stringify_row(map: &serde_json::Map<String, JsonValue>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| {
            let value = match v {
                JsonValue::String(s) => s.clone(),
                JsonValue::Null => return None,
                other => other.to_string(),
            };
            Some((k.clone(), value))
        })
        .collect()
}

/// Files of one ensemble member, concatenated along time in path order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAsset {
    pub member_id: String,
    pub paths: Vec<PathBuf>,
}

/// Handle to every member of one catalog entry
#[derive(Debug, Clone)]
pub struct LazyDataset {
    pub key: CompositeKey,
    pub variable: String,
    pub members: Vec<MemberAsset>,
}

impl LazyDataset {
    /// Read lat/lon of the first member file only
    pub fn load_coordinates(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let path = self
            .members
            .first()
            .and_then(|m| m.paths.first())
            .ok_or_else(|| WranglerError::EmptyInput(format!("{} has no asset files", self.key)))?;
        netcdf_io::read_grid_coordinates(path)
    }

    fn load_member(&self, member: &MemberAsset) -> Result<MemberField> {
        let mut paths = member.paths.iter();
        let first = paths.next().ok_or_else(|| {
            WranglerError::EmptyInput(format!("member {} of {} has no files", member.member_id, self.key))
        })?;
        let mut field = netcdf_io::read_member_file(first, &self.variable)?;
        for path in paths {
            let next = netcdf_io::read_member_file(path, &self.variable)?;
            field.append_time(next, &path.display().to_string())?;
        }
        Ok(field)
    }
}

impl LazyDataReader for LazyDataset {
    type Output = EnsembleDataset;

    fn describe(&self) -> String {
        self.key.to_string()
    }

    fn load(&self) -> Result<EnsembleDataset> {
        let fields = self
            .members
            .iter()
            .map(|m| self.load_member(m))
            .collect::<Result<Vec<_>>>()?;
        let first = fields
            .first()
            .ok_or_else(|| WranglerError::EmptyInput(format!("{} has no members", self.key)))?;

        let views: Vec<(String, ArrayView3<'_, f32>)> = self
            .members
            .iter()
            .zip(&fields)
            .map(|(m, f)| (m.member_id.clone(), f.data.view()))
            .collect();
        netcdf_io::check_member_shapes(&views)?;
        for (member, field) in self.members.iter().zip(&fields) {
            if field.lat != first.lat || field.lon != first.lon {
                return Err(WranglerError::CoordinateMismatch {
                    name: format!("{}/{}", self.key, member.member_id),
                    axis: "lat/lon".to_string(),
                });
            }
            if field.time_values != first.time_values
                || field.time_units != first.time_units
                || field.calendar != first.calendar
            {
                return Err(WranglerError::CoordinateMismatch {
                    name: format!("{}/{}", self.key, member.member_id),
                    axis: "time".to_string(),
                });
            }
        }

        let stacked: Vec<ArrayView3<'_, f32>> = views.iter().map(|(_, v)| v.view()).collect();
        let data = stack(Axis(0), &stacked)?;

        info!(
            key = %self.key,
            members = fields.len(),
            shape = ?data.shape(),
            "🚀 Loaded ensemble"
        );

        Ok(EnsembleDataset {
            key: self.key.clone(),
            variable: self.variable.clone(),
            members: self.members.iter().map(|m| m.member_id.clone()).collect(),
            time_values: first.time_values.clone(),
            time_units: first.time_units.clone(),
            calendar: first.calendar.clone(),
            axis_names: first.axis_names.clone(),
            lat: first.lat.clone(),
            lon: first.lon.clone(),
            data,
            attrs: first.attrs.clone(),
        })
    }
}

/// Typed map from composite key to lazy dataset, iterated in key order
#[derive(Debug, Clone, Default)]
pub struct DatasetDictionary {
    entries: BTreeMap<CompositeKey, LazyDataset>,
}

impl DatasetDictionary {
    pub fn get(&self, key: &CompositeKey) -> Option<&LazyDataset> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, dataset: LazyDataset) {
        self.entries.insert(dataset.key.clone(), dataset);
    }

    pub fn keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompositeKey, &LazyDataset)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of resolving a query against a catalog
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Matching rows, one per member asset
    pub metadata: Vec<CatalogRow>,
    pub datasets: DatasetDictionary,
    /// Sorted, de-duplicated `source_id`s
    pub model_names: Vec<String>,
}

impl Resolution {
    /// Institution that published `model`, from the metadata table
    pub fn institution_for(&self, model: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|r| r.source_id == model)
            .map(|r| r.institution_id.as_str())
    }

    /// Rebuild the key of `model` under `scenario` from the metadata table
    pub fn key_for(&self, activity: &str, model: &str, scenario: &str) -> Result<CompositeKey> {
        self.metadata
            .iter()
            .find(|r| r.activity_id == activity && r.source_id == model && r.experiment_id == scenario)
            .map(CatalogRow::key)
            .ok_or_else(|| WranglerError::MissingKey {
                key: format!("{activity}.*.{model}.{scenario}"),
            })
    }
}

/// Select and group the rows matching `query`
pub fn resolve(catalog: &Catalog, query: &CatalogQuery) -> Result<Resolution> {
    if query.scenarios.is_empty() {
        return Err(WranglerError::EmptyInput("no scenarios requested".to_string()));
    }

    let metadata = catalog.search(query);

    let mut grouped: BTreeMap<CompositeKey, BTreeMap<String, BTreeSet<PathBuf>>> = BTreeMap::new();
    for row in &metadata {
        grouped
            .entry(row.key())
            .or_default()
            .entry(row.member_id.clone())
            .or_default()
            .insert(row.path.clone());
    }

    let mut datasets = DatasetDictionary::default();
    for (key, members) in grouped {
        let members = members
            .into_iter()
            .map(|(member_id, paths)| MemberAsset {
                member_id,
                paths: paths.into_iter().collect(),
            })
            .collect();
        datasets.insert(LazyDataset {
            key,
            variable: query.variable.clone(),
            members,
        });
    }

    let model_names: Vec<String> = metadata
        .iter()
        .map(|r| r.source_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    info!(
        rows = metadata.len(),
        datasets = datasets.len(),
        models = model_names.len(),
        "🔍 Resolved catalog query"
    );

    Ok(Resolution {
        metadata,
        datasets,
        model_names,
    })
}

/// Open the catalog at `location` and resolve `query` against it
pub fn resolve_path(location: &str, query: &CatalogQuery) -> Result<Resolution> {
    let catalog = Catalog::open(location)?;
    resolve(&catalog, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_round_trip() {
        let key: CompositeKey = "CMIP.BCC.BCC-CSM2-MR.historical.Amon.gn".parse().unwrap();
        assert_eq!(key.source_id, "BCC-CSM2-MR");
        assert_eq!(key.scenario(), "historical");
        assert_eq!(key.to_string(), "CMIP.BCC.BCC-CSM2-MR.historical.Amon.gn");
    }

    #[test]
    fn test_composite_key_rejects_short_form() {
        assert!("CMIP.BCC.historical".parse::<CompositeKey>().is_err());
        assert!("CMIP..BCC-CSM2-MR.historical.Amon.gn".parse::<CompositeKey>().is_err());
    }

    #[test]
    fn test_remote_catalog_is_unavailable() {
        let err = Catalog::open("https://example.org/pangeo-cmip6.json").unwrap_err();
        assert!(matches!(err, WranglerError::CatalogUnavailable(_)));
    }
}
