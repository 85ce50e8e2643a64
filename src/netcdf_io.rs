//! NetCDF input: CMIP6 member files and gridded observation files
//!
//! Reads variables, coordinates and attributes into plain vectors and
//! `ndarray` arrays. Fill values are turned into NaN on the way in so every
//! later stage can treat NaN as "missing".

use crate::dataset::{Attributes, AxisNames};
use crate::errors::{Result, WranglerError};
use ndarray::{Array3, ArrayView3, Axis};
use netcdf::{AttributeValue, File, Variable};
use serde_json::{json, Value as JsonValue};
use std::path::Path;
use tracing::{debug, warn};

const LAT_CANDIDATES: [&str; 2] = ["lat", "latitude"];
const LON_CANDIDATES: [&str; 2] = ["lon", "longitude"];
const DEFAULT_CALENDAR: &str = "standard";

/// One variable of one CMIP6 file, shaped (time, lat, lon)
#[derive(Debug, Clone)]
pub struct MemberField {
    pub time_values: Vec<f64>,
    pub time_units: String,
    pub calendar: String,
    pub axis_names: AxisNames,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub data: Array3<f32>,
    pub attrs: Attributes,
}

impl MemberField {
    /// Append the time steps of a later file of the same member
    pub fn append_time(&mut self, next: MemberField, source: &str) -> Result<()> {
        if next.lat != self.lat || next.lon != self.lon {
            return Err(WranglerError::CoordinateMismatch {
                name: source.to_string(),
                axis: "lat/lon".to_string(),
            });
        }
        if next.time_units != self.time_units || next.calendar != self.calendar {
            return Err(WranglerError::CoordinateMismatch {
                name: source.to_string(),
                axis: "time".to_string(),
            });
        }
        self.data
            .append(Axis(0), next.data.view())
            .map_err(WranglerError::Array)?;
        self.time_values.extend(next.time_values);
        Ok(())
    }
}

/// Raw contents of a gridded observation file
#[derive(Debug, Clone)]
pub struct ObservationFile {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Decimal-year timestamps of the kept months
    pub time: Vec<f64>,
    /// (time, lat, lon)
    pub anomaly: Array3<f32>,
    /// (month, lat, lon), twelve calendar months
    pub climatology: Array3<f32>,
    pub attrs: Attributes,
}

/// Read `variable` and its coordinates from one member file
pub fn read_member_file(path: &Path, variable: &str) -> Result<MemberField> {
    let file = netcdf::open(path)?;
    let var = require_variable(&file, variable, path)?;

    let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

    let (lat_name, lat) = read_coordinate(&file, &LAT_CANDIDATES, path)?;
    let (lon_name, lon) = read_coordinate(&file, &LON_CANDIDATES, path)?;

    if dim_names.len() != 3 || dim_names[0] != "time" || dim_names[1] != lat_name || dim_names[2] != lon_name
    {
        return Err(WranglerError::UnexpectedDimensions {
            var: variable.to_string(),
            dims: dim_names,
        });
    }

    let time_var = require_variable(&file, "time", path)?;
    let time_values = time_var.get_values::<f64, _>(..)?;
    let time_units = string_attribute(&time_var, "units").ok_or_else(|| {
        WranglerError::UnsupportedCalendar(format!("time axis of {} has no units", path.display()))
    })?;
    let calendar = string_attribute(&time_var, "calendar").unwrap_or_else(|| {
        debug!(file = %path.display(), "No calendar attribute, assuming '{DEFAULT_CALENDAR}'");
        DEFAULT_CALENDAR.to_string()
    });

    let values = var.get_values::<f32, _>(..)?;
    let mut data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)?;
    unpack_in_place(&var, &mut data);

    debug!(
        file = %path.display(),
        variable,
        shape = ?shape,
        "🚀 Loaded member field"
    );

    Ok(MemberField {
        time_values,
        time_units,
        calendar,
        axis_names: AxisNames {
            lat: lat_name,
            lon: lon_name,
        },
        lat,
        lon,
        data,
        attrs: collect_attributes(&var),
    })
}

/// Read only the horizontal coordinates of a member file
pub fn read_grid_coordinates(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let file = netcdf::open(path)?;
    let (_, lat) = read_coordinate(&file, &LAT_CANDIDATES, path)?;
    let (_, lon) = read_coordinate(&file, &LON_CANDIDATES, path)?;
    Ok((lat, lon))
}

/// Read an anomaly/climatology observation file, dropping the first
/// `skip_months` time steps
pub fn read_observation_file(path: &Path, skip_months: usize) -> Result<ObservationFile> {
    let file = netcdf::open(path)?;
    let (_, lat) = read_coordinate(&file, &LAT_CANDIDATES, path)?;
    let (_, lon) = read_coordinate(&file, &LON_CANDIDATES, path)?;

    let time_var = require_variable(&file, "time", path)?;
    let all_times = time_var.get_values::<f64, _>(..)?;
    let ntime = all_times.len();
    if skip_months >= ntime {
        return Err(WranglerError::EmptyInput(format!(
            "{} has {ntime} time steps, cannot skip {skip_months}",
            path.display()
        )));
    }
    let kept = ntime - skip_months;
    let (nlat, nlon) = (lat.len(), lon.len());

    let temperature = require_variable(&file, "temperature", path)?;
    let anomaly_values =
        temperature.get_values::<f32, _>((skip_months..ntime, 0..nlat, 0..nlon))?;
    let mut anomaly = Array3::from_shape_vec((kept, nlat, nlon), anomaly_values)?;
    unpack_in_place(&temperature, &mut anomaly);

    let climatology_var = require_variable(&file, "climatology", path)?;
    let nmonths = climatology_var
        .dimensions()
        .first()
        .map(|d| d.len())
        .unwrap_or_default();
    if nmonths != 12 {
        return Err(WranglerError::ShapeMismatch {
            name: "climatology".to_string(),
            expected: vec![12, nlat, nlon],
            found: climatology_var.dimensions().iter().map(|d| d.len()).collect(),
        });
    }
    let climatology_values = climatology_var.get_values::<f32, _>(..)?;
    let mut climatology = Array3::from_shape_vec((12, nlat, nlon), climatology_values)?;
    unpack_in_place(&climatology_var, &mut climatology);

    Ok(ObservationFile {
        lat,
        lon,
        time: all_times[skip_months..].to_vec(),
        anomaly,
        climatology,
        attrs: collect_attributes(&temperature),
    })
}

fn require_variable<'f>(file: &'f File, name: &str, path: &Path) -> Result<Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| WranglerError::VariableNotFound {
            var: name.to_string(),
            source_name: path.display().to_string(),
        })
}

fn read_coordinate(file: &File, candidates: &[&str], path: &Path) -> Result<(String, Vec<f64>)> {
    for name in candidates {
        if let Some(var) = file.variable(name) {
            let values = var.get_values::<f64, _>(..)?;
            return Ok((name.to_string(), values));
        }
    }
    Err(WranglerError::VariableNotFound {
        var: candidates.join("|"),
        source_name: path.display().to_string(),
    })
}

/// Apply `_FillValue`/`missing_value` masking and `scale_factor`/`add_offset`
fn unpack_in_place(var: &Variable, data: &mut Array3<f32>) {
    let fill_values: Vec<f32> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| numeric_attribute(var, name))
        .map(|v| v as f32)
        .collect();
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0) as f32;
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0) as f32;
    let packed = scale != 1.0 || offset != 0.0;

    data.mapv_inplace(|x| {
        if fill_values.iter().any(|&fv| x == fv) {
            f32::NAN
        } else if packed {
            x * scale + offset
        } else {
            x
        }
    });
}

pub(crate) fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(ss) => ss.into_iter().next(),
        _ => None,
    }
}

pub(crate) fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Doubles(vs) => vs.first().copied(),
        AttributeValue::Floats(vs) => vs.first().map(|&v| f64::from(v)),
        _ => None,
    }
}

/// Copy variable attributes into JSON form, excluding packing/fill keys
fn collect_attributes(var: &Variable) -> Attributes {
    let mut attrs = Attributes::new();
    for attr in var.attributes() {
        let name = attr.name().to_string();
        if matches!(
            name.as_str(),
            "_FillValue" | "missing_value" | "scale_factor" | "add_offset"
        ) {
            continue;
        }
        match attr.value() {
            Ok(value) => match attribute_to_json(value) {
                Some(json) => {
                    attrs.insert(name, json);
                }
                None => warn!("⚠ Skipped unsupported attribute type for '{name}'"),
            },
            Err(e) => warn!("⚠ Could not read attribute '{name}': {e}"),
        }
    }
    attrs
}

fn attribute_to_json(value: AttributeValue) -> Option<JsonValue> {
    let json = match value {
        AttributeValue::Str(v) => json!(v),
        AttributeValue::Strs(v) => json!(v),
        AttributeValue::Float(v) => json!(v),
        AttributeValue::Floats(v) => json!(v),
        AttributeValue::Double(v) => json!(v),
        AttributeValue::Doubles(v) => json!(v),
        AttributeValue::Int(v) => json!(v),
        AttributeValue::Ints(v) => json!(v),
        AttributeValue::Short(v) => json!(v),
        AttributeValue::Shorts(v) => json!(v),
        AttributeValue::Uchar(v) => json!(v),
        AttributeValue::Uchars(v) => json!(v),
        AttributeValue::Ushort(v) => json!(v),
        AttributeValue::Ushorts(v) => json!(v),
        AttributeValue::Uint(v) => json!(v),
        AttributeValue::Uints(v) => json!(v),
        _ => return None,
    };
    // NaN/inf attributes have no JSON form
    if json.is_null() {
        None
    } else {
        Some(json)
    }
}

/// Check every member field shares the first member's shape
pub(crate) fn check_member_shapes(fields: &[(String, ArrayView3<'_, f32>)]) -> Result<()> {
    if let Some((_, first)) = fields.first() {
        for (member, view) in &fields[1..] {
            if view.shape() != first.shape() {
                return Err(WranglerError::ShapeMismatch {
                    name: member.clone(),
                    expected: first.shape().to_vec(),
                    found: view.shape().to_vec(),
                });
            }
        }
    }
    Ok(())
}
