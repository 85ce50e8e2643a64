//! Shared fixtures: synthetic CMIP6-style NetCDF files, catalogs and stores

#![allow(dead_code)]

use chrono::NaiveDate;
use cmip_wrangler::calendar::month_anchor;
use cmip_wrangler::dataset::{Attributes, NormalizedModelDataset};
use cmip_wrangler::grid::ReferenceGrid;
use ndarray::Array3;
use netcdf::create;
use std::path::{Path, PathBuf};

pub const NOLEAP_CUMULATIVE: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Mid-month offsets in a no-leap calendar, `ntime` months from the epoch
pub fn noleap_mid_month_days(ntime: usize) -> Vec<f64> {
    (0..ntime)
        .map(|t| (t / 12) as f64 * 365.0 + f64::from(NOLEAP_CUMULATIVE[t % 12]) + 14.5)
        .collect()
}

/// Mid-month offsets in a 360-day calendar
pub fn day360_mid_month_days(ntime: usize) -> Vec<f64> {
    (0..ntime).map(|t| t as f64 * 30.0 + 15.0).collect()
}

/// Description of one synthetic member file
pub struct MemberFile<'a> {
    pub variable: &'a str,
    pub lat_name: &'a str,
    pub lon_name: &'a str,
    pub lat: &'a [f64],
    pub lon: &'a [f64],
    pub time: &'a [f64],
    pub time_units: &'a str,
    pub calendar: &'a str,
}

/// Write a `(time, lat, lon)` variable filled by `value(t, i, j)`
pub fn write_member_file(path: &Path, spec: &MemberFile<'_>, value: impl Fn(usize, usize, usize) -> f32) {
    let (ntime, nlat, nlon) = (spec.time.len(), spec.lat.len(), spec.lon.len());
    let mut file = create(path).expect("Failed to create NetCDF file");

    file.add_dimension("time", ntime).expect("Failed to add time");
    file.add_dimension(spec.lat_name, nlat).expect("Failed to add lat");
    file.add_dimension(spec.lon_name, nlon).expect("Failed to add lon");
    file.add_attribute("source", "synthetic test data")
        .expect("Failed to add global attribute");

    {
        let mut time = file
            .add_variable::<f64>("time", &["time"])
            .expect("Failed to add time variable");
        time.put_attribute("units", spec.time_units).expect("units");
        time.put_attribute("calendar", spec.calendar).expect("calendar");
        time.put_values(spec.time, ..).expect("Failed to write time");
    }
    {
        let mut lat = file
            .add_variable::<f64>(spec.lat_name, &[spec.lat_name])
            .expect("Failed to add lat variable");
        lat.put_attribute("units", "degrees_north").expect("units");
        lat.put_values(spec.lat, ..).expect("Failed to write lat");
    }
    {
        let mut lon = file
            .add_variable::<f64>(spec.lon_name, &[spec.lon_name])
            .expect("Failed to add lon variable");
        lon.put_attribute("units", "degrees_east").expect("units");
        lon.put_values(spec.lon, ..).expect("Failed to write lon");
    }

    let data = Array3::from_shape_fn((ntime, nlat, nlon), |(t, i, j)| value(t, i, j));
    let mut var = file
        .add_variable::<f32>(spec.variable, &["time", spec.lat_name, spec.lon_name])
        .expect("Failed to add data variable");
    var.put_attribute("units", "K").expect("units");
    var.put_attribute("long_name", "Near-Surface Air Temperature")
        .expect("long_name");
    var.put_attribute("missing_value", 1.0e20_f32).expect("missing_value");
    var.put_values(data.as_slice().expect("contiguous"), ..)
        .expect("Failed to write data");
}

/// One catalog row
pub struct Row<'a> {
    pub activity: &'a str,
    pub institution: &'a str,
    pub source: &'a str,
    pub experiment: &'a str,
    pub member: &'a str,
    pub path: &'a str,
}

/// Write `catalog.json` plus `catalog.csv` into `dir`, asset paths relative
pub fn write_catalog(dir: &Path, rows: &[Row<'_>]) -> PathBuf {
    let mut csv = String::from(
        "activity_id,institution_id,source_id,experiment_id,member_id,table_id,variable_id,grid_label,path,version\n",
    );
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},Amon,tas,gn,{},20190101\n",
            row.activity, row.institution, row.source, row.experiment, row.member, row.path
        ));
    }
    std::fs::write(dir.join("catalog.csv"), csv).expect("Failed to write catalog CSV");

    let json = serde_json::json!({
        "esmcat_version": "0.1.0",
        "id": "synthetic-cmip6",
        "assets": {"column_name": "path", "format": "netcdf"},
        "catalog_file": "catalog.csv"
    });
    let path = dir.join("catalog.json");
    std::fs::write(&path, json.to_string()).expect("Failed to write catalog JSON");
    path
}

/// Monthly day-15 anchors starting at `year`-01
pub fn monthly_dates(year: i32, ntime: usize) -> Vec<NaiveDate> {
    (0..ntime)
        .map(|t| month_anchor(year + (t / 12) as i32, (t % 12) as u32 + 1).expect("valid month"))
        .collect()
}

pub fn grid(nlat: usize, nlon: usize) -> ReferenceGrid {
    let lat = (0..nlat).map(|i| -60.0 + 30.0 * i as f64).collect();
    let lon = (0..nlon).map(|j| 90.0 * j as f64).collect();
    ReferenceGrid::new(lat, lon).expect("valid grid")
}

/// A normalized `tas` dataset filled by `value(t, i, j)`
pub fn model_dataset(
    grid: &ReferenceGrid,
    ntime: usize,
    value: impl Fn(usize, usize, usize) -> f32,
) -> NormalizedModelDataset {
    let data = Array3::from_shape_fn((ntime, grid.nlat(), grid.nlon()), |(t, i, j)| value(t, i, j));
    NormalizedModelDataset::new("tas", monthly_dates(2015, ntime), grid.clone(), data, Attributes::new())
        .expect("consistent dataset")
}
