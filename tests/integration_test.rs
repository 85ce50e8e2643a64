//! End-to-end tests over a small synthetic CMIP6 archive
//!
//! Three models on three different grids, two scenarios, one multi-file
//! member and one listed exception. Every field is spatially constant and
//! grows by one degree per month, so expected statistics are easy to state.

mod common;

use chrono::NaiveDate;
use cmip_wrangler::baseline::BaselinePeriod;
use cmip_wrangler::catalog::{resolve_path, CatalogQuery, CompositeKey};
use cmip_wrangler::config::PipelineConfig;
use cmip_wrangler::data_source::LazyDataReader;
use cmip_wrangler::errors::WranglerError;
use cmip_wrangler::exceptions::ExceptionList;
use cmip_wrangler::grid::build_reference_grid;
use cmip_wrangler::normalize::{normalize, normalize_all};
use cmip_wrangler::observations::process_observations;
use cmip_wrangler::pipeline::Pipeline;
use cmip_wrangler::store::DatasetStore;
use common::{day360_mid_month_days, noleap_mid_month_days, write_catalog, write_member_file, MemberFile, Row};
use netcdf::create;
use std::path::Path;
use tempfile::tempdir;

const NTIME: usize = 24;
const KELVIN: f32 = 273.15;

const BCC_LAT: [f64; 3] = [-45.0, 0.0, 45.0];
const BCC_LON: [f64; 4] = [0.0, 90.0, 180.0, 270.0];
const CAN_LAT: [f64; 4] = [-60.0, -20.0, 20.0, 60.0];
const CAN_LON: [f64; 3] = [0.0, 120.0, 240.0];
const MIROC_LAT: [f64; 3] = [-50.0, 0.0, 50.0];
const MIROC_LON: [f64; 4] = [-180.0, -90.0, 0.0, 90.0];

fn date(y: i32, m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, 15).expect("valid date")
}

fn noleap_file<'a>(lat: &'a [f64], lon: &'a [f64], time: &'a [f64], units: &'a str) -> MemberFile<'a> {
    MemberFile {
        variable: "tas",
        lat_name: "lat",
        lon_name: "lon",
        lat,
        lon,
        time,
        time_units: units,
        calendar: "noleap",
    }
}

/// Write the archive and its catalog under `dir`
///
/// Celsius values per month `t`:
/// - BCC-CSM2-MR: historical members 10 + t and 12 + t, ssp126 40 + t
/// - CanESM5: historical 20 + t, ssp126 listed as an exception
/// - MIROC6: historical 30 + t, ssp126 50 + t, 360-day calendar
fn build_archive(dir: &Path) {
    let days = noleap_mid_month_days(NTIME);
    let days360 = day360_mid_month_days(NTIME);
    let hist_units = "days since 1850-01-01";
    let ssp_units = "days since 2015-01-01";
    let kelvin = |offset: f32| move |t: usize, _: usize, _: usize| KELVIN + offset + t as f32;

    // r1 of the reference model is split over two files
    write_member_file(
        &dir.join("bcc_hist_r1_1850.nc"),
        &noleap_file(&BCC_LAT, &BCC_LON, &days[..12], hist_units),
        kelvin(10.0),
    );
    write_member_file(
        &dir.join("bcc_hist_r1_1851.nc"),
        &noleap_file(&BCC_LAT, &BCC_LON, &days[12..], hist_units),
        // Local month t is global month t + 12
        kelvin(22.0),
    );
    write_member_file(
        &dir.join("bcc_hist_r2.nc"),
        &noleap_file(&BCC_LAT, &BCC_LON, &days, hist_units),
        kelvin(12.0),
    );
    write_member_file(
        &dir.join("bcc_ssp126_r1.nc"),
        &noleap_file(&BCC_LAT, &BCC_LON, &days, ssp_units),
        kelvin(40.0),
    );
    write_member_file(
        &dir.join("can_hist_r1.nc"),
        &noleap_file(&CAN_LAT, &CAN_LON, &days, hist_units),
        kelvin(20.0),
    );
    write_member_file(
        &dir.join("can_ssp126_r1.nc"),
        &noleap_file(&CAN_LAT, &CAN_LON, &days, ssp_units),
        kelvin(25.0),
    );
    for (file, units, offset) in [
        ("miroc_hist_r1.nc", hist_units, 30.0),
        ("miroc_ssp126_r1.nc", ssp_units, 50.0),
    ] {
        write_member_file(
            &dir.join(file),
            &MemberFile {
                variable: "tas",
                lat_name: "latitude",
                lon_name: "longitude",
                lat: &MIROC_LAT,
                lon: &MIROC_LON,
                time: &days360,
                time_units: units,
                calendar: "360_day",
            },
            kelvin(offset),
        );
    }

    write_catalog(
        dir,
        &[
            row("CMIP", "BCC", "BCC-CSM2-MR", "historical", "r1i1p1f1", "bcc_hist_r1_1851.nc"),
            row("CMIP", "BCC", "BCC-CSM2-MR", "historical", "r1i1p1f1", "bcc_hist_r1_1850.nc"),
            row("CMIP", "BCC", "BCC-CSM2-MR", "historical", "r2i1p1f1", "bcc_hist_r2.nc"),
            row("ScenarioMIP", "BCC", "BCC-CSM2-MR", "ssp126", "r1i1p1f1", "bcc_ssp126_r1.nc"),
            row("CMIP", "CCCma", "CanESM5", "historical", "r1i1p1f1", "can_hist_r1.nc"),
            row("ScenarioMIP", "CCCma", "CanESM5", "ssp126", "r1i1p1f1", "can_ssp126_r1.nc"),
            row("CMIP", "MIROC", "MIROC6", "historical", "r1i1p1f1", "miroc_hist_r1.nc"),
            row("ScenarioMIP", "MIROC", "MIROC6", "ssp126", "r1i1p1f1", "miroc_ssp126_r1.nc"),
            row("ScenarioMIP", "MIROC", "MIROC6", "ssp585", "r1i1p1f1", "miroc_ssp585_r1.nc"),
        ],
    );
}

/// Anomaly/climatology file on a -180..180 grid with decimal-year times
fn write_observation_file(path: &Path, ntime: usize) {
    let lat = [-30.0_f64, 30.0];
    let lon = [-135.0_f64, -45.0, 45.0, 135.0];
    let mut file = create(path).expect("Failed to create observation file");
    file.add_dimension("time", ntime).expect("time");
    file.add_dimension("latitude", lat.len()).expect("latitude");
    file.add_dimension("longitude", lon.len()).expect("longitude");
    file.add_dimension("month_number", 12).expect("month_number");

    let times: Vec<f64> = (0..ntime).map(|k| 1850.0 + (k as f64 + 0.5) / 12.0).collect();
    file.add_variable::<f64>("time", &["time"])
        .expect("time var")
        .put_values(&times, ..)
        .expect("write time");
    file.add_variable::<f64>("latitude", &["latitude"])
        .expect("lat var")
        .put_values(&lat, ..)
        .expect("write lat");
    file.add_variable::<f64>("longitude", &["longitude"])
        .expect("lon var")
        .put_values(&lon, ..)
        .expect("write lon");

    // Anomaly grows by 0.1 per month and by 1 per longitude column
    let anomaly: Vec<f32> = (0..ntime)
        .flat_map(|k| (0..lat.len()).flat_map(move |_| (0..4).map(move |j| 0.1 * k as f32 + j as f32)))
        .collect();
    let mut temperature = file
        .add_variable::<f32>("temperature", &["time", "latitude", "longitude"])
        .expect("temperature var");
    temperature.put_attribute("units", "degree C").expect("units");
    temperature.put_values(&anomaly, ..).expect("write anomaly");

    let climatology: Vec<f32> = (0..12)
        .flat_map(|m| std::iter::repeat(10.0 + m as f32).take(lat.len() * lon.len()))
        .collect();
    file.add_variable::<f32>("climatology", &["month_number", "latitude", "longitude"])
        .expect("climatology var")
        .put_values(&climatology, ..)
        .expect("write climatology");
}

fn row(
    activity: &'static str,
    institution: &'static str,
    source: &'static str,
    experiment: &'static str,
    member: &'static str,
    path: &'static str,
) -> Row<'static> {
    Row {
        activity,
        institution,
        source,
        experiment,
        member,
        path,
    }
}

fn query(scenarios: &[&str]) -> CatalogQuery {
    CatalogQuery {
        scenarios: scenarios.iter().map(|s| s.to_string()).collect(),
        variable: "tas".to_string(),
        table: "Amon".to_string(),
        grid_label: "gn".to_string(),
    }
}

fn catalog_location(dir: &Path) -> String {
    dir.join("catalog.json").to_string_lossy().into_owned()
}

fn reference_key() -> CompositeKey {
    CompositeKey::new("CMIP", "BCC", "BCC-CSM2-MR", "historical", "Amon", "gn")
}

#[test]
fn test_resolve_groups_rows_by_key_and_member() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    build_archive(temp_dir.path());

    let resolution = resolve_path(&catalog_location(temp_dir.path()), &query(&["historical", "ssp126"]))
        .expect("catalog resolves");
    assert_eq!(resolution.datasets.len(), 6);
    assert_eq!(resolution.model_names, vec!["BCC-CSM2-MR", "CanESM5", "MIROC6"]);
    assert_eq!(resolution.metadata.len(), 8);

    let reference = resolution.datasets.get(&reference_key()).expect("reference key present");
    assert_eq!(reference.members.len(), 2);
    let r1 = &reference.members[0];
    assert_eq!(r1.member_id, "r1i1p1f1");
    assert_eq!(
        r1.paths,
        vec![
            temp_dir.path().join("bcc_hist_r1_1850.nc"),
            temp_dir.path().join("bcc_hist_r1_1851.nc")
        ]
    );

    assert_eq!(resolution.institution_for("CanESM5"), Some("CCCma"));
    let key = resolution
        .key_for("ScenarioMIP", "MIROC6", "ssp126")
        .expect("key rebuilt from metadata");
    assert_eq!(key.to_string(), "ScenarioMIP.MIROC.MIROC6.ssp126.Amon.gn");
    assert!(matches!(
        resolution.key_for("ScenarioMIP", "MIROC6", "ssp370"),
        Err(WranglerError::MissingKey { .. })
    ));

    let none = resolve_path(&catalog_location(temp_dir.path()), &query(&["ssp370"])).expect("resolves");
    assert!(none.datasets.is_empty());
    assert!(matches!(
        resolve_path(&catalog_location(temp_dir.path()), &query(&[])),
        Err(WranglerError::EmptyInput(_))
    ));
    assert!(matches!(
        resolve_path("https://storage.googleapis.com/cmip6/pangeo-cmip6.json", &query(&["historical"])),
        Err(WranglerError::CatalogUnavailable(_))
    ));
}

#[test]
fn test_normalize_concatenates_members_and_regrids() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    build_archive(temp_dir.path());
    let resolution = resolve_path(&catalog_location(temp_dir.path()), &query(&["historical", "ssp126"]))
        .expect("catalog resolves");

    let grid = build_reference_grid(&resolution.datasets, &reference_key()).expect("reference grid");
    assert_eq!(grid.lat(), &BCC_LAT);
    assert_eq!(grid.lon(), &BCC_LON);

    let bcc = normalize(&resolution.datasets, &reference_key(), &grid).expect("reference normalizes");
    assert_eq!(bcc.ntime(), NTIME);
    assert_eq!(bcc.time[0], date(1850, 1));
    assert_eq!(bcc.time[13], date(1851, 2));
    assert_eq!(bcc.data.dim(), (NTIME, 3, 4));
    for ((t, _, _), value) in bcc.data.indexed_iter() {
        assert!((value - (11.0 + t as f32)).abs() < 1e-3, "t={t}: {value}");
    }
    assert_eq!(bcc.attrs["units"], serde_json::json!("degC"));

    let miroc_key: CompositeKey = "CMIP.MIROC.MIROC6.historical.Amon.gn".parse().expect("key");
    let miroc = normalize(&resolution.datasets, &miroc_key, &grid).expect("MIROC6 normalizes");
    assert!(miroc.grid.shares_storage_with(&grid));
    assert_eq!(miroc.time, bcc.time);
    assert!(miroc.data.iter().all(|v| v.is_finite()));
    assert!((miroc.data[[5, 2, 3]] - 35.0).abs() < 1e-3);

    let missing: CompositeKey = "CMIP.NASA-GISS.GISS-E2-1-G.historical.Amon.gn".parse().expect("key");
    assert!(matches!(
        normalize(&resolution.datasets, &missing, &grid),
        Err(WranglerError::MissingKey { .. })
    ));
    assert!(matches!(
        build_reference_grid(&resolution.datasets, &missing),
        Err(WranglerError::MissingKey { .. })
    ));
}

#[test]
fn test_normalize_all_skips_exceptions_and_survives_failures() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    build_archive(temp_dir.path());

    // Referenced by the catalog but never written: loading it fails
    let resolution = resolve_path(
        &catalog_location(temp_dir.path()),
        &query(&["historical", "ssp126", "ssp585"]),
    )
    .expect("catalog resolves");
    assert_eq!(resolution.datasets.len(), 7);

    let grid = build_reference_grid(&resolution.datasets, &reference_key()).expect("reference grid");
    let store = DatasetStore::new(temp_dir.path().join("stores"));
    let report = normalize_all(&resolution.datasets, &grid, &ExceptionList::builtin(), &store);

    assert_eq!(report.succeeded, 5);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].item, "ScenarioMIP.MIROC.MIROC6.ssp585.Amon.gn");

    assert!(!store.exists("tas_ssp126_CanESM5"));
    assert!(!store.exists("tas_ssp585_MIROC6"));
    for name in [
        "tas_historical_BCC-CSM2-MR",
        "tas_historical_CanESM5",
        "tas_historical_MIROC6",
        "tas_ssp126_BCC-CSM2-MR",
        "tas_ssp126_MIROC6",
    ] {
        assert!(store.exists(name), "{name} missing");
    }

    // Without exceptions the CanESM5 scenario run is written as well
    let unfiltered = DatasetStore::new(temp_dir.path().join("unfiltered"));
    let report = normalize_all(&resolution.datasets, &grid, &ExceptionList::empty(), &unfiltered);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.skipped, 0);
    assert!(unfiltered.exists("tas_ssp126_CanESM5"));
}

#[test]
fn test_members_with_offset_times_are_rejected() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let days = noleap_mid_month_days(13);
    let units = "days since 1850-01-01";
    let constant = |t: usize, _: usize, _: usize| KELVIN + t as f32;

    // Same length, but r2 starts one month later
    write_member_file(&dir.join("r1.nc"), &noleap_file(&BCC_LAT, &BCC_LON, &days[..12], units), constant);
    write_member_file(&dir.join("r2.nc"), &noleap_file(&BCC_LAT, &BCC_LON, &days[1..], units), constant);
    write_catalog(
        dir,
        &[
            row("CMIP", "BCC", "BCC-CSM2-MR", "historical", "r1i1p1f1", "r1.nc"),
            row("CMIP", "BCC", "BCC-CSM2-MR", "historical", "r2i1p1f1", "r2.nc"),
        ],
    );

    let resolution = resolve_path(&catalog_location(dir), &query(&["historical"])).expect("catalog resolves");
    let dataset = resolution.datasets.get(&reference_key()).expect("reference key present");
    assert_eq!(dataset.members.len(), 2);
    assert!(matches!(
        dataset.load(),
        Err(WranglerError::CoordinateMismatch { ref axis, .. }) if axis == "time"
    ));

    // The batch records the failure instead of averaging mismatched months
    let grid = build_reference_grid(&resolution.datasets, &reference_key()).expect("reference grid");
    let store = DatasetStore::new(dir.join("stores"));
    let report = normalize_all(&resolution.datasets, &grid, &ExceptionList::empty(), &store);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed(), 1);
    assert!(!store.exists("tas_historical_BCC-CSM2-MR"));
}

#[test]
fn test_unexpected_dimensions_are_reported() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("transposed.nc");
    {
        let mut file = create(&path).expect("Failed to create file");
        file.add_dimension("lat", 2).expect("lat");
        file.add_dimension("lon", 2).expect("lon");
        file.add_dimension("time", 1).expect("time");
        let mut time = file.add_variable::<f64>("time", &["time"]).expect("time var");
        time.put_attribute("units", "days since 1850-01-01").expect("units");
        time.put_values(&[14.5], ..).expect("write time");
        file.add_variable::<f64>("lat", &["lat"])
            .expect("lat var")
            .put_values(&[-10.0, 10.0], ..)
            .expect("write lat");
        file.add_variable::<f64>("lon", &["lon"])
            .expect("lon var")
            .put_values(&[0.0, 180.0], ..)
            .expect("write lon");
        file.add_variable::<f32>("tas", &["lat", "lon", "time"])
            .expect("tas var")
            .put_values(&[280.0_f32; 4], ..)
            .expect("write tas");
    }

    let result = cmip_wrangler::netcdf_io::read_member_file(&path, "tas");
    assert!(matches!(result, Err(WranglerError::UnexpectedDimensions { .. })));
    let result = cmip_wrangler::netcdf_io::read_member_file(&path, "pr");
    assert!(matches!(result, Err(WranglerError::VariableNotFound { .. })));
}

#[test]
fn test_observations_are_absolute_and_wrapped() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("Land_and_Ocean_LatLong1.nc");
    write_observation_file(&path, 5);

    let obs = process_observations(&path, 2).expect("observations process");
    assert_eq!(obs.time, vec![date(1850, 3), date(1850, 4), date(1850, 5)]);
    assert_eq!(obs.grid.lon(), &[45.0, 135.0, 225.0, 315.0]);
    assert_eq!(obs.mean.dim(), (3, 2, 4));

    // Column 0 is the 45E input column (j = 2), March climatology is 12
    assert!((obs.mean[[0, 0, 0]] - (0.2 + 2.0 + 12.0)).abs() < 1e-4);
    // Column 2 is the -135E input column (j = 0), May climatology is 14
    assert!((obs.mean[[2, 1, 2]] - (0.4 + 0.0 + 14.0)).abs() < 1e-4);
    assert_eq!(obs.attrs["units"], serde_json::json!("degC"));

    assert!(matches!(
        process_observations(&path, 5),
        Err(WranglerError::EmptyInput(_))
    ));
}

#[test]
fn test_full_pipeline_run() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    build_archive(temp_dir.path());
    let obs_path = temp_dir.path().join("observations.nc");
    write_observation_file(&obs_path, 6);

    let config = PipelineConfig {
        data_dir: temp_dir.path().to_path_buf(),
        scenarios: vec!["historical".to_string(), "ssp126".to_string()],
        num_chunks: 2,
        observations_file: Some(obs_path),
        skip_months: 1,
        baseline_enabled: true,
        baseline: BaselinePeriod::default(),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config).expect("pipeline builds");
    let summary = pipeline.run().expect("pipeline runs");
    assert!(summary.is_clean(), "{:?}", summary.reports);

    let store = pipeline.store();
    assert_eq!(store.root(), temp_dir.path().join("stores"));

    // Normalization
    let normalize_report = &summary.reports[0];
    assert_eq!(normalize_report.succeeded, 5);
    assert_eq!(normalize_report.skipped, 1);
    assert!(!store.exists("tas_ssp126_CanESM5"));

    // Multi-model statistics
    let historical = store.load_statistics("modelData_tas_historical").expect("historical stats");
    assert_eq!(historical.model_count, 3);
    assert_eq!(historical.mean.dim(), (NTIME, 3, 4));
    assert_eq!(historical.time[0], date(1850, 1));
    for t in [0, 7, 23] {
        let offset = t as f32;
        assert!((historical.mean[[t, 1, 2]] - (61.0 / 3.0 + offset)).abs() < 1e-3);
        assert!((historical.min[[t, 0, 0]] - (11.0 + offset)).abs() < 1e-3);
        assert!((historical.max[[t, 2, 3]] - (30.0 + offset)).abs() < 1e-3);
    }

    let ssp126 = store.load_statistics("modelData_tas_ssp126").expect("ssp126 stats");
    assert_eq!(ssp126.model_count, 2);
    assert_eq!(ssp126.time[0], date(2015, 1));
    assert!((ssp126.mean[[3, 1, 1]] - 48.0).abs() < 1e-3);
    assert!((ssp126.std[[3, 1, 1]] - 5.0).abs() < 1e-3);

    // Baseline-normalized stores and their statistics
    let normalized = store
        .load_model("Normalized_tas_ssp126_BCC-CSM2-MR", "tas")
        .expect("normalized store");
    assert!((normalized.data[[0, 0, 0]] - 17.5).abs() < 1e-3);
    assert_eq!(normalized.attrs["baseline_period"], serde_json::json!([1850, 1950]));
    let normalized_stats = store
        .load_statistics("modelData_normalized_tas_ssp126")
        .expect("normalized stats");
    assert!((normalized_stats.mean[[2, 0, 0]] - 15.0).abs() < 1e-3);

    // Observations
    let obs = store.open("historical_obs").expect("observations store");
    assert_eq!(obs.ntime(), 5);
    assert_eq!(obs.fields, vec!["mean".to_string()]);

    // Global means
    let stats = store.open("tas_historical_GLOBALMEAN_STATS").expect("global mean stats");
    let mean = stats.read_series("mean").expect("mean series");
    assert!((mean[10] - (61.0 / 3.0 + 10.0)).abs() < 1e-3);
    assert!(store.exists("tas_ssp126_MIROC6_GLOBALMEAN"));
    assert!(!store.exists("tas_ssp126_CanESM5_GLOBALMEAN"));

    assert!(summary.written.contains(&"modelData_tas_ssp126".to_string()));
    assert!(summary.written.contains(&"historical_obs".to_string()));
    assert!(summary.timings.iter().any(|t| t.stage == "B: normalize"));

    // A second run clears each stage's outputs before writing them again
    let again = pipeline.run().expect("pipeline reruns");
    assert!(again.is_clean(), "{:?}", again.reports);
}
