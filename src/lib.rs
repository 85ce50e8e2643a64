//! cmip_wrangler: CMIP6 temperature regridding and multi-model statistics
//!
//! A batch pipeline that turns CMIP6 model output and gridded historical
//! observations into chunked Zarr stores for a visualization dashboard.
//!
//! ## Key Features
//!
//! - **Catalog resolution**: local ESM collection catalogs, typed composite keys
//! - **Normalization**: ensemble mean, monthly calendar canonicalization,
//!   nearest-neighbour regridding onto one reference grid, Kelvin to Celsius
//! - **Statistics**: NaN-aware mean/min/max/std across models, computed per
//!   latitude band in parallel with Rayon
//! - **Global means**: spatial means per model and their spread
//! - **Observations and baselines**: absolute observed temperature, anomalies
//!   against each model's own historical period
//!
//! ## Module Organization
//!
//! - [`catalog`]: catalog parsing, query resolution, lazy datasets
//! - [`calendar`]: CF time decoding and day-15 canonicalization
//! - [`grid`] / [`regrid`]: reference grid and nearest-neighbour mapping
//! - [`normalize`]: the per-model normalization chain
//! - [`exceptions`]: skip table of known-bad runs
//! - [`store`] / [`zarr_io`]: named Zarr stores on disk
//! - [`statistics`]: multi-model and global-mean reductions
//! - [`observations`] / [`baseline`]: supplementary datasets
//! - [`pipeline`]: stage driver and batch reports
//! - [`config`] / [`parallel`]: run configuration and thread pool
//! - [`metadata`]: store inspection
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cmip_wrangler::prelude::*;
//!
//! let config = PipelineConfig::load(std::path::Path::new("wrangler.json")).unwrap();
//! let pipeline = Pipeline::new(config).unwrap();
//! let summary = pipeline.run().unwrap();
//! for report in &summary.reports {
//!     println!("{report}");
//! }
//! ```

pub mod baseline;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod data_source;
pub mod dataset;
pub mod errors;
pub mod exceptions;
pub mod grid;
pub mod metadata;
pub mod netcdf_io;
pub mod normalize;
pub mod observations;
pub mod parallel;
pub mod pipeline;
pub mod regrid;
pub mod statistics;
pub mod store;
pub mod zarr_io;

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::baseline::BaselinePeriod;
    pub use crate::catalog::{resolve, Catalog, CatalogQuery, CompositeKey, DatasetDictionary, LazyDataset, Resolution};
    pub use crate::config::PipelineConfig;
    pub use crate::data_source::LazyDataReader;
    pub use crate::dataset::{NormalizedModelDataset, StatisticsDataset};
    pub use crate::errors::{Result, WranglerError};
    pub use crate::exceptions::ExceptionList;
    pub use crate::grid::{build_reference_grid, ReferenceGrid};
    pub use crate::normalize::{normalize, normalize_all, NormalizeOutcome};
    pub use crate::parallel::{get_parallel_info, ParallelConfig};
    pub use crate::pipeline::{BatchReport, Pipeline, RunSummary};
    pub use crate::statistics::{process_scenario, reduce_scenario};
    pub use crate::store::{DatasetStore, StoredDataset};
}
