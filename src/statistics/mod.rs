//! Statistical reductions across models
//!
//! # Organization
//!
//! - [`operations`]: NaN-aware per-cell statistics
//! - [`parallel`]: rayon-backed reductions along the model axis
//! - [`multimodel`]: latitude-banded reduction of gridded model stores
//! - [`global_mean`]: spatial means and their cross-model spread

pub mod global_mean;
pub mod multimodel;
pub mod operations;
pub mod parallel;

pub use global_mean::{global_mean, process_global_means, reduce_series};
pub use multimodel::{lat_bands, process_scenario, reduce_scenario};
pub use operations::{nan_mean, CellStats, StatOperation};
pub use parallel::{mean_leading_axis, reduce_models_grid, reduce_models_series, GridStats, SeriesStats};
