//! Centralized error handling for the wrangler
//!
//! Every stage returns [`Result`], so item-level failures (one model, one
//! scenario) can be logged by the pipeline driver and the batch can move on.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for wrangler operations
#[derive(Error, Debug)]
pub enum WranglerError {
    /// The catalog index could not be reached or parsed
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A composite key is absent from the resolved dataset dictionary
    #[error("Key '{key}' not found in dataset dictionary")]
    MissingKey { key: String },

    /// A timestamp could not be reduced to (year, month)
    #[error("Unsupported calendar: {0}")]
    UnsupportedCalendar(String),

    /// The output store already exists and stores cannot be overwritten
    #[error("Destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// An array does not have the shape the reduction expects
    #[error("Shape mismatch for '{name}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Two datasets that must share an axis do not
    #[error("Coordinate '{axis}' of '{name}' does not match the other datasets")]
    CoordinateMismatch { name: String, axis: String },

    /// Variable not found in a NetCDF file or store
    #[error("Variable '{var}' not found in {source_name}")]
    VariableNotFound { var: String, source_name: String },

    /// A variable has a dimension layout the pipeline cannot handle
    #[error("Variable '{var}' has unexpected dimensions {dims:?}")]
    UnexpectedDimensions { var: String, dims: Vec<String> },

    /// Nothing to process where at least one item is required
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Configuration is missing or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// Zarr store errors
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (catalog, config, attributes) errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog CSV errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl WranglerError {
    pub(crate) fn zarr(err: impl std::fmt::Display) -> Self {
        WranglerError::Zarr(err.to_string())
    }
}

/// Result type alias for wrangler operations
pub type Result<T> = std::result::Result<T, WranglerError>;
