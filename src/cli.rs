//! Defines command-line interface options using `clap` for the cmip-wrangler binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Batch pipeline turning CMIP6 output and observations into dashboard-ready stores
#[derive(Parser, Debug)]
#[command(
    version,
    name = "cmip-wrangler",
    about = "Regrid CMIP6 temperature output and compute multi-model statistics"
)]
pub struct Args {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Base data directory, overrides the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// ESM collection JSON, overrides the config file
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Store root directory, overrides the config file
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Scenarios to process, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    pub scenarios: Option<Vec<String>>,

    /// Variable to process
    #[arg(long, global = true)]
    pub variable: Option<String>,

    /// Latitude bands for the multi-model reducer
    #[arg(long, global = true)]
    pub num_chunks: Option<usize>,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Log verbosity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every stage in order
    Run,
    /// Resolve the catalog and list the matching datasets
    Resolve,
    /// Normalize every resolved model onto the reference grid
    Normalize,
    /// Subtract each model's historical baseline
    Baseline {
        /// First baseline year
        #[arg(long)]
        start_year: Option<i32>,
        /// Last baseline year
        #[arg(long)]
        end_year: Option<i32>,
    },
    /// Compute multi-model statistics per scenario
    Stats {
        /// Reduce the baseline-normalized stores instead
        #[arg(long)]
        normalized: bool,
    },
    /// Compute global-mean series and their statistics
    GlobalMean,
    /// Convert a gridded observation file
    Observations {
        /// Observation NetCDF file, overrides the config file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Leading months to drop
        #[arg(long)]
        skip_months: Option<usize>,
    },
    /// Remove stores matching a glob pattern
    Clean {
        /// Pattern over store names, e.g. 'tas_*'
        pattern: String,
    },
    /// Describe a persisted store
    Inspect {
        /// Store name, without the .zarr suffix
        name: String,
    },
    /// List stores whose name starts with a prefix
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
