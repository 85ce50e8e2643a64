//! Parallel processing configuration
//!
//! Sizes Rayon's global thread pool, which every per-cell reduction and the
//! regridder run on.

use crate::errors::{Result, WranglerError};
use rayon::ThreadPoolBuilder;
use tracing::info;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// A configuration that uses every available CPU core
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Set up the global Rayon thread pool
    ///
    /// The global pool can only be built once per process.
    pub fn setup_global_pool(&self) -> Result<()> {
        if let Some(num_threads) = self.num_threads {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("wrangler-{i}"))
                .build_global()
                .map_err(|e| {
                    WranglerError::ThreadPool(format!(
                        "Failed to initialize thread pool with {num_threads} threads: {e}"
                    ))
                })?;
            info!(threads = num_threads, "✅ Configured parallel processing");
        } else {
            info!(threads = rayon::current_num_threads(), "✅ Using default thread pool");
        }
        Ok(())
    }

    pub fn current_threads(&self) -> usize {
        rayon::current_num_threads()
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub physical_cores: usize,
}

impl ParallelInfo {
    pub fn log(&self) {
        info!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            physical_cores = self.physical_cores,
            "📊 Parallel processing information"
        );
    }
}

pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        physical_cores: num_cpus::get_physical(),
    }
}
