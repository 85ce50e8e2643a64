//! Two-phase access to datasets
//!
//! Handles are cheap to create and hold only locations and metadata; the
//! array payload is read when [`LazyDataReader::load`] is called. Catalog
//! entries and persisted stores both follow this pattern.

use crate::errors::Result;

/// A handle whose data is materialized on demand
pub trait LazyDataReader {
    /// In-memory form produced by `load`
    type Output;

    /// Short human-readable identity used in log lines
    fn describe(&self) -> String;

    /// Perform the I/O and return the materialized dataset
    fn load(&self) -> Result<Self::Output>;
}

/// Materialize every handle, stopping at the first failure
pub fn load_all<R: LazyDataReader>(readers: &[R]) -> Result<Vec<R::Output>> {
    readers.iter().map(LazyDataReader::load).collect()
}
