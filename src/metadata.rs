//! Store inspection
//!
//! Describes a persisted store (attributes, arrays, shapes, dimensions)
//! without reading any data chunk.

use crate::dataset::Attributes;
use crate::errors::Result;
use crate::store::DatasetStore;
use crate::zarr_io::{ArrayMetadata, ZarrReader, ZarrSource};
use chrono::NaiveDate;

/// Structured description of one store
#[derive(Debug, Clone)]
pub struct StoreDescription {
    pub name: String,
    pub attributes: Attributes,
    pub arrays: Vec<ArrayMetadata>,
    /// First and last canonical time step
    pub time_range: Option<(NaiveDate, NaiveDate)>,
}

impl StoreDescription {
    /// Total number of `f32`/`f64` elements across arrays
    pub fn total_elements(&self) -> usize {
        self.arrays
            .iter()
            .map(|a| a.shape.iter().product::<usize>())
            .sum()
    }

    /// Print the description in a readable layout
    pub fn print(&self) {
        println!("\n===== Store: {} =====", self.name);
        if let Some((first, last)) = self.time_range {
            println!("Time range: {first} .. {last}");
        }

        println!("\n===== Attributes =====");
        for (key, value) in &self.attributes {
            println!("- {key}: {value}");
        }

        println!("\n===== Arrays =====");
        for array in &self.arrays {
            let dims: Vec<String> = array
                .dimensions
                .iter()
                .zip(&array.shape)
                .map(|(d, n)| format!("{d}[{n}]"))
                .collect();
            println!("- {} {} ({})", array.name, array.dtype, dims.join(", "));
            for (key, value) in &array.attributes {
                println!("    {key}: {value}");
            }
        }
        println!("\nTotal elements: {}", self.total_elements());
    }
}

/// Describe the store `name` under `store`
pub fn describe_store(store: &DatasetStore, name: &str) -> Result<StoreDescription> {
    let stored = store.open(name)?;
    let reader: &ZarrReader = stored.reader();
    let arrays = reader
        .list_arrays()?
        .iter()
        .map(|array| reader.metadata(array))
        .collect::<Result<Vec<_>>>()?;
    let time_range = stored.time.first().copied().zip(stored.time.last().copied());
    Ok(StoreDescription {
        name: name.to_string(),
        attributes: stored.attrs.clone(),
        arrays,
        time_range,
    })
}

/// Describe a store directory given by path, outside any store root
pub fn describe_path(path: &std::path::Path) -> Result<StoreDescription> {
    let reader = ZarrReader::open(ZarrSource::new(path))?;
    let arrays = reader
        .list_arrays()?
        .iter()
        .map(|array| reader.metadata(array))
        .collect::<Result<Vec<_>>>()?;
    Ok(StoreDescription {
        name: path.display().to_string(),
        attributes: reader.group_attributes()?,
        arrays,
        time_range: None,
    })
}
