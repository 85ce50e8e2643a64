//! Zarr v3 I/O operations
//!
//! Thin synchronous layer over `zarrs`: one store directory per dataset,
//! a root group carrying the dataset attributes, 1-D `f64` coordinate
//! arrays and `f32` data arrays. Each array records its dimension names in
//! `_ARRAY_DIMENSIONS`.

use crate::dataset::Attributes;
use crate::errors::{Result, WranglerError};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

/// Attribute listing the dimension names of an array
pub const DIMENSIONS_ATTRIBUTE: &str = "_ARRAY_DIMENSIONS";

const NODE_METADATA_FILE: &str = "zarr.json";

/// Local Zarr store location
#[derive(Debug, Clone)]
pub struct ZarrSource {
    pub path: PathBuf,
}

impl ZarrSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open_store(&self) -> Result<Arc<FilesystemStore>> {
        Ok(Arc::new(
            FilesystemStore::new(&self.path).map_err(WranglerError::zarr)?,
        ))
    }
}

/// Array-level metadata, read without touching chunk data
#[derive(Debug, Clone)]
pub struct ArrayMetadata {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
}

/// Writer for a new store
pub struct ZarrWriter {
    store: Arc<FilesystemStore>,
}

impl ZarrWriter {
    /// Create the store directory and its root group
    pub fn create(source: &ZarrSource, attributes: Attributes) -> Result<Self> {
        std::fs::create_dir_all(&source.path)?;
        let store = source.open_store()?;
        let group = GroupBuilder::new()
            .attributes(attributes)
            .build(store.clone(), "/")
            .map_err(WranglerError::zarr)?;
        group.store_metadata().map_err(WranglerError::zarr)?;
        Ok(Self { store })
    }

    /// Write a 1-D `f64` coordinate array in a single chunk
    pub fn write_coordinate(&self, name: &str, values: &[f64], mut attributes: Attributes) -> Result<()> {
        attributes.insert(DIMENSIONS_ATTRIBUTE.to_string(), json!([name]));
        let len = values.len() as u64;
        let array = ArrayBuilder::new(
            vec![len],
            DataType::Float64,
            vec![len.max(1)].try_into().map_err(WranglerError::zarr)?,
            FillValue::from(f64::NAN),
        )
        .attributes(attributes)
        .build(self.store.clone(), &node_path(name))
        .map_err(WranglerError::zarr)?;
        array.store_metadata().map_err(WranglerError::zarr)?;

        let subset = ArraySubset::new_with_start_shape(vec![0], vec![len]).map_err(WranglerError::zarr)?;
        array
            .store_array_subset_elements(&subset, values)
            .map_err(WranglerError::zarr)?;
        Ok(())
    }

    /// Write an `f32` array given in C order
    pub fn write_field(
        &self,
        name: &str,
        shape: &[usize],
        chunks: &[usize],
        dimensions: &[&str],
        data: &[f32],
        mut attributes: Attributes,
    ) -> Result<()> {
        let expected: usize = shape.iter().product();
        if data.len() != expected || dimensions.len() != shape.len() || chunks.len() != shape.len() {
            return Err(WranglerError::ShapeMismatch {
                name: name.to_string(),
                expected: shape.to_vec(),
                found: vec![data.len()],
            });
        }
        attributes.insert(DIMENSIONS_ATTRIBUTE.to_string(), json!(dimensions));

        let shape_u64: Vec<u64> = shape.iter().map(|&s| s as u64).collect();
        let chunks_u64: Vec<u64> = chunks.iter().map(|&c| c.max(1) as u64).collect();
        let array = ArrayBuilder::new(
            shape_u64.clone(),
            DataType::Float32,
            chunks_u64.try_into().map_err(WranglerError::zarr)?,
            FillValue::from(f32::NAN),
        )
        .attributes(attributes)
        .build(self.store.clone(), &node_path(name))
        .map_err(WranglerError::zarr)?;
        array.store_metadata().map_err(WranglerError::zarr)?;

        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape_u64)
            .map_err(WranglerError::zarr)?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(WranglerError::zarr)?;

        debug!(array = name, shape = ?shape, chunks = ?chunks, "✏️ Wrote array");
        Ok(())
    }
}

/// Reader for an existing store
pub struct ZarrReader {
    source: ZarrSource,
    store: Arc<FilesystemStore>,
}

impl ZarrReader {
    pub fn open(source: ZarrSource) -> Result<Self> {
        if !source.path.join(NODE_METADATA_FILE).is_file() {
            return Err(WranglerError::Zarr(format!(
                "{} is not a Zarr v3 store",
                source.path.display()
            )));
        }
        let store = source.open_store()?;
        Ok(Self { source, store })
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// Root group attributes
    pub fn group_attributes(&self) -> Result<Attributes> {
        let group = Group::open(self.store.clone(), "/").map_err(WranglerError::zarr)?;
        Ok(group.attributes().clone())
    }

    /// Names of the arrays directly under the root group, sorted
    pub fn list_arrays(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.source.path)? {
            let entry = entry?;
            if entry.path().join(NODE_METADATA_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.source.path.join(name).join(NODE_METADATA_FILE).is_file()
    }

    fn open_array(&self, name: &str) -> Result<Array<FilesystemStore>> {
        if !self.contains(name) {
            return Err(WranglerError::VariableNotFound {
                var: name.to_string(),
                source_name: self.source.path.display().to_string(),
            });
        }
        Array::open(self.store.clone(), &node_path(name)).map_err(WranglerError::zarr)
    }

    pub fn metadata(&self, name: &str) -> Result<ArrayMetadata> {
        let array = self.open_array(name)?;
        let attributes = array.attributes().clone();
        let dimensions = attributes
            .get(DIMENSIONS_ATTRIBUTE)
            .and_then(|v| v.as_array())
            .map(|dims| {
                dims.iter()
                    .filter_map(|d| d.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ArrayMetadata {
            name: name.to_string(),
            shape: array.shape().iter().map(|&s| s as usize).collect(),
            dtype: format!("{:?}", array.data_type()),
            dimensions,
            attributes,
        })
    }

    /// Read a whole `f64` array
    pub fn read_f64(&self, name: &str) -> Result<Vec<f64>> {
        let array = self.open_array(name)?;
        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(WranglerError::zarr)
    }

    /// Read the `f32` hyper-rectangle starting at `start` with extent `shape`
    pub fn read_f32_subset(&self, name: &str, start: &[usize], shape: &[usize]) -> Result<Vec<f32>> {
        let array = self.open_array(name)?;
        let full = array.shape();
        let in_bounds = start.len() == full.len()
            && shape.len() == full.len()
            && start
                .iter()
                .zip(shape)
                .zip(full)
                .all(|((&s, &n), &f)| (s + n) as u64 <= f);
        if !in_bounds {
            return Err(WranglerError::ShapeMismatch {
                name: name.to_string(),
                expected: full.iter().map(|&f| f as usize).collect(),
                found: start.iter().zip(shape).map(|(s, n)| s + n).collect(),
            });
        }
        let subset = ArraySubset::new_with_start_shape(
            start.iter().map(|&s| s as u64).collect(),
            shape.iter().map(|&n| n as u64).collect(),
        )
        .map_err(WranglerError::zarr)?;
        array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(WranglerError::zarr)
    }
}

fn node_path(name: &str) -> String {
    format!("/{name}")
}
