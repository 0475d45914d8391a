/*
Copyright 2025 Open Data PVNet contributors

This file is part of PVNet Data Sampler.

PVNet Data Sampler is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

PVNet Data Sampler is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with PVNet Data Sampler. If not, see https://www.gnu.org/licenses/.
*/

//! Opening of consolidated Zarr (v2) stores holding GFS forecasts.
//!
//! Every 4-D variable over `(init_time, step, latitude, longitude)` of
//! the store becomes one channel of the dataset. Only coordinates and
//! metadata are read here, values are read lazily by [`ZarrSource`].

use super::cf_time::{decode_datetimes, decode_timedeltas, Numbers};
use super::{ArrayDataset, Attributes, Coordinates, FieldSource};
use crate::constants::{
    INIT_TIME_DIM, LATITUDE_DIM, LEGACY_INIT_TIME_DIM, LONGITUDE_DIM, STEP_DIM,
};
use crate::errors::StoreError;
use crate::sampler::configuration;
use crate::Float;
use log::{debug, info};
use ndarray::{Array3, ArrayD, Axis, Ix3, IxDyn};
use object_store::{aws::AmazonS3Builder, http::HttpBuilder, ObjectStore};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{ReadableStorageTraits, StoreKey};
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

/// Canonical order of the axes of a data variable, channel excluded.
const VARIABLE_DIMS: [&str; 4] = [INIT_TIME_DIM, STEP_DIM, LATITUDE_DIM, LONGITUDE_DIM];

/// Settings for opening a store.
#[derive(Clone, PartialEq, Debug)]
pub struct StoreOptions {
    /// Region of S3 buckets.
    pub region: String,

    /// Keep the store attributes on the dataset.
    pub keep_attrs: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions::from(&configuration::Store::default())
    }
}

impl From<&configuration::Store> for StoreOptions {
    fn from(store: &configuration::Store) -> Self {
        StoreOptions {
            region: store.region.clone(),
            keep_attrs: store.keep_attrs,
        }
    }
}

/// Where a store lives.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StoreLocation {
    Local(PathBuf),

    /// Public S3 bucket, read without credentials.
    S3 { bucket: String, prefix: String },

    Http(String),
}

impl StoreLocation {
    pub fn parse(location: &str) -> Result<StoreLocation, StoreError> {
        let location = location.trim();

        if let Some(rest) = location.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));

            if bucket.is_empty() {
                return Err(StoreError::OpenFailed(format!(
                    "'{}' does not name a bucket",
                    location
                )));
            }

            return Ok(StoreLocation::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }

        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(StoreLocation::Http(location.trim_end_matches('/').to_string()));
        }

        let path = location.strip_prefix("file://").unwrap_or(location);

        if path.is_empty() {
            return Err(StoreError::OpenFailed("store location is empty".to_string()));
        }

        Ok(StoreLocation::Local(PathBuf::from(path)))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Local(path) => write!(f, "{}", path.display()),
            StoreLocation::S3 { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
            StoreLocation::Http(url) => write!(f, "{}", url),
        }
    }
}

/// Drives futures of remote stores from the synchronous sampler workers.
#[derive(Clone)]
struct RuntimeBlockOn(Arc<tokio::runtime::Runtime>);

impl AsyncToSyncBlockOn for RuntimeBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

/// Opens the store at `location` as a lazily read dataset.
pub fn open(location: &str, options: &StoreOptions) -> Result<ArrayDataset, StoreError> {
    let location = StoreLocation::parse(location)?;
    info!("Opening Zarr store at {}", location);

    match &location {
        StoreLocation::Local(path) => {
            let store = open_local(path)?;
            open_store(Arc::new(store), "", options)
        }
        StoreLocation::S3 { bucket, prefix } => {
            let s3 = AmazonS3Builder::new()
                .with_bucket_name(bucket)
                .with_region(&options.region)
                .with_skip_signature(true)
                .build()
                .map_err(|e| StoreError::OpenFailed(format!("cannot create S3 client: {}", e)))?;

            open_store(remote_store(s3)?, prefix, options)
        }
        StoreLocation::Http(url) => {
            let http = HttpBuilder::new()
                .with_url(url)
                .build()
                .map_err(|e| StoreError::OpenFailed(format!("cannot create HTTP client: {}", e)))?;

            open_store(remote_store(http)?, "", options)
        }
    }
}

fn open_local(path: &Path) -> Result<FilesystemStore, StoreError> {
    if !path.is_dir() {
        return Err(StoreError::OpenFailed(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    FilesystemStore::new(path).map_err(|e| StoreError::OpenFailed(e.to_string()))
}

fn remote_store<T: ObjectStore>(
    store: T,
) -> Result<Arc<AsyncToSyncStorageAdapter<AsyncObjectStore<T>, RuntimeBlockOn>>, StoreError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| StoreError::OpenFailed(format!("cannot start I/O runtime: {}", e)))?;

    let async_store = Arc::new(AsyncObjectStore::new(store));
    let block_on = RuntimeBlockOn(Arc::new(runtime));

    Ok(Arc::new(AsyncToSyncStorageAdapter::new(async_store, block_on)))
}

/// Metadata of one array listed in the consolidated metadata.
#[derive(Debug)]
struct VariableMeta {
    dims: Vec<String>,
    attrs: Attributes,
}

/// Paths inside a store, relative to the group holding the dataset.
struct GroupPath<'a> {
    root: &'a str,
}

impl<'a> GroupPath<'a> {
    fn key(&self, name: &str) -> String {
        if self.root.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.root, name)
        }
    }

    fn array(&self, name: &str) -> String {
        format!("/{}", self.key(name))
    }
}

/// Opens the dataset in group `root` of an already created store.
pub(crate) fn open_store<S>(
    store: Arc<S>,
    root: &str,
    options: &StoreOptions,
) -> Result<ArrayDataset, StoreError>
where
    S: ReadableStorageTraits + Send + Sync + 'static,
{
    let group = GroupPath { root };
    let metadata = read_consolidated(store.as_ref(), &group)?;
    let (root_attrs, variables) = parse_consolidated(&metadata)?;

    let (array, meta) = open_coordinate(&store, &group, &variables, INIT_TIME_DIM)?;
    let init_time_utc = decode_datetimes(&read_numbers(&array)?, units(meta, INIT_TIME_DIM)?)?;

    let (array, meta) = open_coordinate(&store, &group, &variables, STEP_DIM)?;
    let step = decode_timedeltas(&read_numbers(&array)?, units(meta, STEP_DIM)?)?;

    let (array, _) = open_coordinate(&store, &group, &variables, LATITUDE_DIM)?;
    let latitude = read_numbers(&array)?.to_f64();

    let (array, _) = open_coordinate(&store, &group, &variables, LONGITUDE_DIM)?;
    let longitude = read_numbers(&array)?.to_f64();

    let mut channel = Vec::new();
    let mut channels = Vec::new();

    for (name, meta) in &variables {
        let axes = match variable_axes(&meta.dims) {
            Some(axes) => axes,
            None => continue,
        };

        let array = Array::open(store.clone(), &group.array(name))
            .map_err(|e| StoreError::OpenFailed(format!("array '{}': {}", name, e)))?;

        let expected = [init_time_utc.len(), step.len(), latitude.len(), longitude.len()];
        let shape = array.shape();
        if (0..4).any(|k| shape[axes[k]] as usize != expected[k]) {
            return Err(StoreError::ShapeMismatch(format!(
                "variable '{}' has shape {:?} which does not match its coordinates",
                name, shape
            )));
        }

        debug!("Variable '{}' with dims {:?} is a channel", name, meta.dims);
        channel.push(name.clone());
        channels.push(ChannelArray { array, axes });
    }

    if channel.is_empty() {
        return Err(StoreError::MissingAxis("channel".to_string()));
    }

    info!(
        "Store has {} init times, {} steps and channels {:?}",
        init_time_utc.len(),
        step.len(),
        channel
    );

    let coords = Coordinates {
        init_time_utc,
        step,
        channel,
        latitude,
        longitude,
    };

    let attrs = if options.keep_attrs {
        root_attrs
    } else {
        Attributes::new()
    };

    ArrayDataset::new(coords, attrs, Arc::new(ZarrSource { channels }))
}

/// Opens the 1-D coordinate array of `dim`.
fn open_coordinate<'v, S>(
    store: &Arc<S>,
    group: &GroupPath,
    variables: &'v BTreeMap<String, VariableMeta>,
    dim: &str,
) -> Result<(Array<S>, &'v VariableMeta), StoreError>
where
    S: ReadableStorageTraits + 'static,
{
    let (name, meta) = variables
        .iter()
        .find(|(_, meta)| meta.dims.len() == 1 && meta.dims[0] == dim)
        .ok_or_else(|| StoreError::MissingAxis(dim.to_string()))?;

    let array = Array::open(store.clone(), &group.array(name))
        .map_err(|e| StoreError::OpenFailed(format!("array '{}': {}", name, e)))?;

    Ok((array, meta))
}

fn read_consolidated<S: ReadableStorageTraits>(
    store: &S,
    group: &GroupPath,
) -> Result<Value, StoreError> {
    let path = group.key(".zmetadata");
    let key = StoreKey::new(path.as_str()).map_err(|e| StoreError::OpenFailed(e.to_string()))?;

    let bytes = store
        .get(&key)
        .map_err(|e| StoreError::OpenFailed(e.to_string()))?
        .ok_or_else(|| {
            StoreError::OpenFailed(format!("store has no consolidated metadata at '{}'", path))
        })?;

    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::OpenFailed(format!("malformed consolidated metadata: {}", e)))
}

/// Splits consolidated metadata into root attributes and top-level arrays.
/// The legacy `init_time` name is renamed to `init_time_utc`.
fn parse_consolidated(
    metadata: &Value,
) -> Result<(Attributes, BTreeMap<String, VariableMeta>), StoreError> {
    let entries = metadata
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            StoreError::OpenFailed("consolidated metadata has no 'metadata' object".to_string())
        })?;

    let root_attrs = entries
        .get(".zattrs")
        .and_then(Value::as_object)
        .map(|attrs| attrs.clone().into_iter().collect())
        .unwrap_or_default();

    let mut variables = BTreeMap::new();

    for key in entries.keys() {
        let name = match key.strip_suffix("/.zarray") {
            Some(name) if !name.contains('/') => name,
            _ => continue,
        };

        let mut attrs: Attributes = entries
            .get(&format!("{}/.zattrs", name))
            .and_then(Value::as_object)
            .map(|attrs| attrs.clone().into_iter().collect())
            .unwrap_or_default();

        let dims = match attrs.remove("_ARRAY_DIMENSIONS") {
            Some(Value::Array(dims)) => dims
                .iter()
                .map(|d| d.as_str().map(rename_dim))
                .collect::<Option<Vec<String>>>()
                .ok_or_else(|| {
                    StoreError::OpenFailed(format!("array '{}' has malformed dimensions", name))
                })?,
            _ => {
                debug!("Skipping array '{}' without dimension names", name);
                continue;
            }
        };

        variables.insert(name.to_string(), VariableMeta { dims, attrs });
    }

    Ok((root_attrs, variables))
}

fn rename_dim(dim: &str) -> String {
    if dim == LEGACY_INIT_TIME_DIM {
        INIT_TIME_DIM.to_string()
    } else {
        dim.to_string()
    }
}

/// Position of each of [`VARIABLE_DIMS`] in `dims`, or `None` when the
/// array is not a data variable.
fn variable_axes(dims: &[String]) -> Option<[usize; 4]> {
    if dims.len() != VARIABLE_DIMS.len() {
        return None;
    }

    let mut axes = [0; 4];
    for (k, name) in VARIABLE_DIMS.iter().enumerate() {
        axes[k] = dims.iter().position(|d| d == name)?;
    }

    Some(axes)
}

fn units<'m>(meta: &'m VariableMeta, dim: &str) -> Result<&'m str, StoreError> {
    meta.attrs
        .get("units")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Time(format!("coordinate '{}' has no units", dim)))
}

fn read_numbers<S: ReadableStorageTraits + 'static>(array: &Array<S>) -> Result<Numbers, StoreError> {
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    let read_err = |e: zarrs::array::ArrayError| StoreError::Read(e.to_string());

    let numbers = match array.data_type() {
        DataType::Int64 => Numbers::Int(
            array
                .retrieve_array_subset_elements::<i64>(&subset)
                .map_err(read_err)?,
        ),
        DataType::Int32 => Numbers::Int(
            array
                .retrieve_array_subset_elements::<i32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(i64::from)
                .collect(),
        ),
        DataType::UInt32 => Numbers::Int(
            array
                .retrieve_array_subset_elements::<u32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(i64::from)
                .collect(),
        ),
        DataType::Float32 => Numbers::Float(
            array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
        ),
        DataType::Float64 => Numbers::Float(
            array
                .retrieve_array_subset_elements::<f64>(&subset)
                .map_err(read_err)?,
        ),
        other => {
            return Err(StoreError::Read(format!(
                "unsupported coordinate data type {:?}",
                other
            )))
        }
    };

    Ok(numbers)
}

struct ChannelArray<S: ReadableStorageTraits> {
    array: Array<S>,

    /// Source axis of init time, step, latitude and longitude.
    axes: [usize; 4],
}

/// [`FieldSource`] reading blocks from the Zarr arrays of each channel.
pub(crate) struct ZarrSource<S: ReadableStorageTraits> {
    channels: Vec<ChannelArray<S>>,
}

impl<S: ReadableStorageTraits> fmt::Debug for ZarrSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZarrSource")
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl<S> FieldSource for ZarrSource<S>
where
    S: ReadableStorageTraits + Send + Sync + 'static,
{
    fn read_block(
        &self,
        init: usize,
        steps: &[usize],
        channel: usize,
    ) -> Result<Array3<Float>, StoreError> {
        let var = self.channels.get(channel).ok_or_else(|| {
            StoreError::Read(format!("channel index {} is out of range", channel))
        })?;

        let source_shape = var.array.shape();
        let (init_axis, step_axis) = (var.axes[0], var.axes[1]);
        let n_lat = source_shape[var.axes[2]] as usize;
        let n_lon = source_shape[var.axes[3]] as usize;

        let (first, last) = match (steps.iter().min(), steps.iter().max()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Ok(Array3::zeros((0, n_lat, n_lon))),
        };

        if init as u64 >= source_shape[init_axis] || last as u64 >= source_shape[step_axis] {
            return Err(StoreError::Read(format!(
                "block (init {}, steps {:?}) is outside of shape {:?}",
                init, steps, source_shape
            )));
        }

        let mut start = vec![0; source_shape.len()];
        let mut shape = source_shape.to_vec();
        start[init_axis] = init as u64;
        shape[init_axis] = 1;
        start[step_axis] = first as u64;
        shape[step_axis] = (last - first + 1) as u64;

        let subset = ArraySubset::new_with_start_shape(start, shape.clone())
            .map_err(|e| StoreError::Read(e.to_string()))?;
        let values = read_values(&var.array, &subset)?;

        let dims: Vec<usize> = shape.iter().map(|&n| n as usize).collect();
        let block = ArrayD::from_shape_vec(IxDyn(&dims), values)
            .map_err(|e| StoreError::ShapeMismatch(e.to_string()))?
            .permuted_axes(IxDyn(&var.axes))
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix3>()
            .map_err(|e| StoreError::ShapeMismatch(e.to_string()))?;

        let relative: Vec<usize> = steps.iter().map(|&s| s - first).collect();

        Ok(block.select(Axis(0), &relative))
    }
}

fn read_values<S: ReadableStorageTraits + 'static>(
    array: &Array<S>,
    subset: &ArraySubset,
) -> Result<Vec<Float>, StoreError> {
    let read_err = |e: zarrs::array::ArrayError| StoreError::Read(e.to_string());

    match array.data_type() {
        DataType::Float32 => Ok(array
            .retrieve_array_subset_elements::<f32>(subset)
            .map_err(read_err)?
            .into_iter()
            .map(|v| v as Float)
            .collect()),
        DataType::Float64 => Ok(array
            .retrieve_array_subset_elements::<f64>(subset)
            .map_err(read_err)?
            .into_iter()
            .map(|v| v as Float)
            .collect()),
        other => Err(StoreError::Read(format!(
            "unsupported variable data type {:?}",
            other
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::{value, write_gfs_store};
    use super::{open, StoreLocation, StoreOptions};
    use crate::constants::NWP_DIMS;
    use crate::errors::StoreError;
    use crate::sampler::dataset::testing::datetime;
    use chrono::Duration;
    use std::path::PathBuf;

    #[test]
    fn locations_are_parsed() {
        assert_eq!(
            StoreLocation::parse("s3://ocf-open-data-pvnet/data/gfs.zarr").unwrap(),
            StoreLocation::S3 {
                bucket: "ocf-open-data-pvnet".to_string(),
                prefix: "data/gfs.zarr".to_string()
            }
        );
        assert_eq!(
            StoreLocation::parse("https://example.org/gfs.zarr/").unwrap(),
            StoreLocation::Http("https://example.org/gfs.zarr".to_string())
        );
        assert_eq!(
            StoreLocation::parse("file:///data/gfs.zarr").unwrap(),
            StoreLocation::Local(PathBuf::from("/data/gfs.zarr"))
        );
        assert_eq!(
            StoreLocation::parse("data/gfs.zarr").unwrap(),
            StoreLocation::Local(PathBuf::from("data/gfs.zarr"))
        );
        assert!(StoreLocation::parse("s3:///gfs.zarr").is_err());
        assert!(StoreLocation::parse("").is_err());
    }

    #[test]
    fn opens_store_in_canonical_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gfs.zarr");
        write_gfs_store(&path);

        let ds = open(path.to_str().unwrap(), &StoreOptions::default()).unwrap();

        assert_eq!(ds.dims(), NWP_DIMS);
        assert_eq!(ds.shape(), [2, 3, 2, 2, 3]);
        assert_eq!(ds.init_times(), &[datetime(2023, 1, 1, 0), datetime(2023, 1, 1, 6)]);
        assert_eq!(ds.steps(), &[Duration::hours(0), Duration::hours(3), Duration::hours(6)]);
        assert_eq!(ds.channels(), &["t".to_string(), "u10".to_string()]);
        assert_eq!(ds.coords().latitude, vec![52.0, 51.0]);
        assert_eq!(
            ds.attrs().get("description"),
            Some(&serde_json::json!("GFS test archive"))
        );
    }

    #[test]
    fn reads_blocks_of_both_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gfs.zarr");
        write_gfs_store(&path);

        let ds = open(path.to_str().unwrap(), &StoreOptions::default()).unwrap();

        let t = ds.read_field(1, &[0, 2], 0).unwrap();
        assert_eq!(t.shape(), &[2, 2, 3]);
        assert_eq!(t[[0, 1, 2]], value(0, 1, 0, 1, 2));
        assert!(t[[1, 0, 0]].is_nan());

        let u10 = ds.read_field(0, &[1], 1).unwrap();
        assert_eq!(u10.shape(), &[1, 2, 3]);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(u10[[0, y, x]], value(1, 0, 1, y, x));
            }
        }
    }

    #[test]
    fn attributes_can_be_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gfs.zarr");
        write_gfs_store(&path);

        let options = StoreOptions {
            keep_attrs: false,
            ..StoreOptions::default()
        };
        let ds = open(path.to_str().unwrap(), &options).unwrap();

        assert!(ds.attrs().is_empty());
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing.zarr");

        let result = open(path.to_str().unwrap(), &StoreOptions::default());

        assert!(matches!(result, Err(StoreError::OpenFailed(_))));
    }

    #[test]
    fn store_without_consolidated_metadata_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gfs.zarr");
        write_gfs_store(&path);
        std::fs::remove_file(path.join(".zmetadata")).unwrap();

        let result = open(path.to_str().unwrap(), &StoreOptions::default());

        assert!(matches!(result, Err(StoreError::OpenFailed(_))));
    }
}
