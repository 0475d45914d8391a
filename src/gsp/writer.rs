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

//! Writing of a [`GspDataset`] as a Zarr v3 store.
//!
//! One group with a 1-D array per coordinate and a `(gsp_id, datetime_gmt)`
//! array per variable. Axes are named both in the v3 `dimension_names`
//! and in the `_ARRAY_DIMENSIONS` attribute read by older xarray.

use super::table::GspDataset;
use crate::constants::{GSP_CHUNKS, GSP_DATETIME_COLUMN, GSP_ID_COLUMN, GSP_TIME_UNITS};
use crate::errors::GspError;
use chrono::NaiveDateTime;
use log::debug;
use serde_json::{json, Map, Value};
use std::{fs, path::Path, sync::Arc};
use zarrs::array::{ArrayBuilder, ChunkGrid, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

fn write_error<E: std::fmt::Display>(e: E) -> GspError {
    GspError::Write(e.to_string())
}

/// Whole seconds since 1970-01-01 00:00:00.
fn encode_times(times: &[NaiveDateTime]) -> Vec<i64> {
    let epoch = NaiveDateTime::default();
    times
        .iter()
        .map(|t| t.signed_duration_since(epoch).num_seconds())
        .collect()
}

/// Writes one array in a single call over its full extent.
#[allow(clippy::too_many_arguments)]
fn write_array<T: zarrs::array::Element>(
    store: &Arc<FilesystemStore>,
    name: &str,
    shape: Vec<u64>,
    chunks: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
    dims: &[&str],
    mut attrs: Map<String, Value>,
    elements: &[T],
) -> Result<(), GspError> {
    let chunk_grid: ChunkGrid = chunks
        .try_into()
        .map_err(|e| GspError::Write(format!("{:?}", e)))?;

    attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(dims));

    let path = format!("/{}", name);
    let array = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value)
        .dimension_names(Some(dims.iter().copied()))
        .attributes(attrs)
        .build(store.clone(), &path)
        .map_err(write_error)?;

    array.store_metadata().map_err(write_error)?;

    let subset = ArraySubset::new_with_shape(shape);
    array
        .store_array_subset_elements(&subset, elements)
        .map_err(write_error)?;

    debug!("Wrote array {}", name);

    Ok(())
}

/// Writes `dataset` to `path`, replacing anything already there.
pub fn write_gsp_zarr(dataset: &GspDataset, path: &Path) -> Result<(), GspError> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;

    let store = Arc::new(FilesystemStore::new(path).map_err(write_error)?);

    let mut root_attrs = Map::new();
    root_attrs.insert(
        "title".to_string(),
        json!("Combined PVLive generation per GSP"),
    );
    GroupBuilder::new()
        .attributes(root_attrs)
        .build(store.clone(), "/")
        .map_err(write_error)?
        .store_metadata()
        .map_err(write_error)?;

    let n_gsp = dataset.gsp_id.len() as u64;
    let n_time = dataset.datetime_gmt.len() as u64;

    let gsp_ids: Vec<i64> = dataset.gsp_id.iter().map(|&g| i64::from(g)).collect();
    write_array(
        &store,
        GSP_ID_COLUMN,
        vec![n_gsp],
        vec![n_gsp.max(1)],
        DataType::Int64,
        FillValue::from(0i64),
        &[GSP_ID_COLUMN],
        Map::new(),
        &gsp_ids,
    )?;

    let mut time_attrs = Map::new();
    time_attrs.insert("units".to_string(), json!(GSP_TIME_UNITS));
    time_attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
    write_array(
        &store,
        GSP_DATETIME_COLUMN,
        vec![n_time],
        vec![GSP_CHUNKS.1],
        DataType::Int64,
        FillValue::from(0i64),
        &[GSP_DATETIME_COLUMN],
        time_attrs,
        &encode_times(&dataset.datetime_gmt),
    )?;

    for (name, values) in &dataset.variables {
        let elements: Vec<f64> = values.iter().copied().collect();

        write_array(
            &store,
            name,
            vec![n_gsp, n_time],
            vec![GSP_CHUNKS.0, GSP_CHUNKS.1],
            DataType::Float64,
            FillValue::from(f64::NAN),
            &[GSP_ID_COLUMN, GSP_DATETIME_COLUMN],
            Map::new(),
            &elements,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::write_gsp_zarr;
    use crate::constants::GSP_TIME_UNITS;
    use crate::gsp::table::testing::five_rows;
    use crate::gsp::GspDataset;
    use crate::sampler::dataset::{decode_datetimes, Numbers};
    use std::sync::Arc;
    use zarrs::array::Array;
    use zarrs::array_subset::ArraySubset;
    use zarrs_filesystem::FilesystemStore;

    #[test]
    fn written_store_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.zarr");
        let dataset = GspDataset::from_table(&five_rows()).unwrap();

        write_gsp_zarr(&dataset, &path).unwrap();

        let store = Arc::new(FilesystemStore::new(&path).unwrap());

        let generation = Array::open(store.clone(), "/generation_mw").unwrap();
        assert_eq!(generation.shape(), &[1, 5]);
        let values = generation
            .retrieve_array_subset_elements::<f64>(&ArraySubset::new_with_shape(vec![1, 5]))
            .unwrap();
        assert_eq!(values, vec![100.0, 110.0, 120.0, 115.0, 105.0]);

        let times = Array::open(store.clone(), "/datetime_gmt").unwrap();
        let seconds = times
            .retrieve_array_subset_elements::<i64>(&ArraySubset::new_with_shape(vec![5]))
            .unwrap();
        assert_eq!(
            decode_datetimes(&Numbers::Int(seconds), GSP_TIME_UNITS).unwrap(),
            dataset.datetime_gmt
        );

        let metadata: serde_json::Value = serde_json::from_slice(
            &std::fs::read(path.join("generation_mw").join("zarr.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            metadata["chunk_grid"]["configuration"]["chunk_shape"],
            serde_json::json!([1, 1000])
        );
        assert_eq!(
            metadata["dimension_names"],
            serde_json::json!(["gsp_id", "datetime_gmt"])
        );
        assert_eq!(
            metadata["attributes"]["_ARRAY_DIMENSIONS"],
            serde_json::json!(["gsp_id", "datetime_gmt"])
        );

        let time_metadata: serde_json::Value = serde_json::from_slice(
            &std::fs::read(path.join("datetime_gmt").join("zarr.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(time_metadata["dimension_names"], serde_json::json!(["datetime_gmt"]));
        assert_eq!(time_metadata["attributes"]["units"], serde_json::json!(GSP_TIME_UNITS));
    }

    #[test]
    fn existing_store_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.zarr");
        std::fs::create_dir_all(path.join("stale")).unwrap();

        let dataset = GspDataset::from_table(&five_rows()).unwrap();
        write_gsp_zarr(&dataset, &path).unwrap();

        assert!(!path.join("stale").exists());
        assert!(path.join("zarr.json").is_file());
        assert!(path.join("capacity_mwp").join("zarr.json").is_file());
    }
}
