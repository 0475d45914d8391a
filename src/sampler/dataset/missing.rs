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

//! Treatment of missing (NaN) values in an opened dataset.

use super::ArrayDataset;
use crate::errors::SamplerError;
use crate::Float;
use log::{debug, info};
use std::str::FromStr;

/// What to do with missing values.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MissingPolicy {
    /// Replace every missing cell with the fill value.
    Fill,

    /// Remove latitude rows and longitude columns without any value.
    Drop,
}

impl FromStr for MissingPolicy {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fill" => Ok(MissingPolicy::Fill),
            "drop" => Ok(MissingPolicy::Drop),
            other => Err(SamplerError::InvalidArgument(format!(
                "'{}' is not a method for handling missing values, use 'fill' or 'drop'",
                other
            ))),
        }
    }
}

/// Applies `policy` to the dataset and returns the treated dataset.
///
/// Filling is lazy: values are replaced when they are read. Dropping has
/// to look at every value once to find empty rows and columns, which for
/// a remote store means reading the whole store.
pub fn handle_missing(
    dataset: ArrayDataset,
    policy: MissingPolicy,
    fill_value: Float,
) -> Result<ArrayDataset, SamplerError> {
    match policy {
        MissingPolicy::Fill => {
            info!("Filling missing values with {}", fill_value);
            Ok(dataset.with_fill_value(fill_value))
        }
        MissingPolicy::Drop => {
            info!("Dropping latitude rows and longitude columns without values");
            drop_empty_rows_and_columns(dataset)
        }
    }
}

fn drop_empty_rows_and_columns(dataset: ArrayDataset) -> Result<ArrayDataset, SamplerError> {
    let [n_init, n_step, n_channel, n_lat, n_lon] = dataset.shape();
    let all_steps: Vec<usize> = (0..n_step).collect();

    let mut lat_has_value = vec![false; n_lat];
    let mut lon_has_value = vec![false; n_lon];
    let mut missing_cells = 0;

    for init in 0..n_init {
        for channel in 0..n_channel {
            let block = dataset.read_field(init, &all_steps, channel)?;
            missing_cells += count_missing(&block);

            for ((_, lat, lon), value) in block.indexed_iter() {
                if !value.is_nan() {
                    lat_has_value[lat] = true;
                    lon_has_value[lon] = true;
                }
            }
        }
    }

    let dropped_lat = lat_has_value.iter().filter(|&&v| !v).count();
    let dropped_lon = lon_has_value.iter().filter(|&&v| !v).count();
    debug!(
        "Found {} missing cells, dropping {} latitude rows and {} longitude columns",
        missing_cells, dropped_lat, dropped_lon
    );

    Ok(dataset.retain_grid(&lat_has_value, &lon_has_value))
}

/// Counts missing cells of a block.
pub(crate) fn count_missing(block: &ndarray::Array3<Float>) -> usize {
    block.iter().filter(|v| v.is_nan()).count()
}
