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

//! Module cutting one sample out of the dataset for a given `t0`.

use super::bisection::find_left_closest;
use super::configuration::{NwpConfig, T0Alignment};
use super::dataset::{ArrayDataset, Attributes};
use crate::errors::SamplerError;
use crate::Float;
use chrono::{Duration, NaiveDateTime};
use log::debug;
use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

/// Forecast of one init time over the configured window.
///
/// Axes of `values` are `(step, channel, latitude, longitude)`.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Sample {
    pub init_time_utc: NaiveDateTime,

    /// Lead times, stored in files as seconds.
    #[serde(with = "lead_time_seconds")]
    pub step: Vec<Duration>,

    pub channel: Vec<String>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,

    /// Missing cells are written as the string `"NaN"`.
    #[serde(with = "values_with_missing")]
    pub values: Array4<Float>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attributes>,
}

mod values_with_missing {
    use crate::Float;
    use ndarray::Array4;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    /// JSON has no literal for non-finite numbers.
    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Number(Float),
        NonFinite(String),
    }

    #[derive(Serialize, Deserialize)]
    struct Encoded {
        dim: Vec<usize>,
        data: Vec<Cell>,
    }

    pub fn serialize<S: Serializer>(values: &Array4<Float>, serializer: S) -> Result<S::Ok, S::Error> {
        let data = values
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    Cell::Number(v)
                } else {
                    Cell::NonFinite(v.to_string())
                }
            })
            .collect();

        Encoded {
            dim: values.shape().to_vec(),
            data,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array4<Float>, D::Error> {
        let encoded = Encoded::deserialize(deserializer)?;

        let dim: [usize; 4] = encoded
            .dim
            .try_into()
            .map_err(|dim: Vec<usize>| D::Error::custom(format!("expected 4 axes, found {}", dim.len())))?;

        let data = encoded
            .data
            .into_iter()
            .map(|cell| match cell {
                Cell::Number(v) => Ok(v),
                Cell::NonFinite(text) => text
                    .parse::<Float>()
                    .ok()
                    .filter(|v| !v.is_finite())
                    .ok_or_else(|| D::Error::custom(format!("'{}' is not a number", text))),
            })
            .collect::<Result<Vec<Float>, D::Error>>()?;

        Array4::from_shape_vec(dim, data).map_err(D::Error::custom)
    }
}

mod lead_time_seconds {
    use chrono::Duration;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(steps: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let seconds: Vec<i64> = steps.iter().map(Duration::num_seconds).collect();
        seconds.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Duration>, D::Error> {
        let seconds = Vec::<i64>::deserialize(deserializer)?;
        seconds
            .into_iter()
            .map(|s| {
                Duration::try_seconds(s)
                    .ok_or_else(|| D::Error::custom(format!("lead time of {} s is out of range", s)))
            })
            .collect()
    }
}

/// Lead times of the window, relative to `t0`, from the start
/// to the end of the interval inclusive.
pub fn target_offsets(config: &NwpConfig) -> Vec<Duration> {
    let resolution = config.time_resolution_minutes.max(1);

    (config.interval_start_minutes..=config.interval_end_minutes)
        .step_by(resolution as usize)
        .map(Duration::minutes)
        .collect()
}

/// Index of the init time used for `t0`.
fn align(
    dataset: &ArrayDataset,
    t0: NaiveDateTime,
    alignment: T0Alignment,
) -> Result<usize, SamplerError> {
    match alignment {
        T0Alignment::Exact => dataset
            .init_time_index(&t0)
            .ok_or(SamplerError::InitTimeNotFound(t0)),
        T0Alignment::Floor => find_left_closest(dataset.init_times(), &t0)
            .map_err(|_| SamplerError::InitTimeNotFound(t0)),
    }
}

/// Extracts the sample of `t0`.
///
/// Only lead times of the window present in the dataset are kept, so
/// the step axis of the sample is a strictly increasing subset of
/// [`target_offsets`]. Missing ones are skipped without error unless
/// none is left.
pub fn extract(
    dataset: &ArrayDataset,
    config: &NwpConfig,
    t0: NaiveDateTime,
    keep_attrs: bool,
) -> Result<Sample, SamplerError> {
    let init = align(dataset, t0, config.t0_alignment)?;
    let init_time_utc = dataset.init_times()[init];

    let (step, step_indices): (Vec<Duration>, Vec<usize>) = target_offsets(config)
        .into_iter()
        .filter_map(|offset| dataset.step_index(&offset).map(|i| (offset, i)))
        .unzip();

    if step.is_empty() {
        return Err(SamplerError::NoValidSteps(t0));
    }

    let (channel, channel_indices): (Vec<String>, Vec<usize>) = match &config.channels {
        Some(names) => names
            .iter()
            .map(|name| {
                dataset
                    .channel_index(name)
                    .map(|i| (name.clone(), i))
                    .ok_or_else(|| SamplerError::ChannelNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip(),
        None => dataset.channels().iter().cloned().zip(0..).unzip(),
    };

    debug!(
        "Extracting t0 {} from init time {} with {} steps and {} channels",
        t0,
        init_time_utc,
        step.len(),
        channel.len()
    );

    let coords = dataset.coords();
    let mut values = Array4::zeros((
        step.len(),
        channel.len(),
        coords.latitude.len(),
        coords.longitude.len(),
    ));

    for (c, &source_channel) in channel_indices.iter().enumerate() {
        let block = dataset.read_field(init, &step_indices, source_channel)?;
        values.index_axis_mut(Axis(1), c).assign(&block);
    }

    Ok(Sample {
        init_time_utc,
        step,
        channel,
        latitude: coords.latitude.clone(),
        longitude: coords.longitude.clone(),
        values,
        attrs: keep_attrs.then(|| dataset.attrs().clone()),
    })
}
