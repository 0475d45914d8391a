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

//! Module responsible for holding the opened NWP dataset
//! and providing its values to the sample extractor.
//!
//! The dataset always exposes five axes in the order
//! `(init_time_utc, step, channel, latitude, longitude)`.
//! Values are not kept in memory: they are read block by block
//! from a [`FieldSource`] when a sample asks for them, so opening
//! a multi-year remote store only costs the coordinate reads.

mod cf_time;
mod missing;
mod store;

pub use self::cf_time::{decode_datetimes, decode_timedeltas, Numbers};
pub use self::missing::{handle_missing, MissingPolicy};
pub use self::store::{open, StoreLocation, StoreOptions};

#[cfg(test)]
pub(crate) use self::store::fixture as store_fixture;

use crate::constants::{
    CHANNEL_DIM, INIT_TIME_DIM, LATITUDE_DIM, LONGITUDE_DIM, NWP_DIMS, STEP_DIM,
};
use crate::errors::StoreError;
use crate::Float;
use chrono::{Duration, NaiveDateTime};
use ndarray::{s, Array3, Array5, Axis};
use rustc_hash::FxHashMap;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Free-form metadata carried over from the store.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Lazy provider of dataset values.
///
/// Implementations must be safe to read from many workers at once,
/// they are shared read-only between all sampler threads.
pub trait FieldSource: Send + Sync + fmt::Debug {
    /// Reads one init time, the listed step indices and one channel
    /// over the full source grid. The returned array has axes
    /// `(step, latitude, longitude)` with steps in the requested order.
    fn read_block(
        &self,
        init: usize,
        steps: &[usize],
        channel: usize,
    ) -> Result<Array3<Float>, StoreError>;
}

/// [`FieldSource`] backed by an array already in memory,
/// with axes in canonical order.
#[derive(Debug)]
pub struct MemorySource {
    values: Array5<Float>,
}

impl MemorySource {
    pub fn new(values: Array5<Float>) -> Self {
        MemorySource { values }
    }
}

impl FieldSource for MemorySource {
    fn read_block(
        &self,
        init: usize,
        steps: &[usize],
        channel: usize,
    ) -> Result<Array3<Float>, StoreError> {
        let shape = self.values.shape();

        if init >= shape[0] || channel >= shape[2] || steps.iter().any(|&s| s >= shape[1]) {
            return Err(StoreError::Read(format!(
                "block (init {}, steps {:?}, channel {}) is outside of shape {:?}",
                init, steps, channel, shape
            )));
        }

        let field = self.values.slice(s![init, .., channel, .., ..]);

        Ok(field.select(Axis(0), steps))
    }
}

/// Coordinate labels of all five axes.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Coordinates {
    pub init_time_utc: Vec<NaiveDateTime>,
    pub step: Vec<Duration>,
    pub channel: Vec<String>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
}

/// The opened NWP dataset.
///
/// Apart from the one missing-value pass done right after opening
/// (see [`handle_missing`]) the dataset is never modified, samplers
/// keep it behind an `Arc` for their whole lifetime.
#[derive(Clone, Debug)]
pub struct ArrayDataset {
    coords: Coordinates,
    attrs: Attributes,
    source: Arc<dyn FieldSource>,
    step_lookup: FxHashMap<i64, usize>,
    channel_lookup: FxHashMap<String, usize>,
    lat_selection: Vec<usize>,
    lon_selection: Vec<usize>,
    fill_value: Option<Float>,
}

impl ArrayDataset {
    /// Creates a dataset over `source`, checking that the coordinates
    /// describe a usable 5-axis array.
    pub fn new(
        coords: Coordinates,
        attrs: Attributes,
        source: Arc<dyn FieldSource>,
    ) -> Result<Self, StoreError> {
        if coords.channel.is_empty() {
            return Err(StoreError::MissingAxis(CHANNEL_DIM.to_string()));
        }

        check_increasing(&coords.init_time_utc, INIT_TIME_DIM)?;
        check_increasing(&coords.step, STEP_DIM)?;

        let step_lookup = coords
            .step
            .iter()
            .enumerate()
            .map(|(i, step)| (step.num_seconds(), i))
            .collect();

        let channel_lookup = coords
            .channel
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let lat_selection = (0..coords.latitude.len()).collect();
        let lon_selection = (0..coords.longitude.len()).collect();

        Ok(ArrayDataset {
            coords,
            attrs,
            source,
            step_lookup,
            channel_lookup,
            lat_selection,
            lon_selection,
            fill_value: None,
        })
    }

    /// Creates a dataset from values held in memory.
    pub fn from_array(
        coords: Coordinates,
        attrs: Attributes,
        values: Array5<Float>,
    ) -> Result<Self, StoreError> {
        let expected = [
            coords.init_time_utc.len(),
            coords.step.len(),
            coords.channel.len(),
            coords.latitude.len(),
            coords.longitude.len(),
        ];

        if values.shape() != expected {
            return Err(StoreError::ShapeMismatch(format!(
                "values have shape {:?} but coordinates describe {:?}",
                values.shape(),
                expected
            )));
        }

        ArrayDataset::new(coords, attrs, Arc::new(MemorySource::new(values)))
    }

    /// Axis names, always in canonical order.
    pub fn dims(&self) -> [&'static str; 5] {
        NWP_DIMS
    }

    pub fn shape(&self) -> [usize; 5] {
        [
            self.coords.init_time_utc.len(),
            self.coords.step.len(),
            self.coords.channel.len(),
            self.coords.latitude.len(),
            self.coords.longitude.len(),
        ]
    }

    pub fn coords(&self) -> &Coordinates {
        &self.coords
    }

    pub fn init_times(&self) -> &[NaiveDateTime] {
        &self.coords.init_time_utc
    }

    pub fn steps(&self) -> &[Duration] {
        &self.coords.step
    }

    pub fn channels(&self) -> &[String] {
        &self.coords.channel
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn fill_value(&self) -> Option<Float> {
        self.fill_value
    }

    /// Index of an init time, if present.
    pub fn init_time_index(&self, init_time: &NaiveDateTime) -> Option<usize> {
        self.coords.init_time_utc.binary_search(init_time).ok()
    }

    /// Index of a lead time, if present.
    pub fn step_index(&self, step: &Duration) -> Option<usize> {
        self.step_lookup.get(&step.num_seconds()).copied()
    }

    pub fn channel_index(&self, channel: &str) -> Option<usize> {
        self.channel_lookup.get(channel).copied()
    }

    /// Reads values with the missing-value treatment applied.
    /// Axes of the result are `(step, latitude, longitude)`.
    pub fn read_field(
        &self,
        init: usize,
        steps: &[usize],
        channel: usize,
    ) -> Result<Array3<Float>, StoreError> {
        let mut block = self.source.read_block(init, steps, channel)?;

        let full_lat = self.lat_selection.len() == block.len_of(Axis(1));
        let full_lon = self.lon_selection.len() == block.len_of(Axis(2));

        if !full_lat {
            block = block.select(Axis(1), &self.lat_selection);
        }
        if !full_lon {
            block = block.select(Axis(2), &self.lon_selection);
        }

        if let Some(fill) = self.fill_value {
            block.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }

        Ok(block)
    }

    /// Filled cells stop being missing, so only the first fill counts.
    pub(super) fn with_fill_value(mut self, fill_value: Float) -> Self {
        if self.fill_value.is_none() {
            self.fill_value = Some(fill_value);
        }
        self
    }

    /// Keeps the latitude rows and longitude columns flagged `true`.
    pub(super) fn retain_grid(mut self, keep_lat: &[bool], keep_lon: &[bool]) -> Self {
        let (lat_selection, latitude) = retain(&self.lat_selection, &self.coords.latitude, keep_lat);
        let (lon_selection, longitude) =
            retain(&self.lon_selection, &self.coords.longitude, keep_lon);

        self.lat_selection = lat_selection;
        self.lon_selection = lon_selection;
        self.coords.latitude = latitude;
        self.coords.longitude = longitude;

        self
    }
}

fn retain(selection: &[usize], labels: &[f64], keep: &[bool]) -> (Vec<usize>, Vec<f64>) {
    selection
        .iter()
        .zip(labels)
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|((&i, &label), _)| (i, label))
        .unzip()
}

fn check_increasing<T: PartialOrd>(values: &[T], axis: &str) -> Result<(), StoreError> {
    if values.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(StoreError::ShapeMismatch(format!(
            "'{}' values must be strictly increasing",
            axis
        )));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic datasets shared by tests of the sampler modules.

    use super::{ArrayDataset, Attributes, Coordinates};
    use crate::Float;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use ndarray::Array5;

    pub fn datetime(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    /// Four 6-hourly init times from 2023-01-01 00:00, steps every
    /// 3 hours up to 18 hours, channels `t` and `u10`, a 3x4 grid.
    ///
    /// Values encode their position: `init*10000 + step*100 + channel*10 + lat + lon`.
    pub fn coords() -> Coordinates {
        Coordinates {
            init_time_utc: (0..4).map(|i| datetime(2023, 1, 1, 0) + Duration::hours(6 * i)).collect(),
            step: (0..7).map(|i| Duration::hours(3 * i)).collect(),
            channel: vec!["t".to_string(), "u10".to_string()],
            latitude: vec![52.0, 51.5, 51.0],
            longitude: vec![-1.0, -0.5, 0.0, 0.5],
        }
    }

    pub fn values(coords: &Coordinates) -> Array5<Float> {
        let shape = (
            coords.init_time_utc.len(),
            coords.step.len(),
            coords.channel.len(),
            coords.latitude.len(),
            coords.longitude.len(),
        );

        Array5::from_shape_fn(shape, |(i, s, c, y, x)| {
            (i * 10000 + s * 100 + c * 10 + y + x) as Float
        })
    }

    pub fn dataset() -> ArrayDataset {
        let coords = coords();
        let values = values(&coords);
        let mut attrs = Attributes::new();
        attrs.insert("source".to_string(), serde_json::json!("synthetic"));

        ArrayDataset::from_array(coords, attrs, values).unwrap()
    }
}
