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

//! Module containing the GFS sampler.
//!
//! Sampling goes through the following steps:
//!
//! 1. The Zarr store is opened with [`dataset::open`], which reads only
//!    coordinates and exposes the data as `(init_time_utc, step, channel,
//!    latitude, longitude)`.
//! 2. Missing values are treated once with [`dataset::handle_missing`].
//! 3. [`GfsDataSampler::new`] resolves the valid initialisation times
//!    (`t0`) within the requested bounds.
//! 4. Each call to [`GfsDataSampler::get`] cuts the forecast window of one
//!    `t0` out of the dataset and normalises it per channel.
//!
//! The sampler is immutable once created and can be shared between
//! threads, which is how the batch loader extracts samples in parallel.

mod bisection;
pub mod configuration;
pub mod dataset;
mod extract;
mod normalise;
mod valid_times;

#[cfg(test)]
mod super_tests;

pub use self::extract::{extract, target_offsets, Sample};
pub use self::normalise::{ChannelStats, NormalisationConstants};
pub use self::valid_times::{resolve, ContiguousInitTimes, TimePeriod, ValidTimeFinder, ValidTimes};

use self::configuration::{Config, NwpConfig};
use self::dataset::ArrayDataset;
use crate::errors::SamplerError;
use chrono::NaiveDateTime;
use log::{debug, info};
use std::sync::Arc;

/// Indexed access to normalised GFS samples.
#[derive(Debug)]
pub struct GfsDataSampler {
    dataset: Arc<ArrayDataset>,
    config: NwpConfig,
    constants: Arc<NormalisationConstants>,
    keep_attrs: bool,
    valid_t0_times: Vec<NaiveDateTime>,
}

impl GfsDataSampler {
    /// Creates a sampler finding valid times with [`ContiguousInitTimes`].
    pub fn new(
        dataset: ArrayDataset,
        config: &Config,
        constants: NormalisationConstants,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
    ) -> Result<Self, SamplerError> {
        GfsDataSampler::with_finder(
            dataset,
            config,
            constants,
            &ContiguousInitTimes,
            start_time,
            end_time,
        )
    }

    pub fn with_finder(
        dataset: ArrayDataset,
        config: &Config,
        constants: NormalisationConstants,
        finder: &dyn ValidTimeFinder,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
    ) -> Result<Self, SamplerError> {
        info!("Initialising GFS sampler");

        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start > end {
                return Err(SamplerError::InvalidArgument(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }

        let nwp_config = config.gfs().clone();
        let valid_t0_times = resolve(&dataset, &nwp_config, finder, start_time, end_time)?;

        info!(
            "Total valid initialisation times after filtering: {}",
            valid_t0_times.len()
        );

        Ok(GfsDataSampler {
            dataset: Arc::new(dataset),
            config: nwp_config,
            constants: Arc::new(constants),
            keep_attrs: config.store.keep_attrs,
            valid_t0_times,
        })
    }

    pub fn len(&self) -> usize {
        self.valid_t0_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid_t0_times.is_empty()
    }

    pub fn valid_t0_times(&self) -> &[NaiveDateTime] {
        &self.valid_t0_times
    }

    pub fn dataset(&self) -> &ArrayDataset {
        &self.dataset
    }

    /// Normalised sample of the `idx`-th valid time.
    pub fn get(&self, idx: usize) -> Result<Sample, SamplerError> {
        let t0 = *self
            .valid_t0_times
            .get(idx)
            .ok_or(SamplerError::IndexOutOfRange {
                index: idx,
                len: self.len(),
            })?;

        debug!("Fetching sample for t0={}", t0);

        let sample = extract(&self.dataset, &self.config, t0, self.keep_attrs)?;
        self.constants.normalize(sample, &self.config.provider)
    }
}
