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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses [YAML](https://en.wikipedia.org/wiki/YAML)
//! and `serde` to enforce strong typing, so a missing or mistyped field
//! is reported when the file is loaded and not on first use.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside the configuration file so you can check this
//! documentation for more details how to set it.

use super::dataset::MissingPolicy;
use crate::constants::MAX_WINDOW_MINUTES;
use crate::errors::{ConfigError, SamplerError};
use crate::Float;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// How a requested `t0` is matched against the init times of the dataset.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum T0Alignment {
    /// `t0` must be one of the dataset init times.
    Exact,

    /// `t0` is moved back to the latest init time at or before it.
    Floor,
}

impl Default for T0Alignment {
    fn default() -> Self {
        T0Alignment::Exact
    }
}

/// Fields describing one NWP source and the forecast window
/// cut from it for every sample.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct NwpConfig {
    /// _(Optional)_ Location of the Zarr store. Can be overridden
    /// from the command line.
    #[serde(default)]
    pub zarr_path: Option<String>,

    /// Name of the normalisation table used for this source.
    pub provider: String,

    /// Start of the window (in minutes) relative to `t0`.
    pub interval_start_minutes: i64,

    /// End of the window (in minutes) relative to `t0`, inclusive.
    ///
    /// Cannot be smaller than `interval_start_minutes`.
    pub interval_end_minutes: i64,

    /// Spacing (in minutes) of the lead times inside the window.
    ///
    /// Must be greater than `0`.
    pub time_resolution_minutes: i64,

    /// _(Optional)_ Longest gap (in minutes) between two init times
    /// that still belong to one contiguous period.
    ///
    /// Defaults to `0`. Cannot be negative.
    #[serde(default)]
    pub max_staleness_minutes: i64,

    /// _(Optional)_ Channels to keep in samples, in this order.
    /// All channels of the dataset are used when absent.
    #[serde(default)]
    pub channels: Option<Vec<String>>,

    /// _(Optional)_ Matching of `t0` against init times.
    ///
    /// Defaults to `exact`.
    #[serde(default)]
    pub t0_alignment: T0Alignment,
}

impl NwpConfig {
    /// Checks if the window settings are consistent.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::OutOfBounds("Provider name cannot be empty"));
        }

        let minutes = [
            self.interval_start_minutes,
            self.interval_end_minutes,
            self.time_resolution_minutes,
            self.max_staleness_minutes,
        ];
        if minutes.iter().any(|m| m.unsigned_abs() > MAX_WINDOW_MINUTES.unsigned_abs()) {
            return Err(ConfigError::OutOfBounds(
                "Window minutes cannot exceed ten years",
            ));
        }

        if self.time_resolution_minutes <= 0 {
            return Err(ConfigError::OutOfBounds(
                "Time resolution must be greater than 0 minutes",
            ));
        }

        if self.interval_end_minutes < self.interval_start_minutes {
            return Err(ConfigError::OutOfBounds(
                "Interval end cannot be earlier than interval start",
            ));
        }

        if self.max_staleness_minutes < 0 {
            return Err(ConfigError::OutOfBounds(
                "Maximum staleness cannot be negative",
            ));
        }

        if let Some(channels) = &self.channels {
            if channels.is_empty() {
                return Err(ConfigError::OutOfBounds(
                    "Channel list cannot be empty when provided",
                ));
            }
        }

        Ok(())
    }
}

/// NWP sources keyed by their name.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Nwp {
    pub gfs: NwpConfig,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct InputData {
    pub nwp: Nwp,
}

/// _(Optional)_ Treatment of missing values applied once after opening.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct MissingValues {
    /// `fill` or `drop`. Defaults to `fill`.
    #[serde(default = "MissingValues::default_policy")]
    pub policy: String,

    /// Value replacing missing cells under the `fill` policy.
    ///
    /// Defaults to `0.0`.
    #[serde(default)]
    pub fill_value: Float,
}

impl MissingValues {
    fn default_policy() -> String {
        "fill".to_string()
    }

    pub fn policy(&self) -> Result<MissingPolicy, SamplerError> {
        self.policy.parse()
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        self.policy()
            .map_err(|err| ConfigError::InvalidArgument(err.to_string()))?;

        if !self.fill_value.is_finite() {
            return Err(ConfigError::OutOfBounds("Fill value must be finite"));
        }

        Ok(())
    }
}

impl Default for MissingValues {
    fn default() -> Self {
        MissingValues {
            policy: MissingValues::default_policy(),
            fill_value: 0.0,
        }
    }
}

/// _(Optional)_ Source of normalisation constants.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct Normalisation {
    /// YAML file with `provider -> channel -> {mean, std}` entries.
    /// The built-in GFS table is used when absent.
    #[serde(default)]
    pub constants_file: Option<PathBuf>,
}

/// _(Optional)_ Settings for opening the array store.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Store {
    /// Region of the public S3 bucket. Defaults to `us-east-1`.
    #[serde(default = "Store::default_region")]
    pub region: String,

    /// Keep store attributes on the dataset and copy them into samples.
    ///
    /// Defaults to `true`.
    #[serde(default = "Store::default_keep_attrs")]
    pub keep_attrs: bool,
}

impl Store {
    fn default_region() -> String {
        "us-east-1".to_string()
    }

    fn default_keep_attrs() -> bool {
        true
    }
}

impl Default for Store {
    fn default() -> Self {
        Store {
            region: Store::default_region(),
            keep_attrs: Store::default_keep_attrs(),
        }
    }
}

/// _(Optional)_ Batching of samples written to disk.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Batching {
    /// Samples per batch file. Defaults to `4`, cannot be less than `1`.
    #[serde(default = "Batching::default_batch_size")]
    pub batch_size: usize,

    /// Shuffle sample order before batching. Defaults to `true`.
    #[serde(default = "Batching::default_shuffle")]
    pub shuffle: bool,

    /// _(Optional)_ Seed making the shuffled order reproducible.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Batching {
    fn default_batch_size() -> usize {
        4
    }

    fn default_shuffle() -> bool {
        true
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.batch_size < 1 {
            return Err(ConfigError::OutOfBounds("Batch size cannot be less than 1"));
        }

        Ok(())
    }
}

impl Default for Batching {
    fn default() -> Self {
        Batching {
            batch_size: Batching::default_batch_size(),
            shuffle: Batching::default_shuffle(),
            seed: None,
        }
    }
}

/// _(Optional)_ Fields with information about
/// resources available for the program.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Number of workers extracting samples in parallel.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    ///
    /// Large stores with many channels can make a batch much bigger than
    /// expected. With a cap the process aborts with an out-of-memory
    /// message instead of being killed silently by the system.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub input_data: InputData,

    #[serde(default)]
    pub missing_values: MissingValues,

    #[serde(default)]
    pub normalisation: Normalisation,

    #[serde(default)]
    pub store: Store,

    #[serde(default)]
    pub batching: Batching,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.input_data.nwp.gfs.check_bounds()?;
        config.missing_values.check_bounds()?;
        config.batching.check_bounds()?;
        config.resources.check_bounds()?;

        Ok(config)
    }

    /// Shortcut to the GFS section.
    pub fn gfs(&self) -> &NwpConfig {
        &self.input_data.nwp.gfs
    }
}
