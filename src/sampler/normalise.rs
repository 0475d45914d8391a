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

//! Per-channel standardisation of samples.
//!
//! Constants are kept per provider, so one table can serve samplers of
//! different NWP sources. The built-in table covers GFS and can be
//! replaced by a YAML file of the form
//!
//! ```yaml
//! gfs:
//!   t: { mean: 278.5, std: 22.8 }
//! ```

use super::configuration::Normalisation;
use super::extract::Sample;
use crate::constants::{GFS_MEANS, GFS_PROVIDER, GFS_STDS};
use crate::errors::{ConfigError, SamplerError};
use crate::Float;
use log::debug;
use ndarray::Axis;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::{fs, path::Path};

/// Mean and standard deviation of one channel.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
}

/// Normalisation constants of all providers.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct NormalisationConstants {
    providers: FxHashMap<String, FxHashMap<String, ChannelStats>>,
}

impl NormalisationConstants {
    /// Table shipped with the program.
    pub fn builtin() -> Self {
        let gfs = GFS_MEANS
            .iter()
            .zip(GFS_STDS.iter())
            .map(|(&(channel, mean), &(_, std))| (channel.to_string(), ChannelStats { mean, std }))
            .collect();

        let mut constants = NormalisationConstants::default();
        constants.insert(GFS_PROVIDER, gfs);
        constants
    }

    pub fn new_from_file(file_path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(file_path)?;
        let constants: NormalisationConstants = serde_yaml::from_slice(&data)?;

        constants.check_bounds()?;

        Ok(constants)
    }

    /// Constants named by the configuration, the built-in table by default.
    pub fn from_config(normalisation: &Normalisation) -> Result<Self, ConfigError> {
        match &normalisation.constants_file {
            Some(path) => {
                debug!("Reading normalisation constants from {}", path.display());
                NormalisationConstants::new_from_file(path)
            }
            None => Ok(NormalisationConstants::builtin()),
        }
    }

    pub fn insert(&mut self, provider: &str, stats: FxHashMap<String, ChannelStats>) {
        self.providers.insert(provider.to_string(), stats);
    }

    /// Standard deviations must be positive for the division to be defined.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        let valid = self
            .providers
            .values()
            .flat_map(|channels| channels.values())
            .all(|s| s.mean.is_finite() && s.std.is_finite() && s.std > 0.0);

        if !valid {
            return Err(ConfigError::OutOfBounds(
                "Normalisation constants must be finite with positive standard deviation",
            ));
        }

        Ok(())
    }

    /// Returns `(value - mean) / std` for every channel of `sample`.
    ///
    /// Every channel must have constants, otherwise nothing is
    /// normalised and an error is returned.
    pub fn normalize(&self, mut sample: Sample, provider: &str) -> Result<Sample, SamplerError> {
        let table = self
            .providers
            .get(provider)
            .ok_or_else(|| SamplerError::UnknownProvider(provider.to_string()))?;

        let stats = sample
            .channel
            .iter()
            .map(|channel| {
                table.get(channel).copied().ok_or_else(|| {
                    SamplerError::MissingNormalisationConstant {
                        provider: provider.to_string(),
                        channel: channel.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Normalising {} channels with '{}' constants", stats.len(), provider);

        for (mut field, s) in sample.values.axis_iter_mut(Axis(1)).zip(&stats) {
            let (mean, std) = (s.mean as Float, s.std as Float);
            field.mapv_inplace(|v| (v - mean) / std);
        }

        Ok(sample)
    }
}
