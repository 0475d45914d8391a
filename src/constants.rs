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

//! Module containing constants used by the sampler.

/// Canonical name of the forecast initialisation time axis.
pub const INIT_TIME_DIM: &str = "init_time_utc";

/// Name under which some stores keep the initialisation time axis.
pub const LEGACY_INIT_TIME_DIM: &str = "init_time";

pub const STEP_DIM: &str = "step";
pub const CHANNEL_DIM: &str = "channel";
pub const LATITUDE_DIM: &str = "latitude";
pub const LONGITUDE_DIM: &str = "longitude";

/// Axis order of every opened NWP dataset.
pub const NWP_DIMS: [&str; 5] = [
    INIT_TIME_DIM,
    STEP_DIM,
    CHANNEL_DIM,
    LATITUDE_DIM,
    LONGITUDE_DIM,
];

/// Largest magnitude of any minute value in the forecast window settings (ten years).
pub const MAX_WINDOW_MINUTES: i64 = 10 * 366 * 24 * 60;

/// Digits in the sequential index of saved batch files.
pub const BATCH_INDEX_WIDTH: usize = 8;

/// Highest GSP id reported by PVLive (0 is the national total).
pub const MAX_GSP_ID: u16 = 318;

/// Extra PVLive fields requested for every GSP.
pub const GSP_EXTRA_FIELDS: [&str; 2] = ["capacity_mwp", "installedcapacity_mwp"];

pub const GSP_ID_COLUMN: &str = "gsp_id";
pub const GSP_DATETIME_COLUMN: &str = "datetime_gmt";

/// Name of the time column in some PVLive exports.
pub const LEGACY_GSP_DATETIME_COLUMN: &str = "datetime";

/// Chunk lengths of the combined GSP store along `gsp_id` and `datetime_gmt`.
pub const GSP_CHUNKS: (u64, u64) = (1, 1000);

/// Provider name of the built-in normalisation table.
pub const GFS_PROVIDER: &str = "gfs";

/// Per-channel means of GFS variables, computed over the training archive.
#[allow(clippy::excessive_precision)]
pub const GFS_MEANS: [(&str, f64); 17] = [
    ("dlwrf", 298.342),
    ("dswrf", 168.12321),
    ("hcc", 35.272),
    ("lcc", 43.578342),
    ("mcc", 33.738823),
    ("prate", 2.8190969e-05),
    ("r", 18.359747),
    ("sde", 0.36937004),
    ("t", 278.5223),
    ("tcc", 66.841606),
    ("u10", -0.0022310058),
    ("u100", 0.0823025),
    ("v10", 0.06219831),
    ("v100", 0.0797807),
    ("vis", 19628.32),
    ("u", 11.645444),
    ("v", 0.12330122),
];

/// Per-channel standard deviations of GFS variables.
#[allow(clippy::excessive_precision)]
pub const GFS_STDS: [(&str, f64); 17] = [
    ("dlwrf", 96.305916),
    ("dswrf", 246.18533),
    ("hcc", 42.525383),
    ("lcc", 44.3732),
    ("mcc", 43.150745),
    ("prate", 0.00010159573),
    ("r", 25.440672),
    ("sde", 0.43345627),
    ("t", 22.825893),
    ("tcc", 41.030598),
    ("u10", 5.470838),
    ("u100", 6.8899174),
    ("v10", 4.7401133),
    ("v100", 6.076132),
    ("vis", 8294.022),
    ("u", 10.614556),
    ("v", 7.176398),
];

/// Root of the PVLive v4 API.
pub const PVLIVE_BASE_URL: &str = "https://api.pvlive.uk/pvlive/api/v4";

/// Timeout of one PVLive request, in seconds.
pub const PVLIVE_TIMEOUT_SECS: u64 = 120;

/// Encoding of `datetime_gmt` in the combined GSP store.
pub const GSP_TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";
