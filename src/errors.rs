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

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot cap memory at {0} MB, more is already allocated")]
    MemoryLimit(usize),

    #[error("Sampling failed: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Batch processing failed: {0}")]
    Batch(#[from] BatchError),

    #[error("GSP data collection failed: {0}")]
    Gsp(#[from] GspError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open configuration file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize configuration file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds: {0}")]
    OutOfBounds(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidArgument(String),
}

/// Errors raised while opening or reading an array store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot open store {0}")]
    OpenFailed(String),

    #[error("Required axis '{0}' is absent from the dataset")]
    MissingAxis(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Cannot read from store: {0}")]
    Read(String),

    #[error("Cannot decode time coordinate: {0}")]
    Time(String),
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No valid lead-time steps found for init time {0}")]
    NoValidSteps(NaiveDateTime),

    #[error("Init time {0} is not present in the dataset")]
    InitTimeNotFound(NaiveDateTime),

    #[error("Channel '{0}' is not present in the dataset")]
    ChannelNotFound(String),

    #[error("No normalisation constants for channel '{channel}' of provider '{provider}'")]
    MissingNormalisationConstant { provider: String, channel: String },

    #[error("No normalisation constants for provider '{0}'")]
    UnknownProvider(String),

    #[error("Sample index {index} is out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SearchError {
    #[error("Searched array is empty")]
    EmptyArray,

    #[error("Searched value is outside of the array bounds")]
    OutOfBounds,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot write batch file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Sample(#[from] SamplerError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Error, Debug)]
pub enum GspError {
    #[error("PVLive request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected PVLive response: {0}")]
    Response(String),

    #[error("Cannot read generation CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse datetime '{0}'")]
    Datetime(String),

    #[error("Invalid year range {0}..{1}")]
    YearRange(i32, i32),

    #[error("Malformed generation table: {0}")]
    Table(String),

    #[error("Duplicate row for GSP {0} at {1}")]
    DuplicateRow(u16, NaiveDateTime),

    #[error("Cannot write combined store: {0}")]
    Write(String),
}
