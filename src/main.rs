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

//! PVNet Data Sampler prepares training data for PV nowcasting models.
//!
//! It opens Global Forecast System (GFS) forecasts stored as Zarr,
//! cuts one forecast window per valid initialisation time, normalises
//! every channel and saves the samples in numbered batch files.
//! A second tool gathers Grid Supply Point (GSP) generation data
//! from PVLive and stores it as a single combined dataset.

mod batch;
mod cli;
mod constants;
mod errors;
mod gsp;
mod sampler;

use cap::Cap;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::alloc;

#[cfg(not(feature = "double_precision"))]
type Float = f32;

#[cfg(feature = "double_precision")]
type Float = f64;

/// Global allocator used by the program.
///
/// Capping the heap to the limit from the configuration file turns
/// an unbounded slow-down into an explicit out-of-memory abort when
/// a batch run asks for more than the machine can hold.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the logger and hands the parsed command line to [`cli::run`].
///
/// The logger is set up before anything else so that configuration
/// and store errors are reported with their full context.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("PVNET_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("PVNET_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let args = cli::Args::parse();

    match cli::run(args) {
        Ok(_) => info!("Execution finished. Check the output directory and log."),
        Err(err) => error!("Execution failed with error: {}", err),
    }
}
