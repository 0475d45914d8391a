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

//! Command line of the program.

use crate::batch::{run_batch_samples, BatchRun};
use crate::constants::MAX_GSP_ID;
use crate::errors::AppError;
use crate::gsp::{combine_gsp, CsvDirectory, GenerationSource, PvLive};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Parser, Debug)]
#[command(name = "pvnet-sampler")]
#[command(about = "GFS sample preparation and GSP data collection for PVNet")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save normalised GFS samples as numbered batch files
    BatchSamples {
        /// Configuration file path
        #[arg(long, env = "PVNET_CONFIG")]
        config: PathBuf,

        /// Directory receiving the batch files
        #[arg(long)]
        output_directory: PathBuf,

        /// Zarr store to read instead of the configured one
        #[arg(long)]
        dataset_path: Option<String>,

        /// Earliest initialisation time, e.g. 2023-01-01T00:00:00
        #[arg(long, value_parser = parse_datetime_arg)]
        start_time: Option<NaiveDateTime>,

        /// Latest initialisation time, e.g. 2023-12-31T18:00:00
        #[arg(long, value_parser = parse_datetime_arg)]
        end_time: Option<NaiveDateTime>,

        /// Stop after this many batches
        #[arg(long)]
        num_batches: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Worker threads extracting samples
        #[arg(long)]
        num_workers: Option<usize>,

        /// Keep samples in chronological order
        #[arg(long)]
        no_shuffle: bool,
    },

    /// Fetch generation data of all GSPs and save it as one Zarr store
    CombineGsp {
        #[arg(long, default_value_t = 2020)]
        start_year: i32,

        /// First year not included
        #[arg(long, default_value_t = 2025)]
        end_year: i32,

        #[arg(long, default_value = "data")]
        output_folder: PathBuf,

        /// Read `gsp_{id}.csv` files from this directory instead of PVLive
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
}

fn parse_datetime_arg(arg: &str) -> Result<NaiveDateTime, String> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(arg, format).ok())
        .ok_or_else(|| format!("'{}' is not a datetime like 2023-01-01T00:00:00", arg))
}

/// Runs the selected subcommand.
pub fn run(args: Args) -> Result<(), AppError> {
    match args.command {
        Command::BatchSamples {
            config,
            output_directory,
            dataset_path,
            start_time,
            end_time,
            num_batches,
            batch_size,
            num_workers,
            no_shuffle,
        } => run_batch_samples(&BatchRun {
            config_path: config,
            output_directory,
            dataset_path,
            start_time,
            end_time,
            num_batches,
            batch_size,
            num_workers,
            no_shuffle,
        }),

        Command::CombineGsp {
            start_year,
            end_year,
            output_folder,
            csv_dir,
        } => {
            let source: Box<dyn GenerationSource> = match csv_dir {
                Some(dir) => {
                    info!("Reading GSP data from {}", dir.display());
                    Box::new(CsvDirectory::new(&dir))
                }
                None => Box::new(PvLive::new()?),
            };

            combine_gsp(
                source.as_ref(),
                start_year,
                end_year,
                &output_folder,
                0..=MAX_GSP_ID,
            )?;

            Ok(())
        }
    }
}
