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

//! Module combining PV generation data of all GSPs into one Zarr store.
//!
//! Data is fetched per GSP and per calendar year, stacked into one
//! table indexed by `(gsp_id, datetime_gmt)` and written in array form.

mod source;
mod table;
mod writer;

pub use self::source::{parse_datetime, CsvDirectory, GenerationSource, PvLive};
pub use self::table::{GspDataset, GspRow, GspTable};
pub use self::writer::write_gsp_zarr;

use crate::constants::GSP_EXTRA_FIELDS;
use crate::errors::GspError;
use chrono::{NaiveDate, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::{
    fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

fn new_year(year: i32) -> Result<NaiveDateTime, GspError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(GspError::YearRange(year, year))
}

/// Half-open yearly ranges covering `[start_year-01-01, end_year-01-01)`.
pub fn year_ranges(
    start_year: i32,
    end_year: i32,
) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, GspError> {
    if end_year <= start_year {
        return Err(GspError::YearRange(start_year, end_year));
    }

    (start_year..end_year)
        .map(|year| Ok((new_year(year)?, new_year(year + 1)?)))
        .collect()
}

/// Name of the combined store of a date range.
pub fn output_name(range_start: NaiveDateTime, range_end: NaiveDateTime) -> String {
    format!(
        "combined_gsp_{}_{}.zarr",
        range_start.date(),
        range_end.date()
    )
}

/// Fetches every GSP in `gsp_ids` between `start_year` and `end_year`
/// and writes the result under `output_folder`.
///
/// Failing sub-ranges and GSPs without data are logged and skipped.
/// Returns `None` without writing when no GSP had any data.
pub fn combine_gsp(
    source: &dyn GenerationSource,
    start_year: i32,
    end_year: i32,
    output_folder: &Path,
    gsp_ids: RangeInclusive<u16>,
) -> Result<Option<PathBuf>, GspError> {
    let ranges = year_ranges(start_year, end_year)?;
    let range_start = ranges[0].0;
    let range_end = ranges[ranges.len() - 1].1;

    let gsp_bar = ProgressBar::new(gsp_ids.clone().count() as u64);
    gsp_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    gsp_bar.set_prefix("Fetching GSPs");

    let mut tables = Vec::new();

    for gsp_id in gsp_ids.clone() {
        info!("Processing GSP ID {}", gsp_id);

        let mut parts = Vec::new();

        for &(start, end) in &ranges {
            match source.get_data_between(start, end, gsp_id, &GSP_EXTRA_FIELDS) {
                Ok(Some(mut table)) => {
                    table.retain_rows(|row| row.datetime_gmt >= start && row.datetime_gmt < end);
                    table.assign_gsp_id(gsp_id);

                    if table.is_empty() {
                        warn!("No rows for GSP ID {} between {} and {}", gsp_id, start, end);
                    } else {
                        parts.push(table);
                    }
                }
                Ok(None) => warn!("No rows for GSP ID {} between {} and {}", gsp_id, start, end),
                Err(e) => warn!(
                    "Failed to fetch GSP ID {} between {} and {}: {}",
                    gsp_id, start, end, e
                ),
            }
        }

        if parts.is_empty() {
            warn!("No data available for GSP ID {}", gsp_id);
        } else {
            tables.push(GspTable::concat(parts));
        }

        gsp_bar.inc(1);
    }

    gsp_bar.finish_with_message("GSP fetching complete");

    if tables.is_empty() {
        error!("No data retrieved for any GSP IDs - terminating");
        return Ok(None);
    }

    let dataset = GspDataset::from_table(&GspTable::concat(tables))?;

    fs::create_dir_all(output_folder)?;
    let output_path = output_folder.join(output_name(range_start, range_end));
    write_gsp_zarr(&dataset, &output_path)?;

    info!(
        "Successfully saved combined GSP dataset to {}",
        output_path.display()
    );
    info!(
        "Dataset contains GSPs {}-{} for period {} to {}",
        gsp_ids.start(),
        gsp_ids.end(),
        range_start.date(),
        range_end.date()
    );

    Ok(Some(output_path))
}
