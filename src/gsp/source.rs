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

//! Sources of per-GSP generation data.

use super::table::GspTable;
use crate::constants::{
    GSP_DATETIME_COLUMN, GSP_ID_COLUMN, LEGACY_GSP_DATETIME_COLUMN, PVLIVE_BASE_URL,
    PVLIVE_TIMEOUT_SECS,
};
use crate::errors::GspError;
use chrono::{DateTime, NaiveDateTime};
use log::debug;
use reqwest::blocking;
use serde::Deserialize;
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Columns of a PVLive response which are never kept as values.
const SKIPPED_COLUMNS: [&str; 2] = [GSP_ID_COLUMN, "pes_id"];

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%#z"];

/// Anything able to return generation data of one GSP over a time range.
pub trait GenerationSource {
    /// Rows of `gsp_id` with `start <= datetime_gmt <= end`.
    /// `None` or an empty table means the source has no data.
    fn get_data_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        gsp_id: u16,
        extra_fields: &[&str],
    ) -> Result<Option<GspTable>, GspError>;
}

/// Parses a timestamp with or without UTC offset into naive UTC.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, GspError> {
    let input = input.trim();

    if let Ok(datetime) = DateTime::parse_from_rfc3339(input) {
        return Ok(datetime.naive_utc());
    }

    for format in OFFSET_FORMATS {
        if let Ok(datetime) = DateTime::parse_from_str(input, format) {
            return Ok(datetime.naive_utc());
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(datetime);
        }
    }

    Err(GspError::Datetime(input.to_string()))
}

fn is_datetime_column(name: &str) -> bool {
    name == GSP_DATETIME_COLUMN || name == LEGACY_GSP_DATETIME_COLUMN
}

/// Client of the PVLive GSP endpoint.
#[derive(Debug)]
pub struct PvLive {
    client: blocking::Client,
    base_url: String,
}

#[derive(Deserialize, Debug)]
struct PvLiveResponse {
    data: Vec<Vec<Value>>,
    meta: Vec<String>,
}

impl PvLive {
    pub fn new() -> Result<Self, GspError> {
        PvLive::with_base_url(PVLIVE_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, GspError> {
        let client = blocking::Client::builder()
            .timeout(Duration::from_secs(PVLIVE_TIMEOUT_SECS))
            .build()?;

        Ok(PvLive {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl GenerationSource for PvLive {
    fn get_data_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        gsp_id: u16,
        extra_fields: &[&str],
    ) -> Result<Option<GspTable>, GspError> {
        let url = format!("{}/gsp/{}", self.base_url, gsp_id);
        let params = [
            ("start", start.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ("end", end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ("extra_fields", extra_fields.join(",")),
        ];

        debug!("Requesting {} from {} to {}", url, start, end);

        let response = self.client.get(&url).query(&params).send()?;

        if !response.status().is_success() {
            return Err(GspError::Response(format!(
                "request for GSP {} failed with status {}",
                gsp_id,
                response.status()
            )));
        }

        let body: PvLiveResponse = response.json()?;
        if body.data.is_empty() {
            return Ok(None);
        }

        table_from_response(body).map(Some)
    }
}

/// Turns the `meta` column names and `data` rows of a response into a
/// table, keeping the time column and every numeric column.
fn table_from_response(response: PvLiveResponse) -> Result<GspTable, GspError> {
    let datetime_column = response
        .meta
        .iter()
        .position(|name| is_datetime_column(name))
        .ok_or_else(|| GspError::Response("no datetime column in response".to_string()))?;

    let gsp_column = response.meta.iter().position(|name| name == GSP_ID_COLUMN);

    let value_columns: Vec<usize> = (0..response.meta.len())
        .filter(|&i| i != datetime_column)
        .filter(|&i| !SKIPPED_COLUMNS.contains(&response.meta[i].as_str()))
        .collect();

    let mut table = GspTable::new(
        value_columns
            .iter()
            .map(|&i| response.meta[i].clone())
            .collect(),
    );

    for row in response.data {
        if row.len() != response.meta.len() {
            return Err(GspError::Response(format!(
                "row of {} fields for {} columns",
                row.len(),
                response.meta.len()
            )));
        }

        let datetime = match &row[datetime_column] {
            Value::String(s) => parse_datetime(s)?,
            other => return Err(GspError::Datetime(other.to_string())),
        };

        let gsp_id = match gsp_column.map(|i| &row[i]) {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| GspError::Response(format!("invalid GSP id {}", n)))?,
            _ => 0,
        };

        let values = value_columns
            .iter()
            .map(|&i| match &row[i] {
                Value::Null => Ok(f64::NAN),
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| GspError::Response(format!("invalid number {}", n))),
                other => Err(GspError::Response(format!(
                    "non-numeric value {} in column {}",
                    other, response.meta[i]
                ))),
            })
            .collect::<Result<Vec<f64>, GspError>>()?;

        table.push(gsp_id, datetime, values)?;
    }

    Ok(table)
}

/// Directory of `gsp_{id}.csv` exports, one per GSP.
///
/// Each file has a `datetime_gmt` (or `datetime`) column and numeric
/// value columns; empty cells are missing values.
#[derive(Clone, Debug)]
pub struct CsvDirectory {
    dir: PathBuf,
}

impl CsvDirectory {
    pub fn new(dir: &Path) -> Self {
        CsvDirectory {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self, gsp_id: u16) -> PathBuf {
        self.dir.join(format!("gsp_{}.csv", gsp_id))
    }
}

impl GenerationSource for CsvDirectory {
    fn get_data_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        gsp_id: u16,
        _extra_fields: &[&str],
    ) -> Result<Option<GspTable>, GspError> {
        let path = self.path(gsp_id);
        if !path.is_file() {
            debug!("No file {}", path.display());
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();

        let datetime_column = headers
            .iter()
            .position(is_datetime_column)
            .ok_or_else(|| {
                GspError::Table(format!("no datetime column in {}", path.display()))
            })?;

        let value_columns: Vec<usize> = (0..headers.len())
            .filter(|&i| i != datetime_column)
            .filter(|&i| !SKIPPED_COLUMNS.contains(&&headers[i]))
            .collect();

        let mut table = GspTable::new(value_columns.iter().map(|&i| headers[i].to_string()).collect());

        for record in reader.records() {
            let record = record?;
            let datetime = parse_datetime(&record[datetime_column])?;

            if datetime < start || datetime > end {
                continue;
            }

            let values = value_columns
                .iter()
                .map(|&i| {
                    let cell = record[i].trim();
                    if cell.is_empty() {
                        Ok(f64::NAN)
                    } else {
                        cell.parse::<f64>().map_err(|_| {
                            GspError::Table(format!("invalid value '{}' in {}", cell, &headers[i]))
                        })
                    }
                })
                .collect::<Result<Vec<f64>, GspError>>()?;

            table.push(gsp_id, datetime, values)?;
        }

        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_datetime, table_from_response, CsvDirectory, GenerationSource, PvLiveResponse};
    use crate::errors::GspError;
    use chrono::NaiveDate;

    fn datetime(h: u32, m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn timestamps_become_naive_utc() {
        assert_eq!(parse_datetime("2024-01-01T00:30:00Z").unwrap(), datetime(0, 30));
        assert_eq!(parse_datetime("2024-01-01T01:30:00+01:00").unwrap(), datetime(0, 30));
        assert_eq!(parse_datetime("2024-01-01 00:30:00+00:00").unwrap(), datetime(0, 30));
        assert_eq!(parse_datetime("2024-01-01 00:30:00").unwrap(), datetime(0, 30));
        assert_eq!(parse_datetime("2024-01-01T00:30:00").unwrap(), datetime(0, 30));

        assert!(matches!(parse_datetime("yesterday"), Err(GspError::Datetime(_))));
    }

    #[test]
    fn response_rows_become_table() {
        let body = r#"{
            "data": [
                [5, "2024-01-01T00:00:00Z", 10.5, 200.0, 210.0],
                [5, "2024-01-01T00:30:00Z", null, 200.0, 210.0]
            ],
            "meta": ["gsp_id", "datetime_gmt", "generation_mw", "capacity_mwp", "installedcapacity_mwp"]
        }"#;
        let response: PvLiveResponse = serde_json::from_str(body).unwrap();

        let table = table_from_response(response).unwrap();

        assert_eq!(
            table.columns(),
            &["generation_mw", "capacity_mwp", "installedcapacity_mwp"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].gsp_id, 5);
        assert_eq!(table.rows()[1].datetime_gmt, datetime(0, 30));
        assert!(table.rows()[1].values[0].is_nan());
        assert_eq!(table.column("installedcapacity_mwp").unwrap(), vec![210.0, 210.0]);
    }

    #[test]
    fn legacy_datetime_column_is_accepted() {
        let body = r#"{"data": [["2024-01-01T00:00:00Z", 1.0]], "meta": ["datetime", "generation_mw"]}"#;
        let response: PvLiveResponse = serde_json::from_str(body).unwrap();

        let table = table_from_response(response).unwrap();

        assert_eq!(table.columns(), &["generation_mw"]);
        assert_eq!(table.rows()[0].datetime_gmt, datetime(0, 0));
    }

    #[test]
    fn response_without_time_fails() {
        let body = r#"{"data": [[1.0]], "meta": ["generation_mw"]}"#;
        let response: PvLiveResponse = serde_json::from_str(body).unwrap();

        assert!(matches!(table_from_response(response), Err(GspError::Response(_))));
    }

    #[test]
    fn csv_rows_in_range_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvDirectory::new(dir.path());

        let mut writer = csv::Writer::from_path(source.path(3)).unwrap();
        writer
            .write_record(["datetime", "generation_mw", "capacity_mwp"])
            .unwrap();
        writer.write_record(["2023-12-31T23:30:00Z", "1", "200"]).unwrap();
        writer.write_record(["2024-01-01T00:00:00Z", "2", "200"]).unwrap();
        writer.write_record(["2024-01-01T00:30:00Z", "", "200"]).unwrap();
        writer.write_record(["2024-01-01T01:00:00Z", "4", "200"]).unwrap();
        writer.flush().unwrap();

        let table = source
            .get_data_between(datetime(0, 0), datetime(0, 30), 3, &[])
            .unwrap()
            .unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.rows().iter().all(|r| r.gsp_id == 3));
        assert_eq!(table.rows()[0].values, vec![2.0, 200.0]);
        assert!(table.rows()[1].values[0].is_nan());
    }

    #[test]
    fn missing_csv_means_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvDirectory::new(dir.path());

        let result = source.get_data_between(datetime(0, 0), datetime(1, 0), 7, &[]);

        assert!(matches!(result, Ok(None)));
    }
}
