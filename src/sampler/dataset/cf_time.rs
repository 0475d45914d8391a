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

//! Decoding of time coordinates stored with CF conventions.
//!
//! Datetimes are stored as numbers with a `units` attribute of the form
//! `"<unit> since <reference>"`, lead times as numbers with a plain
//! `"<unit>"` attribute.

use crate::errors::StoreError;
use chrono::{Duration, NaiveDate, NaiveDateTime};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Raw coordinate values as read from the store.
#[derive(Clone, PartialEq, Debug)]
pub enum Numbers {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Numbers {
    pub fn len(&self) -> usize {
        match self {
            Numbers::Int(values) => values.len(),
            Numbers::Float(values) => values.len(),
        }
    }

    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Numbers::Int(values) => values.iter().map(|&v| v as f64).collect(),
            Numbers::Float(values) => values.clone(),
        }
    }

    /// Values scaled by `unit` nanoseconds.
    fn to_nanos(&self, unit: i128) -> Result<Vec<i128>, StoreError> {
        match self {
            Numbers::Int(values) => values
                .iter()
                .map(|&v| {
                    // xarray writes NaT as the smallest i64
                    if v == i64::MIN {
                        Err(StoreError::Time("missing time value (NaT)".to_string()))
                    } else {
                        Ok(i128::from(v) * unit)
                    }
                })
                .collect(),
            Numbers::Float(values) => values
                .iter()
                .map(|&v| {
                    if v.is_finite() {
                        Ok((v * unit as f64).round() as i128)
                    } else {
                        Err(StoreError::Time("missing time value (NaN)".to_string()))
                    }
                })
                .collect(),
        }
    }
}

/// Decodes `"<unit> since <reference>"` encoded datetimes.
pub fn decode_datetimes(values: &Numbers, units: &str) -> Result<Vec<NaiveDateTime>, StoreError> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| StoreError::Time(format!("'{}' has no reference date", units)))?;

    let unit = unit_nanos(unit)?;
    let reference = parse_reference(reference)?;

    values
        .to_nanos(unit)?
        .into_iter()
        .map(|nanos| {
            reference
                .checked_add_signed(nanos_to_duration(nanos)?)
                .ok_or_else(|| {
                    StoreError::Time(format!("{} ns after {} is out of range", nanos, reference))
                })
        })
        .collect()
}

/// Decodes `"<unit>"` encoded lead times.
pub fn decode_timedeltas(values: &Numbers, units: &str) -> Result<Vec<Duration>, StoreError> {
    let unit = unit_nanos(units)?;

    values
        .to_nanos(unit)?
        .into_iter()
        .map(nanos_to_duration)
        .collect()
}

fn nanos_to_duration(nanos: i128) -> Result<Duration, StoreError> {
    let seconds = i64::try_from(nanos.div_euclid(NANOS_PER_SECOND))
        .map_err(|_| StoreError::Time(format!("{} ns is out of range", nanos)))?;
    let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as i64;

    Duration::try_seconds(seconds)
        .and_then(|d| d.checked_add(&Duration::nanoseconds(subsec)))
        .ok_or_else(|| StoreError::Time(format!("{} ns is out of range", nanos)))
}

fn unit_nanos(unit: &str) -> Result<i128, StoreError> {
    let nanos = match unit.trim() {
        "nanoseconds" | "nanosecond" | "ns" => 1,
        "microseconds" | "microsecond" | "us" => 1_000,
        "milliseconds" | "millisecond" | "ms" => 1_000_000,
        "seconds" | "second" | "s" => NANOS_PER_SECOND,
        "minutes" | "minute" | "min" => 60 * NANOS_PER_SECOND,
        "hours" | "hour" | "h" => 3_600 * NANOS_PER_SECOND,
        "days" | "day" | "d" | "D" => 86_400 * NANOS_PER_SECOND,
        other => return Err(StoreError::Time(format!("unknown time unit '{}'", other))),
    };

    Ok(nanos)
}

fn parse_reference(reference: &str) -> Result<NaiveDateTime, StoreError> {
    let reference = reference
        .trim()
        .trim_end_matches('Z')
        .trim_end_matches("+00:00")
        .trim_end_matches(" UTC");

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(reference, format) {
            return Ok(datetime);
        }
    }

    NaiveDate::parse_from_str(reference, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| StoreError::Time(format!("cannot parse reference date '{}'", reference)))
}
