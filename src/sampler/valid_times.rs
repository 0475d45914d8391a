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

//! Module resolving the forecast initialisation times (`t0`)
//! from which samples can be cut.
//!
//! Finding the times is delegated to a [`ValidTimeFinder`], this module
//! only brings its output to one sorted list and applies the bounds
//! requested by the user.

use super::bisection::find_within;
use super::configuration::NwpConfig;
use super::dataset::ArrayDataset;
use crate::constants::GFS_PROVIDER;
use crate::errors::SamplerError;
use chrono::{Duration, NaiveDateTime};
use log::{debug, warn};
use std::fmt;

/// Time span in which samples are available.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TimePeriod {
    pub start_dt: NaiveDateTime,
    pub end_dt: NaiveDateTime,
}

/// Output of a [`ValidTimeFinder`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ValidTimes {
    /// Periods whose `start_dt` is taken as `t0`.
    Periods(Vec<TimePeriod>),

    T0s(Vec<NaiveDateTime>),
}

impl ValidTimes {
    fn into_t0s(self) -> Vec<NaiveDateTime> {
        match self {
            ValidTimes::Periods(periods) => periods.into_iter().map(|p| p.start_dt).collect(),
            ValidTimes::T0s(t0s) => t0s,
        }
    }
}

/// Algorithm discovering valid times in named datasets.
pub trait ValidTimeFinder: Send + Sync + fmt::Debug {
    fn find(
        &self,
        datasets: &[(&str, &ArrayDataset)],
        config: &NwpConfig,
    ) -> Result<ValidTimes, SamplerError>;
}

/// Groups init times into contiguous periods.
///
/// Two consecutive init times belong to one period when they are at
/// most `max_staleness_minutes` apart. A period ends at its last init
/// time plus the staleness.
#[derive(Copy, Clone, Default, Debug)]
pub struct ContiguousInitTimes;

impl ValidTimeFinder for ContiguousInitTimes {
    fn find(
        &self,
        datasets: &[(&str, &ArrayDataset)],
        config: &NwpConfig,
    ) -> Result<ValidTimes, SamplerError> {
        let staleness = Duration::minutes(config.max_staleness_minutes);
        let mut periods = Vec::new();

        for (name, dataset) in datasets {
            let init_times = dataset.init_times();
            debug!("Finding periods in {} init times of '{}'", init_times.len(), name);

            let mut start = match init_times.first() {
                Some(&start) => start,
                None => continue,
            };

            for pair in init_times.windows(2) {
                if pair[1] - pair[0] > staleness {
                    periods.push(TimePeriod {
                        start_dt: start,
                        end_dt: pair[0] + staleness,
                    });
                    start = pair[1];
                }
            }

            if let Some(&last) = init_times.last() {
                periods.push(TimePeriod {
                    start_dt: start,
                    end_dt: last + staleness,
                });
            }
        }

        Ok(ValidTimes::Periods(periods))
    }
}

/// Returns the ascending, distinct `t0` times found in `dataset`
/// within `[start_time, end_time]`.
///
/// Fewer than two times is not an error, only a warning.
pub fn resolve(
    dataset: &ArrayDataset,
    config: &NwpConfig,
    finder: &dyn ValidTimeFinder,
    start_time: Option<NaiveDateTime>,
    end_time: Option<NaiveDateTime>,
) -> Result<Vec<NaiveDateTime>, SamplerError> {
    let found = finder.find(&[(GFS_PROVIDER, dataset)], config)?;

    let mut t0s = found.into_t0s();
    t0s.sort_unstable();
    t0s.dedup();

    let first = start_time.unwrap_or(NaiveDateTime::MIN);
    let last = end_time.unwrap_or(NaiveDateTime::MAX);
    let t0s = t0s[find_within(&t0s, &first, &last)].to_vec();

    if t0s.len() <= 1 {
        warn!("Found only {} valid time(s), check the data and time bounds", t0s.len());
    }

    Ok(t0s)
}

#[cfg(test)]
mod tests {
    use super::{resolve, ContiguousInitTimes, TimePeriod, ValidTimeFinder, ValidTimes};
    use crate::errors::SamplerError;
    use crate::sampler::configuration::{NwpConfig, T0Alignment};
    use crate::sampler::dataset::testing::{dataset, datetime};
    use crate::sampler::dataset::ArrayDataset;
    use chrono::Duration;

    fn config(max_staleness_minutes: i64) -> NwpConfig {
        NwpConfig {
            zarr_path: None,
            provider: "gfs".to_string(),
            interval_start_minutes: 0,
            interval_end_minutes: 180,
            time_resolution_minutes: 60,
            max_staleness_minutes,
            channels: None,
            t0_alignment: T0Alignment::Exact,
        }
    }

    /// Finder returning a fixed answer.
    #[derive(Debug)]
    struct Fixed(ValidTimes);

    impl ValidTimeFinder for Fixed {
        fn find(
            &self,
            _datasets: &[(&str, &ArrayDataset)],
            _config: &NwpConfig,
        ) -> Result<ValidTimes, SamplerError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn periods_become_sorted_distinct_t0s() {
        let period = |h| TimePeriod {
            start_dt: datetime(2023, 1, 1, h),
            end_dt: datetime(2023, 1, 1, h) + Duration::hours(3),
        };
        let finder = Fixed(ValidTimes::Periods(vec![period(12), period(0), period(12), period(6)]));

        let t0s = resolve(&dataset(), &config(0), &finder, None, None).unwrap();

        assert_eq!(
            t0s,
            vec![datetime(2023, 1, 1, 0), datetime(2023, 1, 1, 6), datetime(2023, 1, 1, 12)]
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let finder = Fixed(ValidTimes::T0s(
            (0..40).rev().map(|i| datetime(2022, 12, 31, 0) + Duration::hours(3 * i)).collect(),
        ));
        let start = datetime(2023, 1, 1, 0);
        let end = datetime(2023, 1, 2, 0);

        let t0s = resolve(&dataset(), &config(0), &finder, Some(start), Some(end)).unwrap();

        assert_eq!(t0s.len(), 9);
        assert_eq!(t0s.first(), Some(&start));
        assert_eq!(t0s.last(), Some(&end));
        assert!(t0s.windows(2).all(|w| w[0] < w[1]));
        assert!(t0s.iter().all(|t| *t >= start && *t <= end));
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let finder = Fixed(ValidTimes::T0s(vec![datetime(2023, 1, 1, 0)]));

        let t0s = resolve(
            &dataset(),
            &config(0),
            &finder,
            Some(datetime(2024, 1, 1, 0)),
            None,
        )
        .unwrap();

        assert!(t0s.is_empty());
    }

    #[test]
    fn every_init_time_starts_a_period_without_staleness() {
        let ds = dataset();

        let found = ContiguousInitTimes.find(&[("gfs", &ds)], &config(0)).unwrap();
        let t0s = resolve(&ds, &config(0), &ContiguousInitTimes, None, None).unwrap();

        assert!(matches!(found, ValidTimes::Periods(periods) if periods.len() == 4));
        assert_eq!(t0s, ds.init_times());
    }

    #[test]
    fn contiguous_init_times_form_one_period() {
        let ds = dataset();

        let found = ContiguousInitTimes.find(&[("gfs", &ds)], &config(360)).unwrap();

        assert_eq!(
            found,
            ValidTimes::Periods(vec![TimePeriod {
                start_dt: datetime(2023, 1, 1, 0),
                end_dt: datetime(2023, 1, 2, 0),
            }])
        );
    }
}
