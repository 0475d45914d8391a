//! This is a module for integration tests of the sampler,
//! but with access to private fields and methods.
//!
//! Every test here goes the whole way from a Zarr store on disk
//! to normalised samples, so the store fixture is written once per
//! test into a temporary directory.

use super::configuration::Config;
use super::dataset::{handle_missing, open, store_fixture, StoreOptions};
use super::{target_offsets, GfsDataSampler, NormalisationConstants};
use crate::errors::SamplerError;
use crate::sampler::dataset::testing::datetime;
use chrono::Duration;
use float_cmp::approx_eq;
use tempfile::TempDir;

const CONFIG: &str = "
input_data:
  nwp:
    gfs:
      provider: gfs
      interval_start_minutes: 0
      interval_end_minutes: 360
      time_resolution_minutes: 180
";

fn sampler_from_store(config: &str) -> (TempDir, Result<GfsDataSampler, SamplerError>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gfs.zarr");
    store_fixture::write_gfs_store(&path);

    let config = Config::new_from_slice(config.as_bytes()).unwrap();
    let options = StoreOptions::from(&config.store);
    let policy = config.missing_values.policy().unwrap();

    let dataset = open(path.to_str().unwrap(), &options).unwrap();
    let dataset = handle_missing(dataset, policy, config.missing_values.fill_value).unwrap();

    let sampler = GfsDataSampler::new(
        dataset,
        &config,
        NormalisationConstants::builtin(),
        None,
        None,
    );

    (dir, sampler)
}

#[test]
fn store_to_normalised_samples() {
    let (_dir, sampler) = sampler_from_store(CONFIG);
    let sampler = sampler.unwrap();

    assert_eq!(sampler.len(), 2);
    assert_eq!(
        sampler.valid_t0_times(),
        &[datetime(2023, 1, 1, 0), datetime(2023, 1, 1, 6)]
    );

    let sample = sampler.get(0).unwrap();
    assert_eq!(sample.values.shape(), &[3, 2, 2, 3]);
    assert_eq!(sample.channel, vec!["t".to_string(), "u10".to_string()]);

    // u10 at step 0h, latitude 51, longitude 1
    let raw = f64::from(store_fixture::value(1, 0, 0, 1, 2));
    let expected = (raw + 0.0022310058) / 5.470838;
    assert!(approx_eq!(
        f64,
        f64::from(sample.values[[0, 1, 1, 2]]),
        expected,
        epsilon = 1e-3
    ));

    assert_eq!(
        sample.attrs.unwrap().get("description"),
        Some(&serde_json::json!("GFS test archive"))
    );
}

#[test]
fn filled_cells_are_normalised_fill_value() {
    let (_dir, sampler) = sampler_from_store(CONFIG);
    let sample = sampler.unwrap().get(1).unwrap();

    let expected = (0.0 - 278.5223) / 22.825893;
    let value = f64::from(sample.values[[2, 0, 0, 0]]);

    assert!(value.is_finite());
    assert!(approx_eq!(f64, value, expected, epsilon = 1e-3));
}

#[test]
fn every_valid_time_gives_subset_of_window() {
    let config = CONFIG.replace("time_resolution_minutes: 180", "time_resolution_minutes: 60");
    let (_dir, sampler) = sampler_from_store(&config);
    let sampler = sampler.unwrap();

    let grid = target_offsets(Config::new_from_slice(config.as_bytes()).unwrap().gfs());

    for idx in 0..sampler.len() {
        let sample = sampler.get(idx).unwrap();

        assert!(!sample.step.is_empty());
        assert!(sample.step.windows(2).all(|w| w[0] < w[1]));
        assert!(sample.step.iter().all(|s| grid.contains(s)));
        assert_eq!(sample.step, vec![Duration::hours(0), Duration::hours(3), Duration::hours(6)]);
    }
}

#[test]
fn dropped_attributes_stay_out_of_samples() {
    let config = format!("{}store:\n  keep_attrs: false\n", CONFIG);
    let (_dir, sampler) = sampler_from_store(&config);

    let sample = sampler.unwrap().get(0).unwrap();

    assert!(sample.attrs.is_none());
}

#[test]
fn drop_policy_keeps_partially_missing_rows() {
    let config = format!("{}missing_values:\n  policy: drop\n", CONFIG);
    let (_dir, sampler) = sampler_from_store(&config);
    let sampler = sampler.unwrap();

    assert_eq!(sampler.dataset().shape(), [2, 3, 2, 2, 3]);
    assert!(sampler.get(1).unwrap().values[[2, 0, 0, 0]].is_nan());
    assert_eq!(sampler.dataset().fill_value(), None);
}

#[test]
fn index_past_the_end_fails() {
    let (_dir, sampler) = sampler_from_store(CONFIG);
    let result = sampler.unwrap().get(2);

    assert!(matches!(
        result,
        Err(SamplerError::IndexOutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn time_bounds_limit_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gfs.zarr");
    store_fixture::write_gfs_store(&path);
    let config = Config::new_from_slice(CONFIG.as_bytes()).unwrap();

    let sampler = GfsDataSampler::new(
        open(path.to_str().unwrap(), &StoreOptions::default()).unwrap(),
        &config,
        NormalisationConstants::builtin(),
        Some(datetime(2023, 1, 1, 6)),
        Some(datetime(2023, 1, 2, 0)),
    )
    .unwrap();
    assert_eq!(sampler.valid_t0_times(), &[datetime(2023, 1, 1, 6)]);

    let reversed = GfsDataSampler::new(
        open(path.to_str().unwrap(), &StoreOptions::default()).unwrap(),
        &config,
        NormalisationConstants::builtin(),
        Some(datetime(2023, 1, 2, 0)),
        Some(datetime(2023, 1, 1, 0)),
    );
    assert!(matches!(reversed, Err(SamplerError::InvalidArgument(_))));
}
