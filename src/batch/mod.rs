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

//! Module grouping samples into batches and saving them to disk.
//!
//! Samples of one batch are extracted in parallel on a thread pool,
//! batches themselves are produced and saved in order. Any failing
//! sample stops the whole run.

mod saver;

pub use self::saver::BatchSaver;

use crate::errors::{AppError, BatchError, ConfigError, SamplerError};
use crate::sampler::configuration::{Batching, Config};
use crate::sampler::dataset::{handle_missing, open, StoreOptions};
use crate::sampler::{GfsDataSampler, NormalisationConstants, Sample};
use crate::ALLOCATOR;
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{fmt, path::PathBuf, sync::Arc};

/// Number of batches needed for `num_samples` samples.
pub fn expected_batches(num_samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }

    (num_samples + batch_size - 1) / batch_size
}

/// Settings of a [`DataLoader`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub num_workers: usize,
}

impl LoaderOptions {
    pub fn new(batching: &Batching, num_workers: usize) -> Self {
        LoaderOptions {
            batch_size: batching.batch_size,
            shuffle: batching.shuffle,
            seed: batching.seed,
            num_workers,
        }
    }
}

/// Splits the samples of a sampler into batches.
pub struct DataLoader {
    sampler: Arc<GfsDataSampler>,
    batches: Vec<Vec<usize>>,
    threadpool: ThreadPool,
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("samples", &self.sampler.len())
            .field("batches", &self.batches.len())
            .field("workers", &self.threadpool.current_num_threads())
            .finish()
    }
}

impl DataLoader {
    /// Fixes the order of samples and prepares the worker pool.
    pub fn new(sampler: Arc<GfsDataSampler>, options: &LoaderOptions) -> Result<Self, BatchError> {
        let mut order: Vec<usize> = (0..sampler.len()).collect();

        if options.shuffle {
            let mut rng = match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }

        let batches = order
            .chunks(options.batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect();

        debug!("Setting up ThreadPool with {} workers", options.num_workers);
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(options.num_workers.max(1))
            .build()?;

        Ok(DataLoader {
            sampler,
            batches,
            threadpool,
        })
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Sample indices of each batch.
    pub fn batch_indices(&self) -> &[Vec<usize>] {
        &self.batches
    }

    /// Extracts the samples of batch `batch_num` in parallel,
    /// keeping the batch order.
    pub fn batch(&self, batch_num: usize) -> Result<Vec<Sample>, BatchError> {
        let indices = self.batches.get(batch_num).ok_or(SamplerError::IndexOutOfRange {
            index: batch_num,
            len: self.batches.len(),
        })?;

        let sampler = &self.sampler;
        let samples = self.threadpool.install(|| {
            indices
                .par_iter()
                .map(|&idx| sampler.get(idx))
                .collect::<Result<Vec<Sample>, SamplerError>>()
        })?;

        Ok(samples)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Vec<Sample>, BatchError>> + '_ {
        (0..self.len()).map(move |n| self.batch(n))
    }
}

/// Saves the batches of `loader` with `saver`, at most `num_batches`
/// of them when given. Returns the number of saved batches.
pub fn process_and_save_batches(
    loader: &DataLoader,
    saver: &BatchSaver,
    num_batches: Option<usize>,
) -> Result<usize, BatchError> {
    let total = num_batches.map_or(loader.len(), |n| n.min(loader.len()));

    // set progress bar for saved batches
    let batches_bar = ProgressBar::new(total as u64);
    batches_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    batches_bar.set_prefix("Saving batches");

    for (batch_num, batch) in loader.iter().take(total).enumerate() {
        saver.save(&batch?, batch_num)?;
        batches_bar.inc(1);
    }

    batches_bar.finish_with_message("Batch saving complete");

    Ok(total)
}

/// Parameters of a batch run given on the command line.
#[derive(Clone, PartialEq, Debug)]
pub struct BatchRun {
    pub config_path: PathBuf,
    pub output_directory: PathBuf,

    /// Overrides the store location of the configuration.
    pub dataset_path: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub num_batches: Option<usize>,

    /// Overrides the batch size of the configuration.
    pub batch_size: Option<usize>,

    /// Overrides the worker count of the configuration.
    pub num_workers: Option<usize>,
    pub no_shuffle: bool,
}

/// Opens the store, prepares the sampler and saves batches.
pub fn run_batch_samples(run: &BatchRun) -> Result<(), AppError> {
    info!("Reading configuration from {}", run.config_path.display());
    let config = Config::new_from_file(&run.config_path)?;

    debug!("Setting memory limit");
    ALLOCATOR
        .set_limit(config.resources.memory.saturating_mul(1024 * 1024))
        .map_err(|_| AppError::MemoryLimit(config.resources.memory))?;

    let dataset_path = run
        .dataset_path
        .clone()
        .or_else(|| config.gfs().zarr_path.clone())
        .ok_or_else(|| {
            ConfigError::InvalidArgument(
                "No dataset path given on the command line or in the configuration".to_string(),
            )
        })?;

    info!("Loading GFS dataset from {}", dataset_path);
    let dataset = open(&dataset_path, &StoreOptions::from(&config.store)).map_err(SamplerError::from)?;
    let dataset = handle_missing(
        dataset,
        config.missing_values.policy()?,
        config.missing_values.fill_value,
    )?;

    let constants = NormalisationConstants::from_config(&config.normalisation)?;
    let sampler = GfsDataSampler::new(dataset, &config, constants, run.start_time, run.end_time)?;

    let mut options = LoaderOptions::new(&config.batching, usize::from(config.resources.threads));
    if let Some(batch_size) = run.batch_size {
        options.batch_size = batch_size.max(1);
    }
    if let Some(num_workers) = run.num_workers {
        options.num_workers = num_workers;
    }
    if run.no_shuffle {
        options.shuffle = false;
    }

    info!("Total samples in dataset: {}", sampler.len());
    info!(
        "Expected number of batches (with batch_size={}): {}",
        options.batch_size,
        expected_batches(sampler.len(), options.batch_size)
    );

    let loader = DataLoader::new(Arc::new(sampler), &options)?;
    let saver = BatchSaver::new(&run.output_directory)?;

    info!(
        "Processing and saving batches to directory: {}",
        run.output_directory.display()
    );
    let saved = process_and_save_batches(&loader, &saver, run.num_batches)?;
    info!("All {} batches processed and saved", saved);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{expected_batches, process_and_save_batches, BatchSaver, DataLoader, LoaderOptions};
    use crate::sampler::configuration::Config;
    use crate::sampler::dataset::testing::dataset;
    use crate::sampler::{GfsDataSampler, NormalisationConstants, Sample};
    use std::sync::Arc;

    const CONFIG: &str = "
input_data:
  nwp:
    gfs:
      provider: gfs
      interval_start_minutes: 0
      interval_end_minutes: 360
      time_resolution_minutes: 180
";

    fn sampler() -> Arc<GfsDataSampler> {
        let config = Config::new_from_slice(CONFIG.as_bytes()).unwrap();
        let sampler =
            GfsDataSampler::new(dataset(), &config, NormalisationConstants::builtin(), None, None)
                .unwrap();

        Arc::new(sampler)
    }

    fn options(batch_size: usize, shuffle: bool, seed: Option<u64>) -> LoaderOptions {
        LoaderOptions {
            batch_size,
            shuffle,
            seed,
            num_workers: 2,
        }
    }

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(expected_batches(0, 4), 0);
        assert_eq!(expected_batches(4, 4), 1);
        assert_eq!(expected_batches(5, 4), 2);
        assert_eq!(expected_batches(9, 2), 5);
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let loader = DataLoader::new(sampler(), &options(3, true, Some(7))).unwrap();

        assert_eq!(loader.len(), expected_batches(4, 3));
        assert_eq!(loader.batch_indices()[0].len(), 3);
        assert_eq!(loader.batch_indices()[1].len(), 1);

        let mut seen: Vec<usize> = loader.batch_indices().concat();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let first = DataLoader::new(sampler(), &options(1, true, Some(42))).unwrap();
        let second = DataLoader::new(sampler(), &options(1, true, Some(42))).unwrap();

        assert_eq!(first.batch_indices(), second.batch_indices());
    }

    #[test]
    fn batches_keep_index_order() {
        let sampler = sampler();
        let loader = DataLoader::new(Arc::clone(&sampler), &options(4, false, None)).unwrap();

        let batch = loader.batch(0).unwrap();
        let expected: Vec<Sample> = (0..4).map(|i| sampler.get(i).unwrap()).collect();

        assert_eq!(batch, expected);
        assert!(loader.batch(1).is_err());
    }

    #[test]
    fn saves_requested_number_of_batches() {
        let dir = tempfile::tempdir().unwrap();
        let saver = BatchSaver::new(dir.path()).unwrap();
        let loader = DataLoader::new(sampler(), &options(1, true, Some(1))).unwrap();

        let saved = process_and_save_batches(&loader, &saver, Some(3)).unwrap();

        assert_eq!(saved, 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);

        for n in 0..3 {
            let data = std::fs::read(saver.path(n)).unwrap();
            let batch: serde_json::Value = serde_json::from_slice(&data).unwrap();
            assert_eq!(batch.as_array().map(Vec::len), Some(1));
        }
    }

    #[test]
    fn saves_all_batches_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let saver = BatchSaver::new(dir.path()).unwrap();
        let loader = DataLoader::new(sampler(), &options(3, false, None)).unwrap();

        let saved = process_and_save_batches(&loader, &saver, None).unwrap();

        assert_eq!(saved, 2);
        assert!(saver.path(1).is_file());
        assert!(!saver.path(2).exists());
    }
}
