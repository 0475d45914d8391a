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

//! Writing of batches to numbered JSON files.

use crate::constants::BATCH_INDEX_WIDTH;
use crate::errors::BatchError;
use crate::sampler::Sample;
use log::debug;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Saves batches as `batch_{index}.json` files in one directory.
#[derive(Clone, Debug)]
pub struct BatchSaver {
    output_dir: PathBuf,
}

impl BatchSaver {
    /// Creates the output directory if it does not exist.
    /// Existing batch files in it are overwritten when saved again.
    pub fn new(output_dir: &Path) -> Result<Self, BatchError> {
        fs::create_dir_all(output_dir)?;

        Ok(BatchSaver {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn file_name(batch_num: usize) -> String {
        format!("batch_{:0width$}.json", batch_num, width = BATCH_INDEX_WIDTH)
    }

    pub fn path(&self, batch_num: usize) -> PathBuf {
        self.output_dir.join(BatchSaver::file_name(batch_num))
    }

    /// Writes `batch` as a JSON list of samples.
    pub fn save(&self, batch: &[Sample], batch_num: usize) -> Result<PathBuf, BatchError> {
        let path = self.path(batch_num);
        debug!("Saving batch {} to {}", batch_num, path.display());

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, batch)?;
        writer.flush()?;

        Ok(path)
    }
}
