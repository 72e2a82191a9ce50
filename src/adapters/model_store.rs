//! On-disk bundle of exported models: `model_<i>.json` boosters, the bar
//! history needed to warm up features (`history.tsv`) and the predictor's
//! last direction (`state.json`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapters::csv_adapter::{read_ohlcv, write_ohlcv};
use crate::domain::error::AlphalabError;
use crate::domain::gbm::Booster;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::strategy::Direction;

const HISTORY_FILE: &str = "history.tsv";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PredictorState {
    direction: Direction,
}

pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn model_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("model_{}.json", index))
    }

    /// Replace the bundle's models with `models`, numbered from 0 in order.
    pub fn save_models(&self, models: &[Booster]) -> Result<(), AlphalabError> {
        fs::create_dir_all(&self.dir)?;
        for stale in self.model_files()? {
            fs::remove_file(stale.1)?;
        }
        for (i, model) in models.iter().enumerate() {
            fs::write(self.model_path(i), model.to_json()?)?;
        }
        info!(dir = %self.dir.display(), count = models.len(), "saved models");
        Ok(())
    }

    fn model_files(&self) -> Result<Vec<(usize, PathBuf)>, AlphalabError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let index = name
                .strip_prefix("model_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(i) = index {
                files.push((i, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Models in index order. At least one must exist.
    pub fn load_models(&self) -> Result<Vec<Booster>, AlphalabError> {
        let files = self.model_files()?;
        if files.is_empty() {
            return Err(AlphalabError::model(format!(
                "no models in {}",
                self.dir.display()
            )));
        }
        files
            .iter()
            .map(|(_, path)| Booster::from_json(&fs::read_to_string(path)?))
            .collect()
    }

    pub fn save_history(&self, bars: &[OhlcvBar]) -> Result<(), AlphalabError> {
        write_ohlcv(&self.dir.join(HISTORY_FILE), bars)
    }

    pub fn load_history(&self, symbol: &str) -> Result<Vec<OhlcvBar>, AlphalabError> {
        let path = self.dir.join(HISTORY_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        read_ohlcv(&path, symbol)
    }

    pub fn save_direction(&self, direction: Direction) -> Result<(), AlphalabError> {
        fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string(&PredictorState { direction })
            .map_err(|e| AlphalabError::store(e.to_string()))?;
        fs::write(self.dir.join(STATE_FILE), text)?;
        Ok(())
    }

    /// Last saved direction, flat when none was saved.
    pub fn load_direction(&self) -> Result<Direction, AlphalabError> {
        let path = self.dir.join(STATE_FILE);
        if !path.is_file() {
            return Ok(Direction::Flat);
        }
        let state: PredictorState = serde_json::from_str(&fs::read_to_string(path)?)
            .map_err(|e| AlphalabError::store(format!("{}: {}", STATE_FILE, e)))?;
        Ok(state.direction)
    }
}
