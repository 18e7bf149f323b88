use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::harness::DEFAULT_MIN_RECLAIM_RATIO;
use crate::lob_store::StoreConfig;
use crate::log::DEFAULT_MAX_LOB_SIZE;
use crate::payload::PayloadShape;

/// Growth harness configuration, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Path to the store file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Number of rows updated per iteration
    #[serde(default = "default_rows")]
    pub rows: u64,

    /// Number of update iterations
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Record the store size every N iterations
    #[serde(default = "default_sample_every")]
    pub sample_every: u64,

    /// Pause between iterations in milliseconds
    #[serde(default)]
    pub pause_ms: u64,

    /// Fraction of the file compaction must reclaim to pass verification
    #[serde(default = "default_min_reclaim_ratio")]
    pub min_reclaim_ratio: f64,

    /// Delete an existing store file before starting
    #[serde(default = "default_true")]
    pub fresh: bool,

    /// Payload shape
    #[serde(rename = "payload", default)]
    pub payload: PayloadShape,

    /// Store settings
    #[serde(rename = "store", default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Maximum payload size (bytes)
    #[serde(default = "default_max_lob_size")]
    pub max_lob_size: usize,

    /// Hard cap on the file length (bytes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_len: Option<u64>,

    /// Sync after every put
    #[serde(default)]
    pub sync_on_put: bool,

    /// Compact when an existing store is opened
    #[serde(default)]
    pub compact_on_open: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_lob_size: default_max_lob_size(),
            max_file_len: None,
            sync_on_put: false,
            compact_on_open: false,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            rows: default_rows(),
            iterations: default_iterations(),
            sample_every: default_sample_every(),
            pause_ms: 0,
            min_reclaim_ratio: default_min_reclaim_ratio(),
            fresh: true,
            payload: PayloadShape::default(),
            store: StoreSection::default(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("lobgrowth/growth.lob")
}

fn default_rows() -> u64 {
    1
}

fn default_iterations() -> u64 {
    2000
}

fn default_sample_every() -> u64 {
    10
}

fn default_min_reclaim_ratio() -> f64 {
    DEFAULT_MIN_RECLAIM_RATIO
}

fn default_true() -> bool {
    true
}

fn default_max_lob_size() -> usize {
    DEFAULT_MAX_LOB_SIZE
}

impl HarnessConfig {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(Error::Config("rows must be at least 1".to_string()));
        }
        if self.sample_every == 0 {
            return Err(Error::Config("sample_every must be at least 1".to_string()));
        }
        if self.payload.entries == 0 {
            return Err(Error::Config(
                "payload.entries must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_reclaim_ratio) {
            return Err(Error::Config(format!(
                "min_reclaim_ratio must be between 0 and 1, got {}",
                self.min_reclaim_ratio
            )));
        }
        self.store_config().validate()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_lob_size: self.store.max_lob_size,
            max_file_len: self.store.max_file_len,
            sync_on_put: self.store.sync_on_put,
            compact_on_open: self.store.compact_on_open,
        }
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}
