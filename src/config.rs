use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dictionary::MAX_TABLE_SIZE;
use crate::error::{HashdexError, Result};

/// Default number of slots in each segment's dictionary.
pub const DEFAULT_TABLE_SIZE: u64 = 611_953;

/// Default number of tokens a segment may absorb before rolling over.
pub const DEFAULT_TOKEN_BUDGET: u64 = 10_000_000;

/// Configuration for a persistent index.
///
/// `table_size` is fixed once the first segment is written; reopening an
/// index with a different value is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the segment files.
    pub index_dir: PathBuf,

    /// Number of slots in each dictionary file.
    #[serde(default = "default_table_size")]
    pub table_size: u64,

    /// Tokens accepted by a segment before it is flushed.
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,

    /// Number of background compaction workers.
    #[serde(default = "default_merge_workers")]
    pub merge_workers: usize,

    /// Attempts made for a delete or rename before giving up.
    #[serde(default = "default_fs_retry_limit")]
    pub fs_retry_limit: u32,

    /// Base delay between delete/rename attempts, in milliseconds.
    #[serde(default = "default_fs_retry_delay_ms")]
    pub fs_retry_delay_ms: u64,
}

fn default_table_size() -> u64 {
    DEFAULT_TABLE_SIZE
}

fn default_token_budget() -> u64 {
    DEFAULT_TOKEN_BUDGET
}

fn default_merge_workers() -> usize {
    2
}

fn default_fs_retry_limit() -> u32 {
    10
}

fn default_fs_retry_delay_ms() -> u64 {
    1000
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            index_dir: PathBuf::from("./index"),
            table_size: DEFAULT_TABLE_SIZE,
            token_budget: DEFAULT_TOKEN_BUDGET,
            merge_workers: default_merge_workers(),
            fs_retry_limit: default_fs_retry_limit(),
            fs_retry_delay_ms: default_fs_retry_delay_ms(),
        }
    }
}

impl IndexConfig {
    /// Create a configuration with default knobs rooted at `index_dir`.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        IndexConfig {
            index_dir: index_dir.into(),
            ..Default::default()
        }
    }

    pub fn builder(index_dir: impl Into<PathBuf>) -> IndexConfigBuilder {
        IndexConfigBuilder {
            config: IndexConfig::new(index_dir),
        }
    }

    /// Check that every knob has a usable value.
    pub fn validate(&self) -> Result<()> {
        if self.table_size == 0 {
            return Err(HashdexError::invalid_config("table_size must be positive"));
        }
        if self.table_size > MAX_TABLE_SIZE {
            return Err(HashdexError::invalid_config(format!(
                "table_size must not exceed {MAX_TABLE_SIZE}"
            )));
        }
        if self.token_budget == 0 {
            return Err(HashdexError::invalid_config("token_budget must be positive"));
        }
        if self.merge_workers == 0 {
            return Err(HashdexError::invalid_config(
                "merge_workers must be at least 1",
            ));
        }
        if self.fs_retry_limit == 0 {
            return Err(HashdexError::invalid_config(
                "fs_retry_limit must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn fs_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fs_retry_delay_ms)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: IndexConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Builder for [`IndexConfig`].
#[derive(Debug, Clone)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn table_size(mut self, table_size: u64) -> Self {
        self.config.table_size = table_size;
        self
    }

    pub fn token_budget(mut self, token_budget: u64) -> Self {
        self.config.token_budget = token_budget;
        self
    }

    pub fn merge_workers(mut self, merge_workers: usize) -> Self {
        self.config.merge_workers = merge_workers;
        self
    }

    pub fn fs_retry_limit(mut self, limit: u32) -> Self {
        self.config.fs_retry_limit = limit;
        self
    }

    pub fn fs_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.fs_retry_delay_ms = delay_ms;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
