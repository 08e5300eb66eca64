use crate::core::{Result, StoreError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store configuration
///
/// The only two knobs the persistence core needs: where partition files live
/// and how often dirty partitions are flushed.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per partition
    pub data_dir: PathBuf,

    /// Period of the autosave worker
    pub flush_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            flush_interval: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Create a configuration rooted at `data_dir` with the default interval
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the data directory
    pub fn data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    /// Set the flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the flush interval in whole seconds
    pub fn flush_interval_secs(self, secs: u64) -> Self {
        self.flush_interval(Duration::from_secs(secs))
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "data directory must not be empty".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
