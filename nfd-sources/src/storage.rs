//! Storage feature source: detects non-rotational block devices

use crate::fsutil::{host_path, read_trimmed, sorted_entries, HOST_ROOT};
use anyhow::{Context, Result};
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use std::path::PathBuf;

pub struct StorageSource {
    root: PathBuf,
}

impl StorageSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for StorageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for StorageSource {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn discover(&mut self) -> Result<Features> {
        let dir = host_path(&self.root, "/sys/block");
        let devices = sorted_entries(&dir).context("Failed to list block devices")?;

        let non_rotational = devices.iter().any(|dev| {
            read_trimmed(&dev.join("queue/rotational"))
                .map(|v| v == "0")
                .unwrap_or(false)
        });

        let mut features = Features::new();
        if non_rotational {
            features.insert("nonrotationaldisk".to_string(), true.into());
        }
        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}
}
