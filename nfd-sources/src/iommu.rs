//! IOMMU feature source

use crate::fsutil::{host_path, sorted_entries, HOST_ROOT};
use anyhow::{Context, Result};
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use std::path::PathBuf;

pub struct IommuSource {
    root: PathBuf,
}

impl IommuSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for IommuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for IommuSource {
    fn name(&self) -> &'static str {
        "iommu"
    }

    fn discover(&mut self) -> Result<Features> {
        let dir = host_path(&self.root, "/sys/class/iommu");
        let devices = sorted_entries(&dir).context("Failed to check for IOMMU support")?;

        let mut features = Features::new();
        if !devices.is_empty() {
            features.insert("enabled".to_string(), true.into());
        }
        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}
}
