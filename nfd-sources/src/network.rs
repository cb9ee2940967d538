//! Network feature source: SR-IOV capability of network devices

use crate::fsutil::{host_path, read_trimmed, sorted_entries, HOST_ROOT};
use anyhow::{Context, Result};
use log::debug;
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use std::path::{Path, PathBuf};

pub struct NetworkSource {
    root: PathBuf,
}

impl NetworkSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

fn read_count(path: &Path) -> Option<u32> {
    read_trimmed(path).ok()?.parse().ok()
}

impl FeatureSource for NetworkSource {
    fn name(&self) -> &'static str {
        "network"
    }

    fn discover(&mut self) -> Result<Features> {
        let dir = host_path(&self.root, "/sys/class/net");
        let interfaces = sorted_entries(&dir).context("Failed to list network interfaces")?;

        let mut features = Features::new();
        for iface in interfaces {
            let total_vfs = match read_count(&iface.join("device/sriov_totalvfs")) {
                Some(n) if n > 0 => n,
                _ => continue,
            };
            debug!("{} supports {} SR-IOV virtual functions", iface.display(), total_vfs);
            features.insert("sriov.capable".to_string(), true.into());

            if read_count(&iface.join("device/sriov_numvfs")).unwrap_or(0) > 0 {
                features.insert("sriov.configured".to_string(), true.into());
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}
}
