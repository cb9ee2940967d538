//! Memory feature source: NUMA topology and non-volatile memory

use crate::fsutil::{host_path, sorted_entries, HOST_ROOT};
use anyhow::Result;
use log::debug;
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use std::path::{Path, PathBuf};

pub struct MemorySource {
    root: PathBuf,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Count directory entries whose file name satisfies `pred`
fn count_entries(dir: &Path, pred: impl Fn(&str) -> bool) -> usize {
    match sorted_entries(dir) {
        Ok(entries) => entries
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter(|&n| pred(n))
            .count(),
        Err(e) => {
            debug!("Could not read {}: {}", dir.display(), e);
            0
        }
    }
}

fn is_numa_node(name: &str) -> bool {
    name.strip_prefix("node")
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

impl FeatureSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn discover(&mut self) -> Result<Features> {
        let mut features = Features::new();

        let nodes = count_entries(
            &host_path(&self.root, "/sys/devices/system/node"),
            is_numa_node,
        );
        if nodes > 1 {
            features.insert("numa".to_string(), true.into());
        }

        let regions = count_entries(&host_path(&self.root, "/sys/bus/nd/devices"), |n| {
            n.starts_with("region")
        });
        if regions > 0 {
            features.insert("nv.present".to_string(), true.into());
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}
}
