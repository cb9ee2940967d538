//! System feature source: operating system release information

use crate::fsutil::{host_path, read_trimmed, HOST_ROOT};
use anyhow::{Context, Result};
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use std::collections::HashMap;
use std::path::PathBuf;

/// os-release keys published as labels
const OS_RELEASE_FIELDS: [&str; 2] = ["ID", "VERSION_ID"];

pub struct SystemSource {
    root: PathBuf,
}

impl SystemSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `KEY=value` lines, stripping optional quotes
fn parse_os_release(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

impl FeatureSource for SystemSource {
    fn name(&self) -> &'static str {
        "system"
    }

    fn discover(&mut self) -> Result<Features> {
        let path = host_path(&self.root, "/etc/os-release");
        let contents = read_trimmed(&path).context("Failed to get os-release")?;
        let release = parse_os_release(&contents);

        let mut features = Features::new();
        for key in OS_RELEASE_FIELDS {
            let Some(value) = release.get(key) else {
                continue;
            };
            features.insert(format!("os_release.{}", key), value.clone().into());

            if key == "VERSION_ID" {
                let mut parts = value.split('.');
                if let Some(major) = parts.next().filter(|p| !p.is_empty()) {
                    features.insert(format!("os_release.{}.major", key), major.into());
                }
                if let Some(minor) = parts.next() {
                    features.insert(format!("os_release.{}.minor", key), minor.into());
                }
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}
}
