//! Kernel feature source
//!
//! Reports the running kernel version, selected kconfig options and whether
//! SELinux is enforcing.

use crate::fsutil::{host_path, read_trimmed, HOST_ROOT};
use anyhow::{Context, Result};
use log::{debug, warn};
use nfd_common::{downcast_config, FeatureSource, Features, SourceConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KernelConfig {
    /// Kconfig file to read; empty means `/boot/config-<release>`
    pub kconfig_file: String,
    /// Options reported as `config.<OPT>` when built in or modular
    pub config_opts: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            kconfig_file: String::new(),
            config_opts: ["NO_HZ", "NO_HZ_IDLE", "NO_HZ_FULL", "PREEMPT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub struct KernelSource {
    root: PathBuf,
    config: KernelConfig,
}

impl KernelSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            config: KernelConfig::default(),
        }
    }

    /// Kconfig options set to `y` or `m`
    fn enabled_kconfig_options(&self, release: &str) -> Result<HashSet<String>> {
        let path = if self.config.kconfig_file.is_empty() {
            host_path(&self.root, &format!("/boot/config-{}", release))
        } else {
            host_path(&self.root, &self.config.kconfig_file)
        };

        let contents = read_trimmed(&path).context(format!("Failed to read {:?}", path))?;

        Ok(contents
            .lines()
            .filter_map(|line| line.strip_prefix("CONFIG_"))
            .filter_map(|line| line.split_once('='))
            .filter(|(_, value)| *value == "y" || *value == "m")
            .map(|(opt, _)| opt.to_string())
            .collect())
    }
}

impl Default for KernelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a release string such as `5.4.0-42-generic` into numeric components
fn parse_version(release: &str) -> Vec<String> {
    release
        .split(|c: char| c == '-' || c == '+')
        .next()
        .unwrap_or("")
        .split('.')
        .take(3)
        .map_while(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            (!digits.is_empty()).then_some(digits)
        })
        .collect()
}

impl FeatureSource for KernelSource {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn discover(&mut self) -> Result<Features> {
        let path = host_path(&self.root, "/proc/sys/kernel/osrelease");
        let release = read_trimmed(&path).context("Failed to get kernel version")?;

        let mut features = Features::new();
        features.insert("version.full".to_string(), release.clone().into());
        for (part, value) in ["major", "minor", "revision"]
            .iter()
            .zip(parse_version(&release))
        {
            features.insert(format!("version.{}", part), value.into());
        }

        match self.enabled_kconfig_options(&release) {
            Ok(enabled) => {
                for opt in &self.config.config_opts {
                    if enabled.contains(opt) {
                        features.insert(format!("config.{}", opt), true.into());
                    }
                }
            }
            Err(e) => warn!("Failed to read kconfig: {:#}", e),
        }

        let enforce = host_path(&self.root, "/sys/fs/selinux/enforce");
        match read_trimmed(&enforce) {
            Ok(status) if status == "1" => {
                features.insert("selinux.enabled".to_string(), true.into());
            }
            Ok(_) => {}
            Err(e) => debug!("SELinux status not available: {}", e),
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(KernelConfig::default())
    }

    fn set_config(&mut self, config: &dyn SourceConfig) {
        match downcast_config::<KernelConfig>(config) {
            Some(config) => self.config = config,
            None => warn!("Ignoring config of unexpected type for source {}", self.name()),
        }
    }
}
