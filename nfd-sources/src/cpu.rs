//! CPU feature source
//!
//! Reports CPUID flags from `/proc/cpuinfo` and whether hardware
//! multithreading is enabled.

use crate::fsutil::{host_path, read_trimmed, HOST_ROOT};
use anyhow::{Context, Result};
use log::warn;
use nfd_common::{downcast_config, FeatureSource, Features, SourceConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Flags that are present on virtually every x86 CPU and only add noise
const DEFAULT_ATTRIBUTE_BLACKLIST: [&str; 21] = [
    "BMI1", "BMI2", "CLMUL", "CMOV", "CX16", "ERMS", "F16C", "HT", "LZCNT", "MMX", "MMXEXT",
    "NX", "POPCNT", "RDRAND", "RDSEED", "RDTSCP", "SSE", "SSE2", "SSE3", "SSE4_1", "SSE4_2",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuidConfig {
    pub attribute_blacklist: Vec<String>,
    /// When non-empty only these flags are reported and the blacklist is ignored
    pub attribute_whitelist: Vec<String>,
}

impl Default for CpuidConfig {
    fn default() -> Self {
        Self {
            attribute_blacklist: DEFAULT_ATTRIBUTE_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            attribute_whitelist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub cpuid: CpuidConfig,
}

pub struct CpuSource {
    root: PathBuf,
    config: CpuConfig,
}

impl CpuSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    /// Create a source reading below a custom host root (for testing)
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            config: CpuConfig::default(),
        }
    }

    fn is_reported(&self, flag: &str) -> bool {
        let cpuid = &self.config.cpuid;
        if !cpuid.attribute_whitelist.is_empty() {
            return cpuid.attribute_whitelist.iter().any(|f| f == flag);
        }
        !cpuid.attribute_blacklist.iter().any(|f| f == flag)
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for CpuSource {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn discover(&mut self) -> Result<Features> {
        let path = host_path(&self.root, "/proc/cpuinfo");
        let cpuinfo = read_trimmed(&path).context(format!("Failed to read {:?}", path))?;

        // The first processor block is representative for the whole node
        let first = cpuinfo.split("\n\n").next().unwrap_or("");

        let mut flags = "";
        let mut siblings: Option<u32> = None;
        let mut cores: Option<u32> = None;
        for line in first.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "flags" | "Features" => flags = value.trim(),
                "siblings" => siblings = value.trim().parse().ok(),
                "cpu cores" => cores = value.trim().parse().ok(),
                _ => {}
            }
        }

        let mut features = Features::new();
        for flag in flags.split_whitespace() {
            let flag = flag.to_uppercase();
            if self.is_reported(&flag) {
                features.insert(format!("cpuid.{}", flag), true.into());
            }
        }

        if let (Some(siblings), Some(cores)) = (siblings, cores) {
            if siblings > cores {
                features.insert("hardware_multithreading".to_string(), true.into());
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(CpuConfig::default())
    }

    fn set_config(&mut self, config: &dyn SourceConfig) {
        match downcast_config::<CpuConfig>(config) {
            Some(config) => self.config = config,
            None => warn!("Ignoring config of unexpected type for source {}", self.name()),
        }
    }
}
