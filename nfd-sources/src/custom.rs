//! Custom feature source
//!
//! Evaluates user-defined rules. A rule publishes `<name>` when any of its
//! `matchOn` entries matches; an entry matches when every term it sets
//! matches.
//!
//! ```yaml
//! sources:
//!   custom:
//!     - name: "gpu.nvidia"
//!       matchOn:
//!         - pciId:
//!             class: ["0300"]
//!             vendor: ["10de"]
//!         - loadedKMod: ["nvidia"]
//! ```

use crate::fsutil::{host_path, read_trimmed, HOST_ROOT};
use crate::pci::{scan_pci_devices, PciDevice};
use anyhow::{Context, Result};
use log::warn;
use nfd_common::{downcast_config, FeatureSource, Features, SourceConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// PCI id matcher; empty lists match anything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PciIdRule {
    pub class: Vec<String>,
    pub vendor: Vec<String>,
    pub device: Vec<String>,
}

impl PciIdRule {
    fn matches(&self, device: &PciDevice) -> bool {
        let term = |allowed: &[String], attr: &str| {
            allowed.is_empty()
                || device
                    .attr(attr)
                    .map(|v| allowed.iter().any(|a| a == v))
                    .unwrap_or(false)
        };
        term(&self.class, "class") && term(&self.vendor, "vendor") && term(&self.device, "device")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchRule {
    pub pci_id: Option<PciIdRule>,
    /// Kernel modules that must all be loaded
    pub loaded_k_mod: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomRule {
    pub name: String,
    pub match_on: Vec<MatchRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomConfig(pub Vec<CustomRule>);

pub struct CustomSource {
    root: PathBuf,
    config: CustomConfig,
}

/// Host state the rules are evaluated against, gathered lazily once per cycle
#[derive(Default)]
struct MatchContext {
    pci: Option<Vec<PciDevice>>,
    kmods: Option<HashSet<String>>,
}

impl CustomSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            config: CustomConfig::default(),
        }
    }

    fn loaded_kmods(&self) -> Result<HashSet<String>> {
        let path = host_path(&self.root, "/proc/modules");
        let modules = read_trimmed(&path).context("Failed to read list of loaded modules")?;
        Ok(modules
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }

    fn match_rule(&self, rule: &MatchRule, ctx: &mut MatchContext) -> Result<bool> {
        if let Some(pci_rule) = &rule.pci_id {
            if ctx.pci.is_none() {
                ctx.pci = Some(scan_pci_devices(&self.root)?);
            }
            let devices = ctx.pci.as_deref().unwrap_or_default();
            if !devices.iter().any(|d| pci_rule.matches(d)) {
                return Ok(false);
            }
        }

        if let Some(kmods) = &rule.loaded_k_mod {
            if ctx.kmods.is_none() {
                ctx.kmods = Some(self.loaded_kmods()?);
            }
            let loaded = ctx.kmods.as_ref();
            if !kmods
                .iter()
                .all(|m| loaded.map(|l| l.contains(m)).unwrap_or(false))
            {
                return Ok(false);
            }
        }

        Ok(rule.pci_id.is_some() || rule.loaded_k_mod.is_some())
    }
}

impl Default for CustomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for CustomSource {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn discover(&mut self) -> Result<Features> {
        let mut features = Features::new();
        let mut ctx = MatchContext::default();

        for rule in &self.config.0 {
            let mut matched = false;
            for match_on in &rule.match_on {
                match self.match_rule(match_on, &mut ctx) {
                    Ok(true) => {
                        matched = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Failed to evaluate custom rule {:?}: {:#}", rule.name, e),
                }
            }
            if matched {
                features.insert(rule.name.clone(), true.into());
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(CustomConfig::default())
    }

    fn set_config(&mut self, config: &dyn SourceConfig) {
        match downcast_config::<CustomConfig>(config) {
            Some(config) => self.config = config,
            None => warn!("Ignoring config of unexpected type for source {}", self.name()),
        }
    }
}
