//! PCI feature source
//!
//! Publishes `<fields>.present` for every PCI device whose class matches the
//! configured class whitelist, e.g. `0300_10de.present`.

use crate::fsutil::{host_path, read_trimmed, sorted_entries, strip_hex_prefix, HOST_ROOT};
use anyhow::{Context, Result};
use log::{debug, warn};
use nfd_common::{downcast_config, FeatureSource, Features, SourceConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// sysfs attributes usable as label fields
pub(crate) const PCI_ATTRS: [&str; 5] = [
    "class",
    "vendor",
    "device",
    "subsystem_vendor",
    "subsystem_device",
];

const DEFAULT_LABEL_FIELDS: [&str; 2] = ["class", "vendor"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PciConfig {
    /// Class code prefixes of devices to report
    pub device_class_whitelist: Vec<String>,
    /// Attributes joined with `_` to form the label name
    pub device_label_fields: Vec<String>,
}

impl Default for PciConfig {
    fn default() -> Self {
        Self {
            device_class_whitelist: ["03", "0b40", "12"].iter().map(|s| s.to_string()).collect(),
            device_label_fields: DEFAULT_LABEL_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A PCI device with its normalised id attributes
#[derive(Debug, Clone, Default)]
pub(crate) struct PciDevice {
    attrs: BTreeMap<&'static str, String>,
}

impl PciDevice {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Read all devices from `/sys/bus/pci/devices`
pub(crate) fn scan_pci_devices(root: &Path) -> Result<Vec<PciDevice>> {
    let dir = host_path(root, "/sys/bus/pci/devices");
    let entries = sorted_entries(&dir).context("Failed to scan PCI devices")?;

    let mut devices = Vec::new();
    for entry in entries {
        let mut device = PciDevice::default();
        for attr in PCI_ATTRS {
            match read_trimmed(&entry.join(attr)) {
                Ok(value) => {
                    let mut value = strip_hex_prefix(&value).to_string();
                    if attr == "class" {
                        // Drop the programming interface byte: 0x030000 -> 0300
                        value.truncate(4);
                    }
                    device.attrs.insert(attr, value);
                }
                Err(e) => debug!("No {} for PCI device {}: {}", attr, entry.display(), e),
            }
        }

        if device.attr("class").is_some() {
            devices.push(device);
        }
    }

    Ok(devices)
}

pub struct PciSource {
    root: PathBuf,
    config: PciConfig,
}

impl PciSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            config: PciConfig::default(),
        }
    }

    fn label_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        for field in &self.config.device_label_fields {
            if PCI_ATTRS.contains(&field.as_str()) {
                fields.push(field.as_str());
            } else {
                warn!("Invalid PCI label field {:?}, ignoring it", field);
            }
        }
        if fields.is_empty() {
            warn!("No valid PCI label fields specified, using defaults");
            fields = DEFAULT_LABEL_FIELDS.to_vec();
        }
        fields
    }
}

impl Default for PciSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for PciSource {
    fn name(&self) -> &'static str {
        "pci"
    }

    fn discover(&mut self) -> Result<Features> {
        let fields = self.label_fields();
        let mut features = Features::new();

        for device in scan_pci_devices(&self.root)? {
            let class = device.attr("class").unwrap_or_default();
            if !self
                .config
                .device_class_whitelist
                .iter()
                .any(|prefix| class.starts_with(prefix.as_str()))
            {
                continue;
            }

            let parts: Option<Vec<&str>> = fields.iter().map(|f| device.attr(f)).collect();
            match parts {
                Some(parts) => {
                    features.insert(format!("{}.present", parts.join("_")), true.into());
                }
                None => debug!("PCI device {:?} lacks some label fields", device),
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(PciConfig::default())
    }

    fn set_config(&mut self, config: &dyn SourceConfig) {
        match downcast_config::<PciConfig>(config) {
            Some(config) => self.config = config,
            None => warn!("Ignoring config of unexpected type for source {}", self.name()),
        }
    }
}
