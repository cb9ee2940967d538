//! USB feature source
//!
//! Publishes `<fields>.present` for USB devices whose class matches the
//! configured class whitelist.

use crate::fsutil::{host_path, read_trimmed, sorted_entries, HOST_ROOT};
use anyhow::{Context, Result};
use log::{debug, warn};
use nfd_common::{downcast_config, FeatureSource, Features, SourceConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Label field name -> sysfs attribute
const USB_ATTRS: [(&str, &str); 4] = [
    ("class", "bDeviceClass"),
    ("vendor", "idVendor"),
    ("device", "idProduct"),
    ("serial", "serial"),
];

const DEFAULT_LABEL_FIELDS: [&str; 3] = ["class", "vendor", "device"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsbConfig {
    pub device_class_whitelist: Vec<String>,
    pub device_label_fields: Vec<String>,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            device_class_whitelist: ["0e", "ef", "fe", "ff"].iter().map(|s| s.to_string()).collect(),
            device_label_fields: DEFAULT_LABEL_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct UsbSource {
    root: PathBuf,
    config: UsbConfig,
}

impl UsbSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            config: UsbConfig::default(),
        }
    }

    /// Configured fields resolved to sysfs attribute names
    fn label_attrs(&self) -> Vec<&'static str> {
        let lookup = |field: &str| {
            USB_ATTRS
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, attr)| *attr)
        };

        let mut attrs = Vec::new();
        for field in &self.config.device_label_fields {
            match lookup(field.as_str()) {
                Some(attr) => attrs.push(attr),
                None => warn!("Invalid USB label field {:?}, ignoring it", field),
            }
        }
        if attrs.is_empty() {
            warn!("No valid USB label fields specified, using defaults");
            attrs = DEFAULT_LABEL_FIELDS.iter().filter_map(|f| lookup(*f)).collect();
        }
        attrs
    }
}

impl Default for UsbSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for UsbSource {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn discover(&mut self) -> Result<Features> {
        let dir = host_path(&self.root, "/sys/bus/usb/devices");
        let devices = sorted_entries(&dir).context("Failed to scan USB devices")?;
        let attrs = self.label_attrs();

        let mut features = Features::new();
        for device in devices {
            // Interfaces and hubs without ids show up in the same directory
            let Ok(class) = read_trimmed(&device.join("bDeviceClass")) else {
                continue;
            };
            if !self
                .config
                .device_class_whitelist
                .iter()
                .any(|prefix| class.starts_with(prefix.as_str()))
            {
                continue;
            }

            let parts: Result<Vec<String>, _> =
                attrs.iter().map(|a| read_trimmed(&device.join(a))).collect();
            match parts {
                Ok(parts) => {
                    features.insert(format!("{}.present", parts.join("_")), true.into());
                }
                Err(e) => debug!("USB device {} lacks label fields: {}", device.display(), e),
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(UsbConfig::default())
    }

    fn set_config(&mut self, config: &dyn SourceConfig) {
        match downcast_config::<UsbConfig>(config) {
            Some(config) => self.config = config,
            None => warn!("Ignoring config of unexpected type for source {}", self.name()),
        }
    }
}
