//! Worker configuration
//!
//! A configuration is rebuilt from scratch on every reload: per-source
//! defaults, then the config file, then the `--options` override string.
//!
//! ```yaml
//! core:
//!   noPublish: false
//! sources:
//!   cpu:
//!     cpuid:
//!       attributeWhitelist: ["AVX512F"]
//!   pci:
//!     deviceClassWhitelist: ["0200", "03"]
//! ```

use log::{debug, info, warn};
use nfd_common::{FeatureSource, SourceConfig};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0} section must be a mapping")]
    NotAMapping(&'static str),

    #[error("failed to parse core config: {0}")]
    Core(serde_yaml::Error),

    #[error("failed to parse {name:?} source config: {source}")]
    Source {
        name: String,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Dry-run: discover features but never talk to the labeler service
    pub no_publish: bool,
}

/// Per-source configuration, keyed by source name
#[derive(Debug, Default)]
pub struct SourcesConfig {
    configs: BTreeMap<String, Box<dyn SourceConfig>>,
}

impl SourcesConfig {
    /// Zero-value configuration of every given source
    pub fn defaults(sources: &[Box<dyn FeatureSource>]) -> Self {
        Self {
            configs: sources
                .iter()
                .map(|s| (s.name().to_string(), s.new_config()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn SourceConfig> {
        self.configs.get(name).map(|c| c.as_ref())
    }

    /// Overlay a `sources` section. Sections of unknown sources are ignored.
    /// A section that fails to decode keeps its previous value; the first
    /// such error is returned after all other sections have been applied.
    fn apply(&mut self, section: Value) -> Result<(), ConfigError> {
        let section = match section {
            Value::Null => return Ok(()),
            Value::Mapping(m) => m,
            _ => return Err(ConfigError::NotAMapping("sources")),
        };

        let mut first_err = None;
        for (key, value) in section {
            let Some(name) = key.as_str() else {
                debug!("Ignoring non-string source key {:?}", key);
                continue;
            };
            let Some(config) = self.configs.get_mut(name) else {
                debug!("Ignoring config of inactive or unknown source {:?}", name);
                continue;
            };
            if let Err(e) = config.overlay(value) {
                first_err.get_or_insert(ConfigError::Source {
                    name: name.to_string(),
                    source: e,
                });
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl Clone for SourcesConfig {
    fn clone(&self) -> Self {
        Self {
            configs: self
                .configs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone_config()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub core: CoreConfig,
    pub sources: SourcesConfig,
}

impl WorkerConfig {
    pub fn with_defaults(sources: &[Box<dyn FeatureSource>]) -> Self {
        Self {
            core: CoreConfig::default(),
            sources: SourcesConfig::defaults(sources),
        }
    }

    /// Layer a YAML document on top of this configuration.
    ///
    /// A document that is not valid YAML changes nothing. Otherwise every
    /// section that decodes is applied and the first failure is returned.
    pub fn apply_document(&mut self, document: &str) -> Result<(), ConfigError> {
        let root = match serde_yaml::from_str::<Value>(document)? {
            Value::Null => return Ok(()),
            Value::Mapping(m) => m,
            _ => return Err(ConfigError::NotAMapping("top level")),
        };

        let mut first_err = None;
        for (key, value) in root {
            let result = match key.as_str() {
                Some("core" | "Core") => self.core.overlay(value).map_err(ConfigError::Core),
                Some("sources" | "Sources") => self.sources.apply(value),
                _ => {
                    debug!("Ignoring unknown config key {:?}", key);
                    Ok(())
                }
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Hand every source its section of this configuration
    pub fn configure_sources(&self, sources: &mut [Box<dyn FeatureSource>]) {
        for source in sources.iter_mut() {
            if let Some(config) = self.sources.get(source.name()) {
                source.set_config(config);
            }
        }
    }
}

/// Build a fresh configuration from defaults, the config file and the
/// override document, then push it to the sources.
///
/// Unreadable or malformed layers are logged and skipped. `forced_no_publish`
/// (the deprecated `--no-publish` flag) wins over both layers.
pub fn reconfigure(
    path: &Path,
    overrides: &str,
    sources: &mut [Box<dyn FeatureSource>],
    forced_no_publish: Option<bool>,
) -> WorkerConfig {
    let mut config = WorkerConfig::with_defaults(sources);

    match fs::read_to_string(path) {
        Ok(data) => match config.apply_document(&data) {
            Ok(()) => info!("Configuration successfully loaded from {:?}", path),
            Err(e) => warn!("Failed to parse config file: {}", e),
        },
        Err(e) => warn!("Failed to read config file {:?}: {}", path, e),
    }

    if let Err(e) = config.apply_document(overrides) {
        warn!("Failed to parse --options: {}", e);
    }

    if let Some(no_publish) = forced_no_publish {
        config.core.no_publish = no_publish;
    }

    config.configure_sources(sources);
    config
}
