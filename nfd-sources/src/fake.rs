//! Fake feature source, only activated when explicitly requested

use anyhow::Result;
use log::warn;
use nfd_common::{downcast_config, FeatureSource, Features, SourceConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeConfig {
    pub labels: BTreeMap<String, String>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            labels: (1..=3)
                .map(|i| (format!("fakefeature{}", i), "true".to_string()))
                .collect(),
        }
    }
}

#[derive(Default)]
pub struct FakeSource {
    config: FakeConfig,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn discover(&mut self) -> Result<Features> {
        Ok(self
            .config
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().into()))
            .collect())
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(FakeConfig::default())
    }

    fn set_config(&mut self, config: &dyn SourceConfig) {
        match downcast_config::<FakeConfig>(config) {
            Some(config) => self.config = config,
            None => warn!("Ignoring config of unexpected type for source {}", self.name()),
        }
    }
}
