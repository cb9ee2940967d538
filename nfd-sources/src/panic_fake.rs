//! Feature source that panics on discovery, only activated when explicitly
//! requested. Exercises the worker's per-source failure isolation.

use anyhow::Result;
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};

#[derive(Default)]
pub struct PanicFakeSource;

impl PanicFakeSource {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureSource for PanicFakeSource {
    fn name(&self) -> &'static str {
        "panic_fake"
    }

    fn discover(&mut self) -> Result<Features> {
        panic!("fake panic error")
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}
}
