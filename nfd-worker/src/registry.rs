//! Feature source registry
//!
//! Holds the fixed, ordered list of known sources and resolves the active
//! subset from the `--sources` argument. The order is the label override
//! precedence: a source later in the list wins over an earlier one.

use log::warn;
use nfd_common::FeatureSource;
use nfd_sources::{
    CpuSource, CustomSource, FakeSource, IommuSource, KernelSource, LocalSource, MemorySource,
    NetworkSource, PanicFakeSource, PciSource, StorageSource, SystemSource, UsbSource,
};
use std::collections::BTreeSet;

/// Sentinel activating every production source
pub const ALL_SOURCES: &str = "all";

/// Production sources in canonical order. `local` is last so that its labels
/// override those of every other source.
pub fn production_sources() -> Vec<Box<dyn FeatureSource>> {
    vec![
        Box::new(CpuSource::new()),
        Box::new(IommuSource::new()),
        Box::new(KernelSource::new()),
        Box::new(MemorySource::new()),
        Box::new(NetworkSource::new()),
        Box::new(PciSource::new()),
        Box::new(StorageSource::new()),
        Box::new(SystemSource::new()),
        Box::new(UsbSource::new()),
        Box::new(CustomSource::new()),
        Box::new(LocalSource::new()),
    ]
}

/// Sources meant for testing, only activated when named explicitly
pub fn testing_sources() -> Vec<Box<dyn FeatureSource>> {
    vec![Box::new(FakeSource::new()), Box::new(PanicFakeSource::new())]
}

/// Resolve the active sources for the requested names.
///
/// `["all"]` activates every production source. Otherwise the named sources
/// are activated in canonical order, regardless of the order requested.
pub fn select_sources(requested: &[String]) -> Vec<Box<dyn FeatureSource>> {
    select_from(production_sources(), testing_sources(), requested)
}

fn select_from(
    production: Vec<Box<dyn FeatureSource>>,
    testing: Vec<Box<dyn FeatureSource>>,
    requested: &[String],
) -> Vec<Box<dyn FeatureSource>> {
    if let [only] = requested {
        if only.trim() == ALL_SOURCES {
            return production;
        }
    }

    let mut wanted: BTreeSet<&str> = requested
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let mut active = Vec::new();
    for source in production.into_iter().chain(testing) {
        if wanted.remove(source.name()) {
            active.push(source);
        }
    }

    if !wanted.is_empty() {
        let names: Vec<&str> = wanted.into_iter().collect();
        warn!(
            "skipping unknown source(s) {:?} specified in --sources",
            names.join(", ")
        );
    }

    active
}
