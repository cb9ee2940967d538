//! Feature source contract

use crate::config::SourceConfig;
use std::collections::BTreeMap;
use std::fmt;

/// Raw features reported by a single source, keyed by feature name
pub type Features = BTreeMap<String, FeatureValue>;

/// A discovered datum, rendered to a string when turned into a label
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Bool(b) => write!(f, "{}", b),
            FeatureValue::Int(i) => write!(f, "{}", i),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Bool(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Int(value)
    }
}

impl From<u32> for FeatureValue {
    fn from(value: u32) -> Self {
        FeatureValue::Int(value as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Float(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Str(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Str(value)
    }
}

/// A named, stateful probe discovering one category of node features.
///
/// The worker calls [`FeatureSource::new_config`] to obtain the default
/// configuration, layers the configuration document on top of it and hands
/// the result back through [`FeatureSource::set_config`]. The value passed to
/// `set_config` always has the concrete type produced by `new_config`.
pub trait FeatureSource: Send {
    /// Stable identifier, used for label prefixing, selection and config keying
    fn name(&self) -> &'static str;

    /// Discover features. Keys may carry an explicit `namespace/` part.
    fn discover(&mut self) -> anyhow::Result<Features>;

    /// Zero-value configuration of this source
    fn new_config(&self) -> Box<dyn SourceConfig>;

    /// Install a freshly decoded configuration
    fn set_config(&mut self, config: &dyn SourceConfig);

    /// Whether labels of this source get the `<name>-` prefix.
    ///
    /// Only the local hook source opts out, which lets its output override
    /// labels of every other source.
    fn prefix_labels(&self) -> bool {
        true
    }
}
