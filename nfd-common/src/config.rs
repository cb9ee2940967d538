//! Type-erased per-source configuration
//!
//! Every source owns a configuration type of its own. The worker only sees
//! them as `dyn SourceConfig` and layers YAML documents on top of them with
//! [`SourceConfig::overlay`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::any::Any;
use std::fmt::Debug;

/// Configuration blob of a single feature source
pub trait SourceConfig: Any + Send + Debug {
    /// Layer `patch` on top of the current value.
    ///
    /// Mappings are merged key by key, anything else replaces the current
    /// value. On error the configuration is left untouched.
    fn overlay(&mut self, patch: Value) -> Result<(), serde_yaml::Error>;

    /// Clone into a new box
    fn clone_config(&self) -> Box<dyn SourceConfig>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> SourceConfig for T
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    fn overlay(&mut self, patch: Value) -> Result<(), serde_yaml::Error> {
        let mut merged = serde_yaml::to_value(&*self)?;
        merge_yaml(&mut merged, patch);
        *self = serde_yaml::from_value(merged)?;
        Ok(())
    }

    fn clone_config(&self) -> Box<dyn SourceConfig> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Recover the concrete configuration type a source handed out
pub fn downcast_config<T: Clone + 'static>(config: &dyn SourceConfig) -> Option<T> {
    config.as_any().downcast_ref::<T>().cloned()
}

/// Configuration of sources that take no settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoConfig {}

/// Merge `patch` into `base`. `null` in the patch never clears a value.
pub fn merge_yaml(base: &mut Value, patch: Value) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None if !value.is_null() => {
                        base.insert(key, value);
                    }
                    None => {}
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
