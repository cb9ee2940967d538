//! Shared types between the nfd worker and its feature sources
//!
//! This crate defines:
//! - The `FeatureSource` contract every probe implements
//! - `FeatureValue`, the raw datum a probe reports for a feature
//! - `SourceConfig`, the type-erased per-source configuration blob
//! - Kubernetes label name/value syntax validators

pub mod config;
pub mod source;
pub mod validation;

pub use config::{downcast_config, merge_yaml, NoConfig, SourceConfig};
pub use source::{FeatureSource, FeatureValue, Features};
