//! Feature aggregation
//!
//! Turns the raw features of every active source into one validated,
//! whitelisted label set. A failing or panicking source only loses its own
//! contribution for the cycle.

use crate::error::{Result, WorkerError};
use log::{info, warn};
use nfd_common::validation::{is_qualified_name, is_valid_label_value};
use nfd_common::FeatureSource;
use regex::Regex;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Label name to value, the payload of a labeling request
pub type Labels = BTreeMap<String, String>;

/// Run discovery on all sources and merge the results in source order.
pub fn discover_all(sources: &mut [Box<dyn FeatureSource>], whitelist: &Regex) -> Labels {
    let mut labels = Labels::new();

    for source in sources.iter_mut() {
        match discover_one(source.as_mut(), whitelist) {
            Ok(source_labels) => {
                for (name, value) in source_labels {
                    info!("{} = {}", name, value);
                    labels.insert(name, value);
                }
            }
            Err(e) => {
                warn!("{}", e);
                warn!("continuing ...");
            }
        }
    }

    labels
}

/// Discover and label the features of a single source.
pub fn discover_one(source: &mut dyn FeatureSource, whitelist: &Regex) -> Result<Labels> {
    let name = source.name();

    let features = catch_unwind(AssertUnwindSafe(|| source.discover()))
        .map_err(|payload| WorkerError::SourcePanic {
            name: name.to_string(),
            message: panic_message(payload.as_ref()),
        })?
        .map_err(|e| WorkerError::SourceFailed {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })?;

    let prefix = if source.prefix_labels() {
        format!("{}-", name)
    } else {
        String::new()
    };

    let mut labels = Labels::new();
    for (key, value) in features {
        // Keys with an explicit namespace are used verbatim. The dummy "ns/"
        // lets the name part of unqualified keys be validated on its own.
        let (label, name_for_validation, name_for_whitelist) = match key.split_once('/') {
            Some((_, local_name)) => (key.clone(), key.clone(), local_name.to_string()),
            None => {
                let label = format!("{}{}", prefix, key);
                (label.clone(), format!("ns/{}", label), label)
            }
        };

        let errs = is_qualified_name(&name_for_validation);
        if !errs.is_empty() {
            warn!("Ignoring invalid feature name '{}': {:?}", label, errs);
            continue;
        }

        let value = value.to_string();
        let errs = is_valid_label_value(&value);
        if !errs.is_empty() {
            warn!("Ignoring invalid feature value {}={}: {:?}", label, value, errs);
            continue;
        }

        if !whitelist.is_match(&name_for_whitelist) {
            warn!(
                "{:?} does not match the whitelist ({}) and will not be published.",
                name_for_whitelist,
                whitelist.as_str()
            );
            continue;
        }

        labels.insert(label, value);
    }

    Ok(labels)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
