//! Kubernetes label syntax validation
//!
//! Mirrors the apimachinery rules for label keys ("qualified names") and
//! label values. Each check returns the list of violations; an empty list
//! means the input is valid.

use regex::Regex;
use std::sync::OnceLock;

const QUALIFIED_NAME_FMT: &str = "([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]";
const QUALIFIED_NAME_MAX_LEN: usize = 63;
const LABEL_VALUE_MAX_LEN: usize = 63;
const DNS1123_SUBDOMAIN_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?(\\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*";
const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

fn qualified_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^{}$", QUALIFIED_NAME_FMT)).expect("qualified name regex is valid")
    })
}

fn label_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^({})?$", QUALIFIED_NAME_FMT)).expect("label value regex is valid")
    })
}

fn dns1123_subdomain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^{}$", DNS1123_SUBDOMAIN_FMT)).expect("subdomain regex is valid")
    })
}

/// Validate a label key: an optional DNS subdomain prefix and `/`, then a name
pub fn is_qualified_name(value: &str) -> Vec<String> {
    let mut errs = Vec::new();
    let parts: Vec<&str> = value.split('/').collect();

    let name = match parts.as_slice() {
        [name] => *name,
        [prefix, name] => {
            if prefix.is_empty() {
                errs.push("prefix part must be non-empty".to_string());
            } else {
                for msg in is_dns1123_subdomain(prefix) {
                    errs.push(format!("prefix part {}", msg));
                }
            }
            *name
        }
        _ => {
            errs.push(format!(
                "a qualified name must consist of alphanumeric characters, '-', '_' or '.', \
                 and must start and end with an alphanumeric character (regex used for \
                 validation is '{}') with an optional DNS subdomain prefix and '/' \
                 (e.g. 'example.com/MyName')",
                QUALIFIED_NAME_FMT
            ));
            return errs;
        }
    };

    if name.is_empty() {
        errs.push("name part must be non-empty".to_string());
    } else if name.len() > QUALIFIED_NAME_MAX_LEN {
        errs.push(format!(
            "name part must be no more than {} characters",
            QUALIFIED_NAME_MAX_LEN
        ));
    }

    if !qualified_name_regex().is_match(name) {
        errs.push(format!(
            "name part must consist of alphanumeric characters, '-', '_' or '.', and must \
             start and end with an alphanumeric character (regex used for validation is '{}')",
            QUALIFIED_NAME_FMT
        ));
    }

    errs
}

/// Validate a label value: at most 63 characters, empty allowed
pub fn is_valid_label_value(value: &str) -> Vec<String> {
    let mut errs = Vec::new();

    if value.len() > LABEL_VALUE_MAX_LEN {
        errs.push(format!(
            "must be no more than {} characters",
            LABEL_VALUE_MAX_LEN
        ));
    }

    if !label_value_regex().is_match(value) {
        errs.push(format!(
            "a valid label must be an empty string or consist of alphanumeric characters, \
             '-', '_' or '.', and must start and end with an alphanumeric character (regex \
             used for validation is '({})?')",
            QUALIFIED_NAME_FMT
        ));
    }

    errs
}

fn is_dns1123_subdomain(value: &str) -> Vec<String> {
    let mut errs = Vec::new();

    if value.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        errs.push(format!(
            "must be no more than {} characters",
            DNS1123_SUBDOMAIN_MAX_LEN
        ));
    }

    if !dns1123_subdomain_regex().is_match(value) {
        errs.push(format!(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric \
             characters, '-' or '.', and must start and end with an alphanumeric character \
             (regex used for validation is '{}')",
            DNS1123_SUBDOMAIN_FMT
        ));
    }

    errs
}
