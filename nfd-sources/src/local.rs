//! Local feature source
//!
//! Collects features from executable hooks and plain feature files placed on
//! the node by the operator. Each output line is `name` or `name=value`; a
//! bare name gets the value `true`. Labels from this source are not prefixed
//! with the source name, so they can override labels of every other source.

use crate::fsutil::{host_path, sorted_entries, HOST_ROOT};
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const HOOK_DIR: &str = "/etc/kubernetes/node-feature-discovery/source.d";
pub const FEATURE_FILES_DIR: &str = "/etc/kubernetes/node-feature-discovery/features.d";

pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(HOST_ROOT))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `name[=value]` lines into `features`
fn parse_features(output: &str, features: &mut Features) {
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.split_once('=') {
            Some((name, value)) => features.insert(name.to_string(), value.into()),
            None => features.insert(line.to_string(), true.into()),
        };
    }
}

/// List a directory, treating a missing directory as empty
fn list_optional_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    match sorted_entries(dir) {
        Ok(entries) => Ok(entries),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist, skipping", dir.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e).context(format!("Failed to list {}", dir.display())),
    }
}

fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn run_hook(path: &Path) -> Result<String> {
    let output = Command::new(path)
        .output()
        .context(format!("Failed to run hook {}", path.display()))?;

    for line in String::from_utf8_lossy(&output.stderr).lines() {
        info!("{}: {}", path.display(), line);
    }

    if !output.status.success() {
        return Err(anyhow!("hook {} exited with {}", path.display(), output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl FeatureSource for LocalSource {
    fn name(&self) -> &'static str {
        "local"
    }

    fn discover(&mut self) -> Result<Features> {
        let mut features = Features::new();

        for hook in list_optional_dir(&host_path(&self.root, HOOK_DIR))? {
            if !is_executable_file(&hook) {
                debug!("Skipping non-executable hook {}", hook.display());
                continue;
            }
            match run_hook(&hook) {
                Ok(output) => parse_features(&output, &mut features),
                Err(e) => warn!("{:#}", e),
            }
        }

        for file in list_optional_dir(&host_path(&self.root, FEATURE_FILES_DIR))? {
            if !file.is_file() {
                continue;
            }
            match fs::read_to_string(&file) {
                Ok(contents) => parse_features(&contents, &mut features),
                Err(e) => warn!("Failed to read feature file {}: {}", file.display(), e),
            }
        }

        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {}

    fn prefix_labels(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::write_host_file;

    #[test]
    fn test_parse_features() {
        let mut features = Features::new();
        parse_features("flag\n\n  key=value  \nexample.com/ns=1\n", &mut features);

        assert_eq!(features.get("flag"), Some(&true.into()));
        assert_eq!(features.get("key"), Some(&"value".into()));
        assert_eq!(features.get("example.com/ns"), Some(&"1".into()));
    }

    #[test]
    fn test_feature_files() {
        let root = tempfile::tempdir().unwrap();
        write_host_file(
            root.path(),
            &format!("{}/gpu", FEATURE_FILES_DIR),
            "cpu-model=arm64\naccelerator\n",
        );

        let mut source = LocalSource::with_root(root.path().to_path_buf());
        let features = source.discover().unwrap();
        assert_eq!(features.get("cpu-model"), Some(&"arm64".into()));
        assert_eq!(features.get("accelerator"), Some(&true.into()));
        assert!(!source.prefix_labels());
    }

    #[test]
    fn test_hooks() {
        let root = tempfile::tempdir().unwrap();
        let hook = format!("{}/hook.sh", HOOK_DIR);
        write_host_file(
            root.path(),
            &hook,
            "#!/bin/sh\necho hooked\necho diagnostics >&2\n",
        );
        let hook_path = host_path(root.path(), &hook);
        fs::set_permissions(&hook_path, fs::Permissions::from_mode(0o755)).unwrap();
        write_host_file(root.path(), &format!("{}/not-exec", HOOK_DIR), "#!/bin/sh\necho no\n");

        let mut source = LocalSource::with_root(root.path().to_path_buf());
        let features = source.discover().unwrap();
        assert_eq!(features.get("hooked"), Some(&true.into()));
        assert!(!features.contains_key("no"));
    }

    #[test]
    fn test_missing_directories() {
        let root = tempfile::tempdir().unwrap();
        let mut source = LocalSource::with_root(root.path().to_path_buf());
        assert!(source.discover().unwrap().is_empty());
    }
}
