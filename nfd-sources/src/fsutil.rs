//! Helpers for reading procfs/sysfs below a configurable host root

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default host root
pub const HOST_ROOT: &str = "/";

/// Resolve an absolute host path below `root`
pub(crate) fn host_path(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// Read a small attribute file and trim surrounding whitespace
pub(crate) fn read_trimmed(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// List directory entries sorted by path
pub(crate) fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Strip the `0x` prefix sysfs puts in front of hex ids
pub(crate) fn strip_hex_prefix(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// Create `path` below `root` with `contents`, creating parent directories
#[cfg(test)]
pub(crate) fn write_host_file(root: &Path, path: &str, contents: &str) {
    let full = host_path(root, path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("create parent directories");
    }
    fs::write(&full, contents).expect("write host file");
}
