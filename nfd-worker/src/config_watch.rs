//! Config file change detection
//!
//! The config file and every ancestor directory up to `/` are watched, so
//! that atomic replaces, renames and re-created directories are all noticed.
//! Any event on a watched path rebuilds the whole watch set; the caller
//! debounces the resulting triggers.

use crate::error::{Result, WorkerError};
use log::{info, warn};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay between the last relevant event and the reconfiguration
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_secs(1);

type EventSender = mpsc::UnboundedSender<notify::Result<Event>>;

pub struct ConfigWatcher {
    path: PathBuf,
    /// Dropping the watcher removes all of its watches
    _watcher: RecommendedWatcher,
    paths: HashSet<PathBuf>,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl ConfigWatcher {
    /// Start watching `path` and its ancestors. Fails only if no watch at
    /// all could be added.
    pub fn new(path: &Path) -> Result<Self> {
        let path = clean_path(path);
        let (tx, rx) = mpsc::unbounded_channel();
        let (watcher, paths) = add_watches(&path, &tx)?;

        Ok(Self {
            path,
            _watcher: watcher,
            paths,
            tx,
            rx,
        })
    }

    /// Next raw watcher event or watcher error
    pub async fn recv(&mut self) -> Option<notify::Result<Event>> {
        self.rx.recv().await
    }

    /// Whether `event` may have changed the contents at the config path
    pub fn is_relevant(&self, event: &Event) -> bool {
        match &event.kind {
            // Reads never change anything
            EventKind::Access(kind) if *kind != AccessKind::Close(AccessMode::Write) => {
                return false
            }
            _ => {}
        }
        event
            .paths
            .iter()
            .any(|p| self.paths.contains(&clean_path(p)))
    }

    /// Handle a filesystem event. Returns true when the event concerned one of
    /// the watched paths, in which case the watch set has been rebuilt.
    pub fn handle_event(&mut self, event: &Event) -> Result<bool> {
        if !self.is_relevant(event) {
            return Ok(false);
        }

        info!(
            "config watch event {:?} on {:?} detected, re-adding watches and reloading configuration",
            event.kind, event.paths
        );
        self.reset()?;
        Ok(true)
    }

    /// Drop every watch and rebuild the watch set from scratch
    pub fn reset(&mut self) -> Result<()> {
        let (watcher, paths) = add_watches(&self.path, &self.tx)?;
        self._watcher = watcher;
        self.paths = paths;
        Ok(())
    }

    pub fn watched_paths(&self) -> &HashSet<PathBuf> {
        &self.paths
    }

    /// Feed an event or error into the watcher's queue (for testing)
    #[cfg(test)]
    pub(crate) fn inject(&self, event: notify::Result<Event>) {
        let _ = self.tx.send(event);
    }
}

fn add_watches(path: &Path, tx: &EventSender) -> Result<(RecommendedWatcher, HashSet<PathBuf>)> {
    let events = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res| {
        // The receiver only goes away together with the worker
        let _ = events.send(res);
    })?;

    let mut paths = HashSet::new();
    let mut added = false;
    for p in watch_paths(path) {
        match watcher.watch(&p, RecursiveMode::NonRecursive) {
            Ok(()) => {
                info!("added config watch {:?}", p);
                added = true;
            }
            Err(e) => warn!("failed to add config watch for {:?}: {}", p, e),
        }
        paths.insert(p);
    }

    if !added {
        return Err(WorkerError::NoWatches(path.to_path_buf()));
    }

    Ok((watcher, paths))
}

/// `path` followed by all of its ancestors, ending with `/` (or `.` for
/// relative paths)
pub fn watch_paths(path: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut p = clean_path(path);
    loop {
        let parent = parent_dir(&p);
        let last = parent == p;
        paths.push(p);
        if last {
            break;
        }
        p = parent;
    }
    paths
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
        Some(p) => p.to_path_buf(),
        None => path.to_path_buf(),
    }
}

/// Lexically normalize a path: drop `.` components and redundant
/// separators, resolve `..` where possible
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            c => out.push(c),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
