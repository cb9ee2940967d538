//! The worker event loop
//!
//! A single task multiplexes the label timer, the config debounce timer,
//! config watcher events and the shutdown token. Handling of one event never
//! overlaps another.

use crate::aggregator::{self, Labels};
use crate::config::{self, WorkerConfig};
use crate::config_watch::{clean_path, ConfigWatcher, DEBOUNCE_INTERVAL};
use crate::connection::{ConnectionManager, ConnectionSettings, ConnectionState};
use crate::error::{Result, WorkerError};
use crate::registry::{self, ALL_SOURCES};
use crate::VERSION;
use log::{error, info, warn};
use nfd_common::FeatureSource;
use regex::Regex;
use std::future::pending;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/kubernetes/node-feature-discovery/nfd-worker.conf";
pub const DEFAULT_SERVER: &str = "localhost:8080";
pub const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_SLEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Startup parameters of the worker
#[derive(Debug, Clone)]
pub struct WorkerArgs {
    pub config_file: PathBuf,
    /// Inline YAML applied on top of the config file
    pub options: String,
    pub connection: ConnectionSettings,
    /// Regex label names must match to be published
    pub label_whitelist: String,
    pub oneshot: bool,
    /// Zero disables periodic re-labeling
    pub sleep_interval: Duration,
    pub sources: Vec<String>,
    /// Deprecated override of `core.noPublish`
    pub no_publish: Option<bool>,
}

impl Default for WorkerArgs {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            options: String::new(),
            connection: ConnectionSettings::new(DEFAULT_SERVER),
            label_whitelist: String::new(),
            oneshot: false,
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            sources: vec![ALL_SOURCES.to_string()],
            no_publish: None,
        }
    }
}

type Timer = Option<Pin<Box<Sleep>>>;

fn timer(delay: Duration) -> Timer {
    Some(Box::pin(sleep(delay)))
}

/// Wait for an armed timer; an unarmed timer never fires
async fn fired(timer: &mut Timer) {
    match timer {
        Some(t) => t.as_mut().await,
        None => pending().await,
    }
}

fn node_name_from_env() -> String {
    std::env::var("NODE_NAME")
        .or_else(|_| hostname::get().map(|h| h.to_string_lossy().to_string()))
        .unwrap_or_else(|_| "unknown".to_string())
}

pub struct Worker {
    args: WorkerArgs,
    config_path: PathBuf,
    sources: Vec<Box<dyn FeatureSource>>,
    label_whitelist: Regex,
    config: WorkerConfig,
    connection: ConnectionManager,
    node_name: String,
}

impl Worker {
    /// Create a worker with the sources selected by `args.sources`
    pub fn new(args: WorkerArgs) -> Result<Self> {
        let sources = registry::select_sources(&args.sources);
        Self::with_sources(args, sources)
    }

    /// Create a worker with an explicit list of sources, in override order
    pub fn with_sources(mut args: WorkerArgs, sources: Vec<Box<dyn FeatureSource>>) -> Result<Self> {
        if args.sleep_interval > Duration::ZERO && args.sleep_interval < MIN_SLEEP_INTERVAL {
            warn!(
                "too short sleep interval specified ({:?}), forcing to {:?}",
                args.sleep_interval, MIN_SLEEP_INTERVAL
            );
            args.sleep_interval = MIN_SLEEP_INTERVAL;
        }

        args.connection.validate()?;

        let label_whitelist =
            Regex::new(&args.label_whitelist).map_err(|source| WorkerError::InvalidWhitelist {
                pattern: args.label_whitelist.clone(),
                source,
            })?;

        Ok(Self {
            config_path: clean_path(&args.config_file),
            connection: ConnectionManager::new(args.connection.clone()),
            args,
            sources,
            label_whitelist,
            config: WorkerConfig::default(),
            node_name: node_name_from_env(),
        })
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Replace the connection manager, e.g. to shorten its timeouts
    pub fn with_connection(mut self, connection: ConnectionManager) -> Self {
        self.connection = connection;
        self
    }

    pub fn args(&self) -> &WorkerArgs {
        &self.args
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run until a fatal error, the single cycle of oneshot mode, or
    /// `shutdown` is cancelled. The connection is closed on the way out.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("Node Feature Discovery Worker {}", VERSION);
        info!("NodeName: '{}'", self.node_name);

        let mut watcher = ConfigWatcher::new(&self.config_path)?;
        self.configure();
        self.connection.connect().await?;

        let result = self.event_loop(&mut watcher, &shutdown).await;
        self.connection.disconnect();
        result
    }

    async fn event_loop(
        &mut self,
        watcher: &mut ConfigWatcher,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let mut label_timer = timer(Duration::ZERO);
        let mut config_timer: Timer = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = fired(&mut label_timer) => {
                    label_timer = None;
                    self.label_cycle().await?;

                    if self.args.oneshot {
                        return Ok(());
                    }
                    if self.args.sleep_interval > Duration::ZERO {
                        label_timer = timer(self.args.sleep_interval);
                    }
                }
                Some(event) = watcher.recv() => match event {
                    Ok(event) => {
                        if watcher.handle_event(&event)? {
                            // Bursts of events collapse into one reload
                            config_timer = timer(DEBOUNCE_INTERVAL);
                        }
                    }
                    Err(e) => error!("config file watcher error: {}", e),
                },
                _ = fired(&mut config_timer) => {
                    config_timer = None;
                    self.configure();
                    if !self.connection.is_connected() {
                        self.connection.connect().await?;
                    }
                    // New config always takes effect right away
                    label_timer = timer(Duration::ZERO);
                }
            }
        }
    }

    /// Reload the configuration and apply its dry-run setting
    fn configure(&mut self) {
        self.config = config::reconfigure(
            &self.config_path,
            &self.args.options,
            &mut self.sources,
            self.args.no_publish,
        );
        self.connection.set_dry_run(self.config.core.no_publish);
    }

    /// Discover labels from all active sources
    pub fn discover(&mut self) -> Labels {
        aggregator::discover_all(&mut self.sources, &self.label_whitelist)
    }

    async fn label_cycle(&mut self) -> Result<()> {
        let labels = self.discover();
        if self.connection.is_connected() {
            self.connection
                .report(&self.node_name, VERSION, &labels)
                .await?;
        }
        Ok(())
    }
}
