//! nfd-worker - node feature discovery engine
//!
//! Discovers node features through pluggable sources, turns them into
//! validated labels and reports them to the labeler service. The
//! configuration is reloaded whenever the config file changes on disk.
//!
//! - `registry` - known sources and `--sources` selection
//! - `aggregator` - discovery, label naming, validation and whitelisting
//! - `config` - layered configuration loading
//! - `config_watch` - config file change detection
//! - `connection` - gRPC connection lifecycle and reporting
//! - `worker` - the event loop tying it all together

pub mod aggregator;
pub mod config;
pub mod config_watch;
pub mod connection;
pub mod error;
pub mod registry;
pub mod worker;

pub use aggregator::{discover_all, discover_one, Labels};
pub use config::{ConfigError, CoreConfig, WorkerConfig};
pub use config_watch::ConfigWatcher;
pub use connection::{ConnectionManager, ConnectionSettings, ConnectionState};
pub use error::{Result, WorkerError};
pub use worker::{Worker, WorkerArgs};

/// Version reported to the labeler service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
