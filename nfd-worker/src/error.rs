use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("--{missing} needs to be specified alongside {others}")]
    IncompleteTls {
        missing: &'static str,
        others: &'static str,
    },

    #[error("error parsing label whitelist regex ({pattern}): {source}")]
    InvalidWhitelist {
        pattern: String,
        source: regex::Error,
    },

    #[error("failed to create config watcher: {0}")]
    WatcherSetup(#[from] notify::Error),

    #[error("failed to add any watch for {0:?}")]
    NoWatches(PathBuf),

    #[error("client connection already exists")]
    AlreadyConnected,

    #[error("not connected to the labeler service")]
    NotConnected,

    #[error("invalid server address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        source: tonic::transport::Error,
    },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: tonic::transport::Error,
    },

    #[error("timed out connecting to {address} after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("failed to read TLS material {path:?}: {source}")]
    TlsMaterial {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to set node labels: {0}")]
    Report(#[from] tonic::Status),

    #[error("labeling request timed out after {0:?}")]
    ReportTimeout(Duration),

    #[error("discovery failed for source [{name}]: {reason}")]
    SourceFailed { name: String, reason: String },

    #[error("panic occurred during discovery of source [{name}]: {message}")]
    SourcePanic { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
