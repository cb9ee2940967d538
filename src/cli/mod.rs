use crate::error::{NfdError, Result};
use clap::Parser;
use nfd_worker::connection::ConnectionSettings;
use nfd_worker::worker::{DEFAULT_CONFIG_FILE, DEFAULT_SERVER};
use nfd_worker::WorkerArgs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "nfd-worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Node feature discovery worker: detects hardware and system features and publishes them as node labels", long_about = None)]
pub struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file to use")]
    pub config: PathBuf,

    #[arg(
        long,
        default_value = "",
        help = "Specify config options from command line. Config options are specified in the same format as in the config file (i.e. json or yaml). These options will override settings read from the config file"
    )]
    pub options: String,

    #[arg(long, default_value = DEFAULT_SERVER, help = "NFD server address to connect to")]
    pub server: String,

    #[arg(long, help = "Root certificate for verifying connections")]
    pub ca_file: Option<PathBuf>,

    #[arg(long, help = "Certificate used for authenticating connections")]
    pub cert_file: Option<PathBuf>,

    #[arg(long, help = "Private key matching --cert-file")]
    pub key_file: Option<PathBuf>,

    #[arg(long, help = "Name (CN) expect from server certificate, useful in testing")]
    pub server_name_override: Option<String>,

    #[arg(
        long,
        default_value = "",
        help = "Regular expression to filter label names to publish to the Kubernetes API server. NB: the label namespace is omitted i.e. the filter is only applied to the name part after '/'"
    )]
    pub label_whitelist: String,

    #[arg(long, help = "Label once and exit")]
    pub oneshot: bool,

    #[arg(
        long,
        default_value = "60s",
        value_parser = parse_duration,
        help = "Time to sleep between re-labeling. 0 disables re-labeling (i.e. infinite sleep)"
    )]
    pub sleep_interval: Duration,

    #[arg(
        long,
        default_value = "all",
        value_delimiter = ',',
        help = "Comma separated list of feature sources. Special value 'all' enables all feature sources"
    )]
    pub sources: Vec<String>,

    #[arg(
        long,
        help = "Do not publish discovered features, disable connection to nfd-master (DEPRECATED: use core.noPublish in the config)"
    )]
    pub no_publish: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    pub fn into_worker_args(self) -> WorkerArgs {
        WorkerArgs {
            config_file: self.config,
            options: self.options,
            connection: ConnectionSettings {
                server: self.server,
                ca_file: self.ca_file,
                cert_file: self.cert_file,
                key_file: self.key_file,
                server_name_override: self.server_name_override,
            },
            label_whitelist: self.label_whitelist,
            oneshot: self.oneshot,
            sleep_interval: self.sleep_interval,
            sources: self.sources,
            no_publish: self.no_publish.then_some(true),
        }
    }
}

/// Parse a duration like `500ms`, `30s`, `1m30s`, `1.5h` or `0`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || NfdError::InvalidDuration(s.to_string());

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_ms = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (num, tail) = rest.split_at(num_len);
        let value: f64 = num.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit_ms = match unit {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return Err(invalid()),
        };

        total_ms += value * unit_ms;
        rest = tail;
    }

    Ok(Duration::from_nanos((total_ms * 1_000_000.0).round() as u64))
}
