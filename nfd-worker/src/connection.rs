//! Connection to the labeler service
//!
//! Owns the single gRPC channel of the worker. In dry-run mode the manager
//! never dials and the worker never reports.

use crate::aggregator::Labels;
use crate::error::{Result, WorkerError};
use log::info;
use nfd_proto::{LabelerClient, SetLabelsRequest};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(60);
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the labeler service
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    /// `host:port`
    pub server: String,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Server name used for certificate verification
    pub server_name_override: Option<String>,
}

impl ConnectionSettings {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    fn uses_tls(&self) -> bool {
        self.ca_file.is_some() || self.cert_file.is_some() || self.key_file.is_some()
    }

    /// TLS material is all or nothing
    pub fn validate(&self) -> Result<()> {
        if !self.uses_tls() {
            return Ok(());
        }
        if self.cert_file.is_none() {
            return Err(WorkerError::IncompleteTls {
                missing: "cert-file",
                others: "--key-file and --ca-file",
            });
        }
        if self.key_file.is_none() {
            return Err(WorkerError::IncompleteTls {
                missing: "key-file",
                others: "--cert-file and --ca-file",
            });
        }
        if self.ca_file.is_none() {
            return Err(WorkerError::IncompleteTls {
                missing: "ca-file",
                others: "--cert-file and --key-file",
            });
        }
        Ok(())
    }

    fn tls_config(&self) -> Result<Option<ClientTlsConfig>> {
        let (Some(ca), Some(cert), Some(key)) = (&self.ca_file, &self.cert_file, &self.key_file)
        else {
            return Ok(None);
        };

        let identity = Identity::from_pem(read_pem(cert)?, read_pem(key)?);
        let mut tls = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(read_pem(ca)?))
            .identity(identity);
        if let Some(name) = &self.server_name_override {
            tls = tls.domain_name(name.clone());
        }

        Ok(Some(tls))
    }

    fn endpoint(&self) -> Result<Endpoint> {
        let tls = self.tls_config()?;
        let scheme = if tls.is_some() { "https" } else { "http" };

        let invalid = |source| WorkerError::InvalidAddress {
            address: self.server.clone(),
            source,
        };
        let mut endpoint =
            Endpoint::from_shared(format!("{}://{}", scheme, self.server)).map_err(invalid)?;
        if let Some(tls) = tls {
            endpoint = endpoint.tls_config(tls).map_err(invalid)?;
        }

        Ok(endpoint)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| WorkerError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    DryRun,
}

pub struct ConnectionManager {
    settings: ConnectionSettings,
    client: Option<LabelerClient<Channel>>,
    dry_run: bool,
    dial_timeout: Duration,
    report_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            client: None,
            dry_run: false,
            dial_timeout: DIAL_TIMEOUT,
            report_timeout: REPORT_TIMEOUT,
        }
    }

    /// Override the dial and report timeouts (for testing)
    pub fn with_timeouts(mut self, dial: Duration, report: Duration) -> Self {
        self.dial_timeout = dial;
        self.report_timeout = report;
        self
    }

    pub fn state(&self) -> ConnectionState {
        if self.client.is_some() {
            ConnectionState::Connected
        } else if self.dry_run {
            ConnectionState::DryRun
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Enter or leave dry-run mode. Entering it drops any live connection.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
        if dry_run {
            self.disconnect();
        }
    }

    /// Dial the labeler service. A no-op in dry-run mode.
    pub async fn connect(&mut self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        if self.client.is_some() {
            return Err(WorkerError::AlreadyConnected);
        }

        self.settings.validate()?;
        let endpoint = self.settings.endpoint()?;
        let address = self.settings.server.clone();

        info!("Connecting to labeler service at {}", address);
        let channel = match timeout(self.dial_timeout, endpoint.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(source)) => return Err(WorkerError::Connect { address, source }),
            Err(_) => {
                return Err(WorkerError::ConnectTimeout {
                    address,
                    timeout: self.dial_timeout,
                })
            }
        };

        self.client = Some(LabelerClient::new(channel));
        info!("Connected to labeler service at {}", address);
        Ok(())
    }

    /// Drop the connection, if any
    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            info!("Disconnected from labeler service");
        }
    }

    /// Send the full label set of this node
    pub async fn report(&mut self, node_name: &str, version: &str, labels: &Labels) -> Result<()> {
        let client = self.client.as_mut().ok_or(WorkerError::NotConnected)?;

        let request = SetLabelsRequest {
            nfd_version: version.to_string(),
            node_name: node_name.to_string(),
            labels: labels.clone().into_iter().collect(),
        };

        info!("Sending labeling request to the labeler service");
        match timeout(self.report_timeout, client.set_labels(request)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) => Err(WorkerError::Report(status)),
            Err(_) => Err(WorkerError::ReportTimeout(self.report_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls_settings(ca: bool, cert: bool, key: bool) -> ConnectionSettings {
        ConnectionSettings {
            ca_file: ca.then(|| PathBuf::from("/etc/nfd/ca.crt")),
            cert_file: cert.then(|| PathBuf::from("/etc/nfd/tls.crt")),
            key_file: key.then(|| PathBuf::from("/etc/nfd/tls.key")),
            ..ConnectionSettings::new("nfd-master:8080")
        }
    }

    #[test]
    fn test_tls_material_is_all_or_nothing() {
        assert!(tls_settings(false, false, false).validate().is_ok());
        assert!(tls_settings(true, true, true).validate().is_ok());

        let err = tls_settings(true, false, true).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "--cert-file needs to be specified alongside --key-file and --ca-file"
        );
        let err = tls_settings(true, true, false).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "--key-file needs to be specified alongside --cert-file and --ca-file"
        );
        let err = tls_settings(false, true, true).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "--ca-file needs to be specified alongside --cert-file and --key-file"
        );
    }

    #[test]
    fn test_missing_tls_files() {
        let err = tls_settings(true, true, true).endpoint().unwrap_err();
        assert!(matches!(err, WorkerError::TlsMaterial { .. }));
    }

    #[test]
    fn test_plain_endpoint() {
        let endpoint = ConnectionSettings::new("localhost:8080").endpoint().unwrap();
        assert_eq!(endpoint.uri().scheme_str(), Some("http"));
        assert_eq!(
            endpoint.uri().authority().map(|a| a.as_str()),
            Some("localhost:8080")
        );
    }

    #[tokio::test]
    async fn test_dry_run_never_dials() {
        let mut manager = ConnectionManager::new(ConnectionSettings::new("unreachable.invalid:1"));
        manager.set_dry_run(true);

        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::DryRun);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_incomplete_tls_fails_before_dialing() {
        let mut manager = ConnectionManager::new(tls_settings(true, false, false));
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, WorkerError::IncompleteTls { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_disconnected() {
        // Nothing listens on the discard port of the loopback interface
        let mut manager = ConnectionManager::new(ConnectionSettings::new("127.0.0.1:9"))
            .with_timeouts(Duration::from_secs(5), REPORT_TIMEOUT);

        assert!(manager.connect().await.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_report_requires_connection() {
        let mut manager = ConnectionManager::new(ConnectionSettings::new("localhost:8080"));
        let err = manager.report("node", "v0", &Labels::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::NotConnected));

        // Disconnecting twice is fine
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
