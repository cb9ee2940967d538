//! Test helpers: an in-process labeler service and instrumented sources

#![allow(dead_code)]

use nfd_common::{FeatureSource, Features, NoConfig, SourceConfig};
use nfd_proto::{Labeler, LabelerServer, SetLabelsReply, SetLabelsRequest};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};
use tonic::{Request, Response, Status};

#[derive(Clone, Default)]
pub struct MockLabeler {
    requests: Arc<Mutex<Vec<SetLabelsRequest>>>,
    fail: bool,
}

#[tonic::async_trait]
impl Labeler for MockLabeler {
    async fn set_labels(
        &self,
        request: Request<SetLabelsRequest>,
    ) -> Result<Response<SetLabelsReply>, Status> {
        self.requests.lock().unwrap().push(request.into_inner());
        if self.fail {
            return Err(Status::unavailable("labeler is shutting down"));
        }
        Ok(Response::new(SetLabelsReply {}))
    }
}

pub struct MockServer {
    pub address: String,
    labeler: MockLabeler,
}

impl MockServer {
    /// Start a labeler service on a random loopback port
    pub async fn start() -> Self {
        Self::start_with(MockLabeler::default()).await
    }

    /// Start a labeler service that rejects every request
    pub async fn start_failing() -> Self {
        Self::start_with(MockLabeler {
            fail: true,
            ..Default::default()
        })
        .await
    }

    /// Start a labeler service that only accepts TLS connections
    pub async fn start_tls(tls: ServerTlsConfig) -> Self {
        Self::start_with_tls(MockLabeler::default(), Some(tls)).await
    }

    async fn start_with(labeler: MockLabeler) -> Self {
        Self::start_with_tls(labeler, None).await
    }

    async fn start_with_tls(labeler: MockLabeler, tls: Option<ServerTlsConfig>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let mut builder = Server::builder();
        if let Some(tls) = tls {
            builder = builder.tls_config(tls).expect("Invalid server TLS config");
        }
        let router = builder.add_service(LabelerServer::new(labeler.clone()));
        tokio::spawn(async move {
            router
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
        });

        Self {
            address: addr.to_string(),
            labeler,
        }
    }

    pub fn requests(&self) -> Vec<SetLabelsRequest> {
        self.labeler.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.labeler.requests.lock().unwrap().len()
    }
}

/// Source counting how often it is configured and queried
pub struct CountingSource {
    pub configured: Arc<AtomicUsize>,
    pub discovered: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self {
            configured: Arc::new(AtomicUsize::new(0)),
            discovered: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FeatureSource for CountingSource {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn discover(&mut self) -> anyhow::Result<Features> {
        let n = self.discovered.fetch_add(1, Ordering::SeqCst) + 1;
        let mut features = Features::new();
        features.insert("cycles".to_string(), (n as i64).into());
        Ok(features)
    }

    fn new_config(&self) -> Box<dyn SourceConfig> {
        Box::new(NoConfig::default())
    }

    fn set_config(&mut self, _config: &dyn SourceConfig) {
        self.configured.fetch_add(1, Ordering::SeqCst);
    }
}

/// Write a worker config file at `dir/nfd-worker.conf`
pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join("nfd-worker.conf");
    fs::write(&path, contents).unwrap();
    path
}

/// Poll `condition` every 50ms until it holds or `deadline` passes.
/// Returns the final value of the condition.
pub async fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= until {
            return false;
        }
        sleep(Duration::from_millis(50)).await;
    }
}
