//! End-to-end tests of the worker event loop

mod common;

use common::{wait_for, write_config, CountingSource, MockServer};
use nfd_common::FeatureSource;
use nfd_sources::{FakeSource, PanicFakeSource};
use nfd_worker::{
    ConnectionManager, ConnectionSettings, ConnectionState, Worker, WorkerArgs, WorkerError,
    VERSION,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const PUBLISH: &str = "core:\n  noPublish: false\n";
const NO_PUBLISH: &str = "core:\n  noPublish: true\n";

fn args(config_file: &Path, server: &str) -> WorkerArgs {
    WorkerArgs {
        config_file: config_file.to_path_buf(),
        connection: ConnectionSettings::new(server),
        sleep_interval: Duration::ZERO,
        ..Default::default()
    }
}

const DEADLINE: Duration = Duration::from_secs(10);

fn fake_sources() -> Vec<Box<dyn FeatureSource>> {
    vec![Box::new(PanicFakeSource::new()), Box::new(FakeSource::new())]
}

/// Fake sources plus a `CountingSource` whose counters are returned
fn counted_sources() -> (Vec<Box<dyn FeatureSource>>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let source = CountingSource::new();
    let configured = source.configured.clone();
    let discovered = source.discovered.clone();

    let mut sources = fake_sources();
    sources.push(Box::new(source));
    (sources, configured, discovered)
}

#[tokio::test]
async fn test_oneshot_reports_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), PUBLISH);

    let args = WorkerArgs {
        oneshot: true,
        sleep_interval: Duration::from_secs(3600),
        ..args(&config, &server.address)
    };
    let mut worker = Worker::with_sources(args, fake_sources())
        .unwrap()
        .with_node_name("node-1");

    timeout(Duration::from_secs(10), worker.run(CancellationToken::new()))
        .await
        .expect("oneshot run terminates")
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].node_name, "node-1");
    assert_eq!(requests[0].nfd_version, VERSION);
    assert_eq!(requests[0].labels.len(), 3);
    assert_eq!(
        requests[0].labels.get("fake-fakefeature1").map(String::as_str),
        Some("true")
    );
    assert_eq!(worker.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_dry_run_skips_connect() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), PUBLISH);

    let args = WorkerArgs {
        oneshot: true,
        no_publish: Some(true),
        ..args(&config, "unreachable.invalid:1")
    };
    let mut worker = Worker::with_sources(args, fake_sources()).unwrap();

    timeout(Duration::from_secs(10), worker.run(CancellationToken::new()))
        .await
        .expect("dry run terminates")
        .unwrap();
    assert_eq!(worker.connection_state(), ConnectionState::DryRun);
}

#[tokio::test]
async fn test_dry_run_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), NO_PUBLISH);

    let args = WorkerArgs {
        oneshot: true,
        ..args(&config, "unreachable.invalid:1")
    };
    let mut worker = Worker::with_sources(args, fake_sources()).unwrap();
    worker.run(CancellationToken::new()).await.unwrap();
    assert!(worker.config().core.no_publish);
}

#[tokio::test]
async fn test_initial_connect_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), PUBLISH);

    let connection = ConnectionManager::new(ConnectionSettings::new("127.0.0.1:9"))
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
    let mut worker = Worker::with_sources(args(&config, "127.0.0.1:9"), fake_sources())
        .unwrap()
        .with_connection(connection);

    let err = worker.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Connect { .. } | WorkerError::ConnectTimeout { .. }
    ));
}

#[tokio::test]
async fn test_report_failure_is_fatal() {
    let server = MockServer::start_failing().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), PUBLISH);

    let mut worker = Worker::with_sources(args(&config, &server.address), fake_sources()).unwrap();
    let err = timeout(Duration::from_secs(10), worker.run(CancellationToken::new()))
        .await
        .expect("run terminates on report failure")
        .unwrap_err();

    assert!(matches!(err, WorkerError::Report(_)));
    assert_eq!(server.request_count(), 1);
    assert_eq!(worker.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), PUBLISH);

    let mut worker = Worker::with_sources(args(&config, &server.address), fake_sources()).unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = worker.run(shutdown).await;
            (worker, result)
        }
    });

    assert!(wait_for(DEADLINE, || server.request_count() == 1).await);
    shutdown.cancel();
    let (worker, result) = handle.await.unwrap();

    result.unwrap();
    assert_eq!(server.request_count(), 1);
    assert_eq!(worker.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_directory_recreation_reconfigures_once() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("nfd");
    let config = write_config(&config_dir, NO_PUBLISH);

    let source = CountingSource::new();
    let configured = source.configured.clone();
    let discovered = source.discovered.clone();

    let sources: Vec<Box<dyn FeatureSource>> = vec![Box::new(source)];
    let mut worker = Worker::with_sources(args(&config, "unreachable.invalid:1"), sources).unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    assert!(wait_for(DEADLINE, || discovered.load(Ordering::SeqCst) == 1).await);
    assert_eq!(configured.load(Ordering::SeqCst), 1);

    fs::remove_dir_all(&config_dir).unwrap();
    write_config(&config_dir, NO_PUBLISH);

    // Every reconfiguration forces a re-label
    assert!(
        wait_for(DEADLINE, || {
            configured.load(Ordering::SeqCst) == 2 && discovered.load(Ordering::SeqCst) == 2
        })
        .await
    );

    // The burst of events must not cause a second reload
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(configured.load(Ordering::SeqCst), 2);
    assert_eq!(discovered.load(Ordering::SeqCst), 2);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_switching_to_dry_run_stops_reports() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), PUBLISH);

    let args = WorkerArgs {
        sleep_interval: Duration::from_secs(1),
        ..args(&config, &server.address)
    };
    let (sources, configured, _) = counted_sources();
    let mut worker = Worker::with_sources(args, sources).unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = worker.run(shutdown).await;
            (worker, result)
        }
    });

    assert!(wait_for(DEADLINE, || server.request_count() >= 1).await);

    write_config(dir.path(), NO_PUBLISH);
    assert!(wait_for(DEADLINE, || configured.load(Ordering::SeqCst) >= 2).await);
    let reported = server.request_count();

    // Two more label intervals pass without a report
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(server.request_count(), reported);

    shutdown.cancel();
    let (worker, result) = handle.await.unwrap();
    result.unwrap();
    assert!(worker.config().core.no_publish);
    assert_eq!(worker.connection_state(), ConnectionState::DryRun);
}

#[tokio::test]
async fn test_leaving_dry_run_connects() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), NO_PUBLISH);

    let (sources, configured, discovered) = counted_sources();
    let mut worker = Worker::with_sources(args(&config, &server.address), sources).unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    assert!(wait_for(DEADLINE, || discovered.load(Ordering::SeqCst) == 1).await);
    assert_eq!(configured.load(Ordering::SeqCst), 1);
    assert_eq!(server.request_count(), 0);

    write_config(dir.path(), PUBLISH);
    assert!(wait_for(DEADLINE, || server.request_count() == 1).await);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_connect_after_leaving_dry_run_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), NO_PUBLISH);

    // Nothing listens on the discard port of the loopback interface
    let connection = ConnectionManager::new(ConnectionSettings::new("127.0.0.1:9"))
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
    let (sources, configured, discovered) = counted_sources();
    let mut worker = Worker::with_sources(args(&config, "127.0.0.1:9"), sources)
        .unwrap()
        .with_connection(connection);
    let handle = tokio::spawn(async move {
        let result = worker.run(CancellationToken::new()).await;
        (worker, result)
    });

    assert!(wait_for(DEADLINE, || discovered.load(Ordering::SeqCst) == 1).await);
    assert_eq!(configured.load(Ordering::SeqCst), 1);

    write_config(dir.path(), PUBLISH);
    let (worker, result) = timeout(Duration::from_secs(20), handle)
        .await
        .expect("run terminates on connect failure")
        .unwrap();

    let err = result.unwrap_err();
    assert!(
        matches!(
            err,
            WorkerError::Connect { .. } | WorkerError::ConnectTimeout { .. }
        ),
        "unexpected error: {}",
        err
    );
    assert!(!worker.config().core.no_publish);
    assert_eq!(worker.connection_state(), ConnectionState::Disconnected);
}
