//! End-to-end duplex protocol tests against a live listener, with shell
//! stand-ins for the worker executables so the suite only exercises the
//! orchestration layer.

use pointserve_core::{Algorithm, PointAttributes, PointCloud, Variant};
use pool::{PoolRegistry, ProcessPool, WireForm, WorkerCommand};
use protocol::ControlFrame;
use server::{Server, WsClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Echoes the request back in valid response shape.
const IDENTITY_WORKER: &str = r#"read header; read data; set -- $header; echo "$1"; echo "$data""#;

fn sh_worker(script: &str) -> WorkerCommand {
  WorkerCommand {
    program: PathBuf::from("sh"),
    args: vec!["-c".to_string(), script.to_string()],
    wire: WireForm::Text,
  }
}

async fn start_server(script: &str, request_timeout: Duration) -> (String, server::ShutdownHandle) {
  let pool = ProcessPool::new(Algorithm::Smooth, Variant::Pooled, sh_worker(script), 2, true)
    .await
    .expect("pool");
  let registry = Arc::new(PoolRegistry::from_pools(vec![Arc::new(pool)]));
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
  let addr = listener.local_addr().expect("addr").to_string();

  let srv = Server::new(registry, request_timeout);
  let shutdown = srv.shutdown_handle();
  tokio::spawn(async move { srv.run(listener).await });

  (addr, shutdown)
}

#[tokio::test]
async fn test_smooth_roundtrip_with_passthrough() {
  let (addr, shutdown) = start_server(IDENTITY_WORKER, Duration::from_secs(5)).await;
  let mut client = WsClient::connect(&addr).await.expect("connect");

  let points = PointCloud::from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
  let attributes = PointAttributes {
    colors: None,
    intensities: Some(vec![0.1, 0.9]),
    classifications: Some(vec![2, 6]),
  };

  let result = client
    .smooth(&points, 0.5, 1, attributes, None)
    .await
    .expect("smooth result");
  assert_eq!(result.points, points.as_flat());
  assert_eq!(result.attributes.intensities, Some(vec![0.1, 0.9]));
  assert_eq!(result.attributes.classifications, Some(vec![2, 6]));
  assert!(result.processing_time.is_some());

  shutdown.shutdown();
}

#[tokio::test]
async fn test_worker_failure_tagged_with_request_id() {
  let (addr, shutdown) = start_server("cat >/dev/null; echo dead >&2; exit 7", Duration::from_secs(5)).await;
  let mut client = WsClient::connect(&addr).await.expect("connect");

  let points = PointCloud::from_flat(vec![0.0, 0.0, 0.0]).unwrap();
  let err = client
    .smooth(&points, 0.5, 1, PointAttributes::default(), None)
    .await
    .expect_err("worker exit 7 must fail the request");
  let message = err.to_string();
  assert!(message.contains("dead"), "unexpected error: {message}");

  shutdown.shutdown();
}

#[tokio::test]
async fn test_orphan_binary_yields_connection_error() {
  let (addr, shutdown) = start_server(IDENTITY_WORKER, Duration::from_secs(5)).await;
  let mut client = WsClient::connect(&addr).await.expect("connect");

  client.send_orphan_binary(vec![0u8; 24]).await.expect("send");
  let frame = client.next_control().await.expect("error frame");
  match frame {
    ControlFrame::Error { request_id, message } => {
      assert!(request_id.is_none());
      assert!(message.contains("no pending control header"), "got: {message}");
    }
    other => panic!("expected connection-level error, got {other:?}"),
  }

  shutdown.shutdown();
}

#[tokio::test]
async fn test_second_header_resets_then_recovers() {
  let (addr, shutdown) = start_server(IDENTITY_WORKER, Duration::from_secs(5)).await;
  let mut client = WsClient::connect(&addr).await.expect("connect");

  let header = |id: u64| ControlFrame::SmoothRequest {
    request_id: id,
    smoothing_radius: 0.5,
    iterations: 1,
    variant: None,
    colors: None,
    intensities: None,
    classifications: None,
  };

  // Two headers with no payload between them: the second is dropped and
  // reported against its own request id.
  client.send_header(header(1)).await.expect("first header");
  client.send_header(header(2)).await.expect("second header");
  let frame = client.next_control().await.expect("violation result");
  match frame {
    ControlFrame::SmoothResult { request_id, success, error, .. } => {
      assert_eq!(request_id, 2);
      assert!(!success);
      assert!(error.unwrap_or_default().contains("awaiting its payload"));
    }
    other => panic!("expected smooth-result failure, got {other:?}"),
  }

  // Pending state was reset; a fresh pair goes through.
  let points = PointCloud::from_flat(vec![7.0, 8.0, 9.0]).unwrap();
  let result = client
    .smooth(&points, 0.5, 1, PointAttributes::default(), None)
    .await
    .expect("recovered request");
  assert_eq!(result.points, points.as_flat());

  shutdown.shutdown();
}

#[tokio::test]
async fn test_deadline_fires_and_tags_request() {
  let (addr, shutdown) = start_server("sleep 3; cat >/dev/null", Duration::from_millis(150)).await;
  let mut client = WsClient::connect(&addr).await.expect("connect");

  let points = PointCloud::from_flat(vec![0.0, 0.0, 0.0]).unwrap();
  let err = client
    .smooth(&points, 0.5, 1, PointAttributes::default(), None)
    .await
    .expect_err("deadline must fire");
  assert!(err.to_string().contains("timed out"), "got: {err}");

  shutdown.shutdown();
}
