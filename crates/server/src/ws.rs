//! The persistent duplex surface: one WebSocket connection per client, text
//! frames carrying control headers, binary frames carrying point payloads.
//!
//! Each connection owns one `FrameRouter` and one `RequestLedger`, built at
//! accept time and torn down at close. Dispatch runs as one task per
//! in-flight request; a deadline task races it through the ledger. The
//! single writer task keeps a result header and its payload back-to-back so
//! the outbound pairing invariant holds even with out-of-order completions.

use crate::dispatch::{Dispatcher, reattach_passthrough};
use crate::error::ServerError;
use crate::ledger::{PendingRequest, RequestLedger};
use crate::router::{ClientRequest, FrameRouter, RouterViolation};
use futures_util::{SinkExt, StreamExt};
use pointserve_core::{Algorithm, PointCloud};
use pool::PoolRegistry;
use protocol::ControlFrame;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Outbound traffic for the connection's single writer task.
enum Outbound {
  Control(ControlFrame),
  /// A success result and its binary payload, written back-to-back.
  ControlWithPayload(ControlFrame, Vec<u8>),
}

/// WebSocket listener owning the pool registry and per-connection wiring.
pub struct Server {
  dispatcher: Arc<Dispatcher>,
  request_timeout: Duration,
  shutdown_tx: broadcast::Sender<()>,
}

impl Server {
  pub fn new(registry: Arc<PoolRegistry>, request_timeout: Duration) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      dispatcher: Arc::new(Dispatcher::new(registry)),
      request_timeout,
      shutdown_tx,
    }
  }

  /// Get a handle to signal server shutdown.
  pub fn shutdown_handle(&self) -> ShutdownHandle {
    ShutdownHandle {
      tx: self.shutdown_tx.clone(),
    }
  }

  /// Accept connections until shutdown is signalled.
  pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
    info!(addr = %listener.local_addr()?, "duplex listener ready");
    let mut shutdown_rx = self.shutdown_tx.subscribe();

    loop {
      tokio::select! {
          result = listener.accept() => {
              match result {
                  Ok((stream, peer)) => {
                      debug!(%peer, "client connected");
                      let dispatcher = Arc::clone(&self.dispatcher);
                      let request_timeout = self.request_timeout;
                      let shutdown_rx = self.shutdown_tx.subscribe();
                      tokio::spawn(async move {
                          if let Err(e) = handle_connection(stream, dispatcher, request_timeout, shutdown_rx).await {
                              error!(%peer, "connection error: {e}");
                          }
                      });
                  }
                  Err(e) => {
                      error!("accept error: {e}");
                  }
              }
          }
          _ = shutdown_rx.recv() => {
              info!("shutdown signal received");
              break;
          }
      }
    }

    Ok(())
  }
}

/// Handle to signal server shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
  tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
  pub fn shutdown(&self) {
    let _ = self.tx.send(());
  }

  /// Subscribe another component (e.g. the HTTP listener) to the same
  /// shutdown signal.
  pub fn subscribe(&self) -> broadcast::Receiver<()> {
    self.tx.subscribe()
  }
}

async fn handle_connection(
  stream: TcpStream,
  dispatcher: Arc<Dispatcher>,
  request_timeout: Duration,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
  let ws = accept_async(stream).await?;
  let (mut sink, mut frames) = ws.split();

  let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
  tokio::spawn(async move {
    while let Some(outbound) = out_rx.recv().await {
      let result = match outbound {
        Outbound::Control(frame) => sink.send(Message::text(frame.to_json())).await,
        Outbound::ControlWithPayload(frame, payload) => {
          match sink.send(Message::text(frame.to_json())).await {
            Ok(()) => sink.send(Message::binary(payload)).await,
            Err(e) => Err(e),
          }
        }
      };
      if result.is_err() {
        break;
      }
    }
    let _ = sink.close().await;
  });

  let ledger = Arc::new(RequestLedger::new());
  let mut router = FrameRouter::new();

  loop {
    tokio::select! {
        message = frames.next() => {
            let Some(message) = message else { break };
            match message? {
                Message::Text(text) => {
                    if let Err(violation) = router.on_text(text.as_str()) {
                        report_violation(&out_tx, violation);
                    }
                }
                Message::Binary(bytes) => match router.on_binary(&bytes) {
                    Ok(request) => spawn_dispatch(
                        request,
                        Arc::clone(&dispatcher),
                        Arc::clone(&ledger),
                        out_tx.clone(),
                        request_timeout,
                    ),
                    Err(violation) => report_violation(&out_tx, violation),
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        _ = shutdown_rx.recv() => break,
    }
  }

  // Fail whatever is still in flight. The workers themselves are left to
  // finish; their late results find no ledger entry and are discarded.
  for (request_id, pending) in ledger.drain() {
    let frame =
      ControlFrame::failure_result(pending.algorithm, request_id, ServerError::Shutdown.to_string());
    let _ = out_tx.send(Outbound::Control(frame));
  }

  // The writer task drains whatever is queued (teardown failures included)
  // and exits on its own once the last in-flight dispatch or deadline task
  // drops its sender.
  drop(out_tx);
  debug!("connection closed");
  Ok(())
}

/// A violating frame is dropped and reported; when it identified a request,
/// the error is tagged with that request, otherwise it is connection-level.
fn report_violation(out_tx: &mpsc::UnboundedSender<Outbound>, violation: RouterViolation) {
  warn!(error = %violation.error, request_id = ?violation.request_id, "protocol violation, frame dropped");
  let frame = match (violation.request_id, violation.algorithm) {
    (Some(request_id), Some(algorithm)) => {
      ControlFrame::failure_result(algorithm, request_id, violation.error.to_string())
    }
    (request_id, _) => ControlFrame::Error {
      request_id,
      message: violation.error.to_string(),
    },
  };
  let _ = out_tx.send(Outbound::Control(frame));
}

/// One task per in-flight request awaits the worker exchange; a second task
/// holds the deadline. Whichever removes the ledger entry first answers the
/// client. The deadline never kills the worker process.
fn spawn_dispatch(
  request: ClientRequest,
  dispatcher: Arc<Dispatcher>,
  ledger: Arc<RequestLedger>,
  out_tx: mpsc::UnboundedSender<Outbound>,
  request_timeout: Duration,
) {
  let ClientRequest {
    request_id,
    params,
    variant,
    passthrough,
    points,
  } = request;
  let algorithm = params.algorithm();

  let pending = PendingRequest {
    algorithm,
    passthrough,
    issued_at: Instant::now(),
  };
  if ledger.insert(request_id, pending).is_err() {
    warn!(request_id, "requestId already in flight");
    let frame = ControlFrame::failure_result(
      algorithm,
      request_id,
      format!("requestId {request_id} is already in flight"),
    );
    let _ = out_tx.send(Outbound::Control(frame));
    return;
  }

  {
    let ledger = Arc::clone(&ledger);
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
      tokio::time::sleep(request_timeout).await;
      if let Some(pending) = ledger.complete(request_id) {
        warn!(request_id, "request deadline expired");
        let frame = ControlFrame::failure_result(
          pending.algorithm,
          request_id,
          format!("request timed out after {}s", request_timeout.as_secs_f64()),
        );
        let _ = out_tx.send(Outbound::Control(frame));
      }
    });
  }

  tokio::spawn(async move {
    let result = dispatcher.execute(&params, variant, &points).await;

    let Some(pending) = ledger.complete(request_id) else {
      debug!(request_id, "late result discarded");
      return;
    };

    match result {
      Ok(outcome) => {
        debug!(request_id, elapsed = ?pending.issued_at.elapsed(), "request completed");
        let cloud = match PointCloud::from_flat(outcome.points) {
          Ok(cloud) => cloud,
          Err(err) => {
            let frame = ControlFrame::failure_result(algorithm, request_id, err.to_string());
            let _ = out_tx.send(Outbound::Control(frame));
            return;
          }
        };
        let attributes = reattach_passthrough(algorithm, pending.passthrough, cloud.len());
        let cell_count = match algorithm {
          Algorithm::Smooth => None,
          Algorithm::Downsample | Algorithm::VoxelDebug => Some(outcome.cell_count),
        };
        let frame = ControlFrame::success_result(
          algorithm,
          request_id,
          cloud.len(),
          cell_count,
          outcome.processing_time,
          attributes,
        );
        let _ = out_tx.send(Outbound::ControlWithPayload(frame, cloud.to_le_bytes()));
      }
      Err(err) => {
        let frame = ControlFrame::failure_result(algorithm, request_id, err.to_string());
        let _ = out_tx.send(Outbound::Control(frame));
      }
    }
  });
}
