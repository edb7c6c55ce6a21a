//! Single-shot HTTP surface: one JSON body in, one JSON body out, for
//! consumers that do not hold a persistent connection.

use crate::dispatch::{Dispatcher, reattach_passthrough};
use crate::error::ServerError;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use pointserve_core::{Algorithm, PointCloud};
use protocol::{TransformRequest, TransformResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Clone)]
pub struct HttpState {
  pub dispatcher: Arc<Dispatcher>,
  pub request_timeout: Duration,
}

pub fn http_router(state: HttpState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/downsample", post(downsample))
    .route("/smooth", post(smooth))
    .route("/voxel-debug", post(voxel_debug))
    .with_state(state)
}

/// Serve until the shutdown signal fires.
pub async fn run_http(
  listener: TcpListener,
  state: HttpState,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
  info!(addr = %listener.local_addr()?, "single-shot listener ready");
  let app = http_router(state);
  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      let _ = shutdown_rx.recv().await;
    })
    .await?;
  Ok(())
}

async fn health() -> Json<serde_json::Value> {
  Json(serde_json::json!({ "status": "ok" }))
}

async fn downsample(State(state): State<HttpState>, Json(body): Json<TransformRequest>) -> Json<TransformResponse> {
  Json(single_shot(Algorithm::Downsample, &state, body).await)
}

async fn smooth(State(state): State<HttpState>, Json(body): Json<TransformRequest>) -> Json<TransformResponse> {
  Json(single_shot(Algorithm::Smooth, &state, body).await)
}

async fn voxel_debug(State(state): State<HttpState>, Json(body): Json<TransformRequest>) -> Json<TransformResponse> {
  Json(single_shot(Algorithm::VoxelDebug, &state, body).await)
}

/// The shared single-shot path. Always answers 200 with a `success` flag,
/// the way the viewer's import pipeline expects.
pub async fn single_shot(algorithm: Algorithm, state: &HttpState, body: TransformRequest) -> TransformResponse {
  let start = Instant::now();
  match run_single_shot(algorithm, state, body).await {
    Ok(response) => response,
    Err(err) => TransformResponse::failure(err.to_string(), start.elapsed().as_secs_f64() * 1000.0),
  }
}

async fn run_single_shot(
  algorithm: Algorithm,
  state: &HttpState,
  body: TransformRequest,
) -> Result<TransformResponse, ServerError> {
  let params = body.params_for(algorithm)?;
  let passthrough = body.passthrough();
  let variant = body.variant.unwrap_or_default();
  let points = PointCloud::from_flat(body.points)?;

  // The deadline abandons the call, not the worker: the dispatch keeps
  // running detached so the handle is still released and the pool stays
  // balanced; its late result is simply discarded.
  let dispatcher = Arc::clone(&state.dispatcher);
  let task = tokio::spawn(async move { dispatcher.execute(&params, variant, &points).await });
  let outcome = match tokio::time::timeout(state.request_timeout, task).await {
    Err(_) => return Err(ServerError::Timeout(state.request_timeout)),
    Ok(Err(join_err)) => return Err(ServerError::Internal(join_err.to_string())),
    Ok(Ok(result)) => result?,
  };

  let output_points = outcome.points.len() / 3;
  let attributes = reattach_passthrough(algorithm, passthrough, output_points);
  let cell_count = match algorithm {
    Algorithm::Smooth => None,
    Algorithm::Downsample | Algorithm::VoxelDebug => Some(outcome.cell_count),
  };
  Ok(TransformResponse::success(
    outcome.points,
    cell_count,
    outcome.processing_time,
    attributes,
  ))
}
