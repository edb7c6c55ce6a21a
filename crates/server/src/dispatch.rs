//! The per-request execution path: select a pool, acquire a worker, run the
//! wire exchange, parse the EOF-terminated output, release the handle.

use crate::error::ServerError;
use pointserve_core::{Algorithm, GlobalBounds, PointAttributes, PointCloud, Variant};
use pool::{PoolRegistry, WireForm};
use protocol::RequestParams;
use std::sync::Arc;
use std::time::Instant;
use tools::wire::{GridJob, JobOutput, SmoothJob};
use tracing::{debug, warn};

/// Result of one operation, transport-agnostic.
#[derive(Debug)]
pub struct OperationOutcome {
  pub points: Vec<f32>,
  pub cell_count: usize,
  /// Milliseconds spent from acquire to parsed output.
  pub processing_time: f64,
}

/// Stateless executor over an explicitly-owned pool registry.
pub struct Dispatcher {
  registry: Arc<PoolRegistry>,
}

impl Dispatcher {
  pub fn new(registry: Arc<PoolRegistry>) -> Self {
    Self { registry }
  }

  /// Run one operation end to end. Validation happens before any process
  /// is touched; every later failure still releases or discards the worker
  /// handle so pool capacity cannot leak.
  pub async fn execute(
    &self,
    params: &RequestParams,
    variant: Variant,
    points: &PointCloud,
  ) -> Result<OperationOutcome, ServerError> {
    params.validate()?;
    let algorithm = params.algorithm();
    let pool = self
      .registry
      .get(algorithm, variant)
      .ok_or(ServerError::NoBackend { algorithm, variant })?;

    let request = encode_request(params, points, pool.wire_form())?;

    let start = Instant::now();
    let mut handle = pool.acquire().await?;
    debug!(%algorithm, %variant, handle = handle.id(), points = points.len(), "dispatching to worker");

    let raw = match handle.run_request(&request).await {
      Ok(raw) => {
        // A zero exit leaves the handle healthy as far as the pool is
        // concerned, even when its output later fails to parse.
        pool.release(handle).await;
        raw
      }
      Err(err) => {
        pool.release(handle).await;
        return Err(err.into());
      }
    };

    let output = parse_response(&raw, pool.wire_form())?;
    let processing_time = start.elapsed().as_secs_f64() * 1000.0;
    debug!(%algorithm, cells = output.count, ms = processing_time, "worker completed");

    Ok(OperationOutcome {
      points: output.points,
      cell_count: output.count,
      processing_time,
    })
  }
}

/// Serialize the logical request in the wire form the worker expects. Grid
/// operations fall back to bounds derived from the payload when the client
/// sent none; grid alignment across processes is only guaranteed with
/// client-supplied bounds.
fn encode_request(
  params: &RequestParams,
  points: &PointCloud,
  wire: WireForm,
) -> Result<Vec<u8>, ServerError> {
  let text = match params {
    RequestParams::Downsample { voxel_size, global_bounds }
    | RequestParams::VoxelDebug { voxel_size, global_bounds } => {
      let bounds = global_bounds
        .or_else(|| GlobalBounds::from_flat_points(points.as_flat()))
        .unwrap_or(GlobalBounds::new([0.0; 3], [0.0; 3]));
      let job = GridJob {
        points: points.as_flat().to_vec(),
        voxel_size: *voxel_size,
        global_bounds: bounds,
      };
      match wire {
        WireForm::Text => job.encode_text(),
        WireForm::Json => job.encode_json()?,
      }
    }
    RequestParams::Smooth { smoothing_radius, iterations } => {
      let job = SmoothJob {
        points: points.as_flat().to_vec(),
        smoothing_radius: *smoothing_radius,
        iterations: *iterations,
      };
      match wire {
        WireForm::Text => job.encode_text(),
        WireForm::Json => job.encode_json()?,
      }
    }
  };
  Ok(text.into_bytes())
}

/// Re-attach pass-through attributes to a result, honoring the operation's
/// point-identity guarantee. Operations that change the point population
/// always drop them; for smoothing, any array whose length no longer
/// matches is dropped rather than guessed at.
pub(crate) fn reattach_passthrough(
  algorithm: Algorithm,
  passthrough: PointAttributes,
  output_points: usize,
) -> PointAttributes {
  if passthrough.is_empty() {
    return PointAttributes::default();
  }
  if !algorithm.preserves_point_identity() {
    warn!(%algorithm, "pass-through attributes dropped: operation does not preserve per-point correspondence");
    return PointAttributes::default();
  }
  let had_colors = passthrough.colors.is_some();
  let had_intensities = passthrough.intensities.is_some();
  let had_classifications = passthrough.classifications.is_some();
  let matched = passthrough.matched_to(output_points);
  if (had_colors && matched.colors.is_none())
    || (had_intensities && matched.intensities.is_none())
    || (had_classifications && matched.classifications.is_none())
  {
    warn!(%algorithm, output_points, "pass-through attribute length mismatch; array dropped");
  }
  matched
}

fn parse_response(raw: &[u8], wire: WireForm) -> Result<JobOutput, ServerError> {
  let text = std::str::from_utf8(raw)
    .map_err(|_| ServerError::UnexpectedFrame("worker emitted non-UTF8 output".to_string()))?;
  let output = match wire {
    WireForm::Text => JobOutput::parse_text(text)?,
    WireForm::Json => JobOutput::parse_json(text)?,
  };
  Ok(output)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pointserve_core::Algorithm;
  use pool::{PoolRegistry, ProcessPool, WorkerCommand};
  use std::path::PathBuf;

  fn sh_worker(script: &str) -> WorkerCommand {
    WorkerCommand {
      program: PathBuf::from("sh"),
      args: vec!["-c".to_string(), script.to_string()],
      wire: WireForm::Text,
    }
  }

  /// Echoes the request back in valid response shape: first header token as
  /// the count line, then the data line unchanged.
  const IDENTITY_WORKER: &str = r#"read header; read data; set -- $header; echo "$1"; echo "$data""#;

  async fn registry_with(algorithm: Algorithm, command: WorkerCommand) -> Arc<PoolRegistry> {
    let pool = ProcessPool::new(algorithm, Variant::Pooled, command, 2, true).await.unwrap();
    Arc::new(PoolRegistry::from_pools(vec![Arc::new(pool)]))
  }

  #[tokio::test]
  async fn test_execute_smooth_roundtrip() {
    let registry = registry_with(Algorithm::Smooth, sh_worker(IDENTITY_WORKER)).await;
    let dispatcher = Dispatcher::new(registry);
    let points = PointCloud::from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let params = RequestParams::Smooth { smoothing_radius: 0.5, iterations: 1 };

    let outcome = dispatcher.execute(&params, Variant::Pooled, &points).await.unwrap();
    assert_eq!(outcome.cell_count, 2);
    assert_eq!(outcome.points, points.as_flat());
    assert!(outcome.processing_time >= 0.0);
  }

  #[tokio::test]
  async fn test_validation_rejects_before_touching_pool() {
    // No pool registered at all: invalid params must fail first.
    let dispatcher = Dispatcher::new(Arc::new(PoolRegistry::from_pools(vec![])));
    let points = PointCloud::from_flat(vec![0.0; 3]).unwrap();
    let params = RequestParams::Smooth { smoothing_radius: 0.0, iterations: 1 };
    let err = dispatcher.execute(&params, Variant::Pooled, &points).await.unwrap_err();
    assert!(matches!(err, ServerError::Protocol(_)));
  }

  #[tokio::test]
  async fn test_missing_backend_reported() {
    let dispatcher = Dispatcher::new(Arc::new(PoolRegistry::from_pools(vec![])));
    let points = PointCloud::from_flat(vec![0.0; 3]).unwrap();
    let params = RequestParams::Smooth { smoothing_radius: 0.5, iterations: 1 };
    let err = dispatcher.execute(&params, Variant::Scripted, &points).await.unwrap_err();
    assert!(matches!(err, ServerError::NoBackend { .. }));
  }

  #[tokio::test]
  async fn test_worker_crash_surfaces_and_pool_heals() {
    let registry =
      registry_with(Algorithm::Smooth, sh_worker("cat >/dev/null; echo broken >&2; exit 9")).await;
    let pool = registry.get(Algorithm::Smooth, Variant::Pooled).unwrap();
    let dispatcher = Dispatcher::new(Arc::clone(&registry));

    let points = PointCloud::from_flat(vec![0.0; 6]).unwrap();
    let params = RequestParams::Smooth { smoothing_radius: 0.5, iterations: 1 };
    let err = dispatcher.execute(&params, Variant::Pooled, &points).await.unwrap_err();
    assert!(matches!(err, ServerError::Pool(pool::PoolError::WorkerFailed { .. })));

    // The dead worker was replaced before any new acquire.
    assert_eq!(pool.live_count().await, 2);
  }

  #[tokio::test]
  async fn test_unparseable_output_is_output_error() {
    let registry =
      registry_with(Algorithm::Smooth, sh_worker("cat >/dev/null; echo not-a-count")).await;
    let dispatcher = Dispatcher::new(registry);
    let points = PointCloud::from_flat(vec![0.0; 3]).unwrap();
    let params = RequestParams::Smooth { smoothing_radius: 0.5, iterations: 1 };
    let err = dispatcher.execute(&params, Variant::Pooled, &points).await.unwrap_err();
    assert!(matches!(err, ServerError::Output(_)));
  }
}
