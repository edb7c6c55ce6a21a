//! One pool per (algorithm, variant) pair, built once at startup.

use crate::command::worker_command;
use crate::error::PoolError;
use crate::pool::ProcessPool;
use pointserve_core::{Algorithm, PointserveConfig, Variant};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Explicitly constructed pool map handed to the router, never a
/// process-wide singleton.
pub struct PoolRegistry {
  pools: HashMap<(Algorithm, Variant), Arc<ProcessPool>>,
}

impl PoolRegistry {
  /// Build every (algorithm, variant) pool from config. Pooled variants are
  /// prewarmed; on-demand and scripted variants spawn per call.
  pub async fn from_config(config: &PointserveConfig) -> Result<Self, PoolError> {
    let mut pools = HashMap::new();
    for algorithm in Algorithm::ALL {
      for variant in Variant::ALL {
        let command = worker_command(algorithm, variant, &config.workers)
          .map_err(|err| PoolError::Launch {
            program: format!("{algorithm}/{variant}"),
            source: std::io::Error::other(err.to_string()),
          })?;
        let (capacity, prewarm) = match variant {
          Variant::Pooled => (config.pools.pooled_capacity, true),
          Variant::OnDemand => (config.pools.on_demand_capacity, false),
          Variant::Scripted => (config.pools.scripted_capacity, false),
        };
        let pool = ProcessPool::new(algorithm, variant, command, capacity, prewarm).await?;
        pools.insert((algorithm, variant), Arc::new(pool));
      }
    }
    info!(pools = pools.len(), "process pools ready");
    Ok(Self { pools })
  }

  /// Build a registry from an explicit pool list (tests wire fake workers
  /// this way).
  pub fn from_pools(list: Vec<Arc<ProcessPool>>) -> Self {
    let mut pools = HashMap::new();
    for pool in list {
      pools.insert((pool.algorithm(), pool.variant()), pool);
    }
    Self { pools }
  }

  pub fn get(&self, algorithm: Algorithm, variant: Variant) -> Option<Arc<ProcessPool>> {
    self.pools.get(&(algorithm, variant)).cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::{WireForm, WorkerCommand};
  use std::path::PathBuf;

  #[tokio::test]
  async fn test_from_pools_keys_by_pair() {
    let command = WorkerCommand {
      program: PathBuf::from("cat"),
      args: Vec::new(),
      wire: WireForm::Text,
    };
    let pool = ProcessPool::new(Algorithm::Downsample, Variant::OnDemand, command, 1, false)
      .await
      .unwrap();
    let registry = PoolRegistry::from_pools(vec![Arc::new(pool)]);
    assert!(registry.get(Algorithm::Downsample, Variant::OnDemand).is_some());
    assert!(registry.get(Algorithm::Downsample, Variant::Pooled).is_none());
    assert!(registry.get(Algorithm::Smooth, Variant::OnDemand).is_none());
  }
}
