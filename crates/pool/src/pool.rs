//! Fixed-capacity pool of worker processes for one (algorithm, variant).

use crate::command::{WireForm, WorkerCommand};
use crate::error::PoolError;
use crate::handle::WorkerHandle;
use pointserve_core::{Algorithm, Variant};
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

struct PoolState {
  idle: VecDeque<WorkerHandle>,
  busy: usize,
}

impl PoolState {
  fn live(&self) -> usize {
    self.idle.len() + self.busy
  }
}

/// Owns up to `capacity` worker handles. `acquire` suspends the calling
/// task until a handle is idle (or a deficit slot can be filled by an
/// inline spawn); `release` recycles the handle or, when its process has
/// exited, heals the pool. `|idle| + busy` never exceeds `capacity`.
pub struct ProcessPool {
  algorithm: Algorithm,
  variant: Variant,
  command: WorkerCommand,
  capacity: usize,
  prewarm: bool,
  state: Mutex<PoolState>,
  available: Notify,
}

impl ProcessPool {
  /// Create the pool. Prewarming spawns `capacity` workers up front so the
  /// first requests find warm processes; a prewarm launch failure is fatal
  /// since the backend would never work.
  pub async fn new(
    algorithm: Algorithm,
    variant: Variant,
    command: WorkerCommand,
    capacity: usize,
    prewarm: bool,
  ) -> Result<Self, PoolError> {
    let capacity = capacity.max(1);
    let mut idle = VecDeque::with_capacity(capacity);
    if prewarm {
      for _ in 0..capacity {
        let mut handle = WorkerHandle::spawn(&command)?;
        handle.set_idle();
        idle.push_back(handle);
      }
    }
    debug!(%algorithm, %variant, capacity, prewarm, "created process pool");
    Ok(Self {
      algorithm,
      variant,
      command,
      capacity,
      prewarm,
      state: Mutex::new(PoolState { idle, busy: 0 }),
      available: Notify::new(),
    })
  }

  pub fn algorithm(&self) -> Algorithm {
    self.algorithm
  }

  pub fn variant(&self) -> Variant {
    self.variant
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn wire_form(&self) -> WireForm {
    self.command.wire
  }

  /// Handles currently alive (idle or serving a request).
  pub async fn live_count(&self) -> usize {
    self.state.lock().await.live()
  }

  /// Take an idle handle, spawning one if the pool is below capacity. Waits
  /// as long as it takes otherwise; the caller's own deadline bounds the
  /// wait. A launch failure surfaces here, to exactly the request that
  /// needed the spawn.
  pub async fn acquire(&self) -> Result<WorkerHandle, PoolError> {
    loop {
      {
        let mut state = self.state.lock().await;
        while let Some(mut handle) = state.idle.pop_front() {
          // An idle worker can die between requests; never hand out a
          // corpse.
          if handle.is_alive() {
            state.busy += 1;
            return Ok(handle);
          }
          warn!(algorithm = %self.algorithm, variant = %self.variant, handle = handle.id(), "idle worker died, discarding");
        }
        if state.busy < self.capacity {
          let handle = WorkerHandle::spawn(&self.command)?;
          state.busy += 1;
          return Ok(handle);
        }
      }
      self.available.notified().await;
    }
  }

  /// Return a handle after a request. A still-alive worker goes back to
  /// idle; an exited one (the normal end state for EOF-terminated workers,
  /// and the crashed state alike) is retired and the pool self-heals.
  pub async fn release(&self, mut handle: WorkerHandle) {
    let mut state = self.state.lock().await;
    state.busy = state.busy.saturating_sub(1);
    if handle.is_alive() {
      handle.set_idle();
      state.idle.push_back(handle);
    } else {
      drop(handle);
      self.heal(&mut state);
    }
    drop(state);
    self.available.notify_one();
  }

  /// Retire a handle without inspecting it (dispatch failed mid-flight).
  pub async fn discard(&self, mut handle: WorkerHandle) {
    handle.kill().await;
    let mut state = self.state.lock().await;
    state.busy = state.busy.saturating_sub(1);
    drop(handle);
    self.heal(&mut state);
    drop(state);
    self.available.notify_one();
  }

  /// Restore capacity after a handle was removed. Unconditional and not
  /// rate-limited; a failed replacement spawn leaves the deficit to the
  /// inline spawn in `acquire`, which reports the failure to a caller.
  fn heal(&self, state: &mut PoolState) {
    if !self.prewarm {
      return;
    }
    while state.live() < self.capacity {
      match WorkerHandle::spawn(&self.command) {
        Ok(mut handle) => {
          handle.set_idle();
          state.idle.push_back(handle);
        }
        Err(err) => {
          warn!(algorithm = %self.algorithm, variant = %self.variant, error = %err, "failed to replace worker");
          break;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;
  use std::sync::Arc;
  use std::time::Duration;

  fn cat_command() -> WorkerCommand {
    WorkerCommand {
      program: PathBuf::from("cat"),
      args: Vec::new(),
      wire: WireForm::Text,
    }
  }

  async fn new_pool(capacity: usize, prewarm: bool) -> Arc<ProcessPool> {
    Arc::new(
      ProcessPool::new(Algorithm::Smooth, Variant::Pooled, cat_command(), capacity, prewarm)
        .await
        .unwrap(),
    )
  }

  #[tokio::test]
  async fn test_prewarm_fills_to_capacity() {
    let pool = new_pool(3, true).await;
    assert_eq!(pool.live_count().await, 3);
  }

  #[tokio::test]
  async fn test_acquire_is_exclusive_until_release() {
    let pool = new_pool(1, true).await;
    let first = pool.acquire().await.unwrap();

    let contender = {
      let pool = Arc::clone(&pool);
      tokio::spawn(async move { pool.acquire().await.unwrap().id() })
    };

    // The second caller must still be suspended while the handle is out.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!contender.is_finished());

    let first_id = first.id();
    pool.release(first).await;
    let second_id = contender.await.unwrap();
    // Same pool slot, same (still-alive) worker.
    assert_eq!(second_id, first_id);
  }

  #[tokio::test]
  async fn test_release_returns_live_handle_to_idle() {
    let pool = new_pool(2, true).await;
    let handle = pool.acquire().await.unwrap();
    assert_eq!(pool.live_count().await, 2);
    pool.release(handle).await;
    assert_eq!(pool.live_count().await, 2);
  }

  #[tokio::test]
  async fn test_heals_after_worker_killed_mid_request() {
    let pool = new_pool(2, true).await;
    let mut handle = pool.acquire().await.unwrap();
    handle.kill().await;
    pool.release(handle).await;
    // Capacity restored by a replacement spawn before any new acquire.
    assert_eq!(pool.live_count().await, 2);
  }

  #[tokio::test]
  async fn test_discard_replaces_handle() {
    let pool = new_pool(2, true).await;
    let handle = pool.acquire().await.unwrap();
    pool.discard(handle).await;
    assert_eq!(pool.live_count().await, 2);
  }

  #[tokio::test]
  async fn test_on_demand_spawns_per_acquire() {
    let pool = new_pool(1, false).await;
    assert_eq!(pool.live_count().await, 0);
    let mut handle = pool.acquire().await.unwrap();
    assert_eq!(pool.live_count().await, 1);
    let out = handle.run_request(b"ping\n").await.unwrap();
    assert_eq!(out, b"ping\n");
    pool.release(handle).await;
    // The one-shot worker exited and on-demand pools do not prewarm
    // replacements.
    assert_eq!(pool.live_count().await, 0);
  }

  #[tokio::test]
  async fn test_launch_failure_surfaces_to_acquirer() {
    let command = WorkerCommand {
      program: PathBuf::from("/nonexistent/worker-binary"),
      args: Vec::new(),
      wire: WireForm::Text,
    };
    let pool = ProcessPool::new(Algorithm::Smooth, Variant::OnDemand, command, 1, false)
      .await
      .unwrap();
    assert!(matches!(pool.acquire().await, Err(PoolError::Launch { .. })));
  }

  #[tokio::test]
  async fn test_many_concurrent_acquires_never_share() {
    let pool = new_pool(4, true).await;
    let mut tasks = Vec::new();
    for _ in 0..16 {
      let pool = Arc::clone(&pool);
      tasks.push(tokio::spawn(async move {
        let mut handle = pool.acquire().await.unwrap();
        let id = handle.id();
        let out = handle.run_request(b"x").await.unwrap();
        assert_eq!(out, b"x");
        pool.release(handle).await;
        id
      }));
    }
    let mut ids = Vec::new();
    for task in tasks {
      ids.push(task.await.unwrap());
    }
    // Every request ran on a worker it owned exclusively: 16 one-shot
    // requests consumed 16 distinct processes.
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
  }
}
