//! Per-connection map of in-flight requests.
//!
//! One ledger is built at connection-open and torn down at connection-close;
//! it exclusively owns every `PendingRequest` it holds. Completion and
//! deadline expiry race through `complete()`: whichever removes the entry
//! first speaks for the request, and the loser finds nothing and discards
//! its result.

use pointserve_core::{Algorithm, PointAttributes};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Everything the connection keeps on the client-facing side of a dispatch.
#[derive(Debug)]
pub struct PendingRequest {
  pub algorithm: Algorithm,
  /// Pass-through attributes, re-attached on completion when the
  /// operation's point-identity guarantee allows it.
  pub passthrough: PointAttributes,
  pub issued_at: Instant,
}

#[derive(Debug, Default)]
pub struct RequestLedger {
  pending: Mutex<HashMap<u64, PendingRequest>>,
}

impl RequestLedger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an in-flight request. Fails if the id is already pending:
  /// request ids are the only correlation mechanism, so reuse before
  /// completion is a caller error.
  pub fn insert(&self, request_id: u64, pending: PendingRequest) -> Result<(), PendingRequest> {
    let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    if map.contains_key(&request_id) {
      return Err(pending);
    }
    map.insert(request_id, pending);
    Ok(())
  }

  /// Remove and return the entry, if it is still pending. Returns `None`
  /// when the request already completed or its deadline already fired; the
  /// caller must then discard whatever result it holds.
  pub fn complete(&self, request_id: u64) -> Option<PendingRequest> {
    let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    map.remove(&request_id)
  }

  /// Drain everything still pending (connection teardown).
  pub fn drain(&self) -> Vec<(u64, PendingRequest)> {
    let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    map.drain().collect()
  }

  pub fn len(&self) -> usize {
    let map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
