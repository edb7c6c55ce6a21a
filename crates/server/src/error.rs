use pointserve_core::{Algorithm, CoreError, Variant};
use pool::PoolError;
use protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;
use tools::ToolError;

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("WebSocket error: {0}")]
  Ws(#[from] tokio_tungstenite::tungstenite::Error),

  #[error("{0}")]
  Core(#[from] CoreError),

  #[error("{0}")]
  Protocol(#[from] ProtocolError),

  #[error("{0}")]
  Pool(#[from] PoolError),

  #[error("worker output did not parse: {0}")]
  Output(#[from] ToolError),

  #[error("no backend registered for {algorithm} ({variant})")]
  NoBackend { algorithm: Algorithm, variant: Variant },

  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  #[error("unexpected frame: {0}")]
  UnexpectedFrame(String),

  #[error("operation failed: {0}")]
  Operation(String),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("server shutting down")]
  Shutdown,
}
