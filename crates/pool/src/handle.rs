//! Handle to one externally-launched worker process.

use crate::command::WorkerCommand;
use crate::error::PoolError;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
  Starting,
  Idle,
  Busy,
  Dead,
}

/// Wraps one worker process and owns its stdio. A handle belongs to exactly
/// one pool and is never shared between two in-flight requests; the pool's
/// acquire/release is the only synchronization around it.
pub struct WorkerHandle {
  id: u64,
  child: Child,
  status: HandleStatus,
}

impl WorkerHandle {
  /// Launch the worker. The child is killed if the handle is dropped while
  /// the process still runs, so a dropped pool cannot leak processes.
  pub fn spawn(command: &WorkerCommand) -> Result<Self, PoolError> {
    let child = Command::new(&command.program)
      .args(&command.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| PoolError::Launch {
        program: command.program.display().to_string(),
        source,
      })?;

    let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
    debug!(handle = id, program = %command.program.display(), "spawned worker");
    Ok(Self {
      id,
      child,
      status: HandleStatus::Starting,
    })
  }

  /// Mark the handle parked in its pool's idle set.
  pub(crate) fn set_idle(&mut self) {
    self.status = HandleStatus::Idle;
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn status(&self) -> HandleStatus {
    self.status
  }

  /// Non-blocking liveness check.
  pub fn is_alive(&mut self) -> bool {
    if self.status == HandleStatus::Dead {
      return false;
    }
    match self.child.try_wait() {
      Ok(None) => true,
      _ => {
        self.status = HandleStatus::Dead;
        false
      }
    }
  }

  /// Run one request through the worker: write the wire bytes to stdin,
  /// close it, buffer stdout until the worker closes the stream, then check
  /// the exit code. EOF is the only completion signal the worker sends, so
  /// the handle is Dead afterwards regardless of outcome.
  ///
  /// A non-zero exit discards the buffered stdout in favor of stderr.
  pub async fn run_request(&mut self, request: &[u8]) -> Result<Vec<u8>, PoolError> {
    self.status = HandleStatus::Busy;

    let mut stdin = self.child.stdin.take().ok_or(PoolError::StdioUnavailable)?;
    let mut stdout = self.child.stdout.take().ok_or(PoolError::StdioUnavailable)?;
    let mut stderr = self.child.stderr.take().ok_or(PoolError::StdioUnavailable)?;

    stdin.write_all(request).await?;
    stdin.shutdown().await?;
    drop(stdin);

    // Drain both streams together so a chatty stderr cannot stall stdout.
    let mut out = Vec::new();
    let mut err = Vec::new();
    let (out_result, err_result) = tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
    out_result?;
    err_result?;

    let exit = self.child.wait().await?;
    self.status = HandleStatus::Dead;

    if !exit.success() {
      return Err(PoolError::WorkerFailed {
        status: exit,
        stderr: String::from_utf8_lossy(&err).trim().to_string(),
      });
    }
    Ok(out)
  }

  /// Forcibly terminate the worker.
  pub async fn kill(&mut self) {
    let _ = self.child.start_kill();
    let _ = self.child.wait().await;
    self.status = HandleStatus::Dead;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn command(program: &str, args: &[&str]) -> WorkerCommand {
    WorkerCommand {
      program: PathBuf::from(program),
      args: args.iter().map(|a| a.to_string()).collect(),
      wire: crate::command::WireForm::Text,
    }
  }

  #[tokio::test]
  async fn test_run_request_echo() {
    let mut handle = WorkerHandle::spawn(&command("cat", &[])).unwrap();
    let out = handle.run_request(b"hello worker\n").await.unwrap();
    assert_eq!(out, b"hello worker\n");
    assert_eq!(handle.status(), HandleStatus::Dead);
  }

  #[tokio::test]
  async fn test_nonzero_exit_surfaces_stderr() {
    let mut handle =
      WorkerHandle::spawn(&command("sh", &["-c", "echo oops >&2; exit 3"])).unwrap();
    let err = handle.run_request(b"").await.unwrap_err();
    match err {
      PoolError::WorkerFailed { stderr, .. } => assert_eq!(stderr, "oops"),
      other => panic!("expected WorkerFailed, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_missing_program_is_launch_error() {
    let result = WorkerHandle::spawn(&command("/nonexistent/worker-binary", &[]));
    assert!(matches!(result, Err(PoolError::Launch { .. })));
  }

  #[tokio::test]
  async fn test_is_alive_tracks_exit() {
    let mut handle = WorkerHandle::spawn(&command("cat", &[])).unwrap();
    assert!(handle.is_alive());
    handle.kill().await;
    assert!(!handle.is_alive());
    assert_eq!(handle.status(), HandleStatus::Dead);
  }
}
