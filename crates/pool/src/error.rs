use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
  #[error("failed to launch worker {program}: {source}")]
  Launch {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("worker stdio was not captured")]
  StdioUnavailable,

  #[error("worker IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("worker exited with {status}: {stderr}")]
  WorkerFailed {
    status: std::process::ExitStatus,
    stderr: String,
  },
}
