//! Service configuration with TOML file loading.
//!
//! All fields have serde defaults so a partial config file (or none at all)
//! yields a runnable service.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PointserveConfig {
  pub server: ServerConfig,
  pub pools: PoolsConfig,
  pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Persistent duplex (WebSocket) listen address.
  pub ws_addr: String,
  /// Single-shot HTTP listen address.
  pub http_addr: String,
  /// Per-request deadline in seconds. The deadline fires independently of
  /// the worker; a late result is discarded, not delivered.
  pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      ws_addr: "127.0.0.1:9400".to_string(),
      http_addr: "127.0.0.1:9401".to_string(),
      request_timeout_secs: 60,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
  /// Capacity of the pooled native variant, chosen for pipeline-style
  /// concurrent use.
  pub pooled_capacity: usize,
  /// On-demand variants spawn fresh per call; capacity 1 serializes them.
  pub on_demand_capacity: usize,
  pub scripted_capacity: usize,
}

impl Default for PoolsConfig {
  fn default() -> Self {
    Self {
      pooled_capacity: 4,
      on_demand_capacity: 1,
      scripted_capacity: 1,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
  /// Directory holding the native worker executables. Defaults to the
  /// directory of the running server binary.
  pub bin_dir: Option<PathBuf>,
  /// Interpreter for the scripted variant.
  pub python: String,
  /// Directory holding the scripted workers.
  pub script_dir: PathBuf,
}

impl Default for WorkersConfig {
  fn default() -> Self {
    Self {
      bin_dir: None,
      python: "python3".to_string(),
      script_dir: PathBuf::from("workers"),
    }
  }
}

impl PointserveConfig {
  /// Load from a TOML file.
  pub fn load(path: &Path) -> Result<Self, CoreError> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
  }

  /// Load from a file if given, otherwise defaults.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self, CoreError> {
    match path {
      Some(p) => Self::load(p),
      None => Ok(Self::default()),
    }
  }
}

impl WorkersConfig {
  /// Resolve the native worker directory, falling back to the directory of
  /// the current executable.
  pub fn resolved_bin_dir(&self) -> Result<PathBuf, CoreError> {
    if let Some(dir) = &self.bin_dir {
      return Ok(dir.clone());
    }
    let exe = std::env::current_exe()?;
    exe
      .parent()
      .map(Path::to_path_buf)
      .ok_or_else(|| CoreError::Config("executable has no parent directory".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = PointserveConfig::default();
    assert_eq!(config.server.ws_addr, "127.0.0.1:9400");
    assert_eq!(config.pools.pooled_capacity, 4);
    assert_eq!(config.workers.python, "python3");
  }

  #[test]
  fn test_partial_toml_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pointserve.toml");
    std::fs::write(
      &path,
      "[server]\nws_addr = \"0.0.0.0:7000\"\n\n[pools]\npooled_capacity = 8\n",
    )
    .unwrap();

    let config = PointserveConfig::load(&path).unwrap();
    assert_eq!(config.server.ws_addr, "0.0.0.0:7000");
    assert_eq!(config.server.request_timeout_secs, 60);
    assert_eq!(config.pools.pooled_capacity, 8);
    assert_eq!(config.pools.on_demand_capacity, 1);
  }

  #[test]
  fn test_load_or_default_without_path() {
    let config = PointserveConfig::load_or_default(None).unwrap();
    assert_eq!(config.pools.scripted_capacity, 1);
  }
}
