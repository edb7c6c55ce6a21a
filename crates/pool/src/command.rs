//! Resolution of (algorithm, variant) pairs to launchable worker commands.

use pointserve_core::{Algorithm, CoreError, Variant, WorkersConfig};
use std::path::PathBuf;

/// Which stdio encoding a worker speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireForm {
  /// Newline-terminated header line plus space-separated floats.
  Text,
  /// A single JSON document each way.
  Json,
}

/// How to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub wire: WireForm,
}

fn native_bin(algorithm: Algorithm) -> &'static str {
  match algorithm {
    Algorithm::Downsample => "voxel-downsample-worker",
    Algorithm::Smooth => "point-smooth-worker",
    Algorithm::VoxelDebug => "voxel-debug-worker",
  }
}

fn script_name(algorithm: Algorithm) -> &'static str {
  match algorithm {
    Algorithm::Downsample => "voxel_downsample.py",
    Algorithm::Smooth => "point_smooth.py",
    Algorithm::VoxelDebug => "voxel_debug.py",
  }
}

/// Build the launch command for an (algorithm, variant) pair.
pub fn worker_command(
  algorithm: Algorithm,
  variant: Variant,
  workers: &WorkersConfig,
) -> Result<WorkerCommand, CoreError> {
  match variant {
    Variant::Pooled | Variant::OnDemand => {
      let bin_dir = workers.resolved_bin_dir()?;
      Ok(WorkerCommand {
        program: bin_dir.join(native_bin(algorithm)),
        args: Vec::new(),
        wire: WireForm::Text,
      })
    }
    Variant::Scripted => {
      let script = workers.script_dir.join(script_name(algorithm));
      Ok(WorkerCommand {
        program: PathBuf::from(&workers.python),
        args: vec![script.to_string_lossy().into_owned()],
        wire: WireForm::Json,
      })
    }
  }
}
