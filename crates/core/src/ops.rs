//! Operation and backend-variant identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three point-cloud transformations the service offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
  Downsample,
  Smooth,
  VoxelDebug,
}

impl Algorithm {
  pub const ALL: [Algorithm; 3] = [Algorithm::Downsample, Algorithm::Smooth, Algorithm::VoxelDebug];

  /// Whether the operation preserves per-point identity (count and order).
  /// Pass-through attribute re-attachment is only valid when it does.
  pub fn preserves_point_identity(self) -> bool {
    matches!(self, Algorithm::Smooth)
  }
}

impl fmt::Display for Algorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Algorithm::Downsample => write!(f, "downsample"),
      Algorithm::Smooth => write!(f, "smooth"),
      Algorithm::VoxelDebug => write!(f, "voxel-debug"),
    }
  }
}

/// Interchangeable backend flavors, kept for throughput comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
  /// Long-lived pre-spawned native workers.
  #[default]
  Pooled,
  /// A fresh native worker per call.
  OnDemand,
  /// Interpreter-launched script per call.
  Scripted,
}

impl Variant {
  pub const ALL: [Variant; 3] = [Variant::Pooled, Variant::OnDemand, Variant::Scripted];
}

impl fmt::Display for Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Variant::Pooled => write!(f, "pooled"),
      Variant::OnDemand => write!(f, "on-demand"),
      Variant::Scripted => write!(f, "scripted"),
    }
  }
}
