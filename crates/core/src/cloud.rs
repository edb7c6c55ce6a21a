//! Point buffers and per-point pass-through attributes.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// A point cloud as a flat `[x, y, z, x, y, z, ...]` buffer of `f32`.
///
/// This is the shape both transport surfaces and the worker processes speak;
/// keeping it flat avoids a copy at every boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
  data: Vec<f32>,
}

impl PointCloud {
  pub fn from_flat(data: Vec<f32>) -> Result<Self, CoreError> {
    if data.len() % 3 != 0 {
      return Err(CoreError::UnalignedPoints(data.len()));
    }
    Ok(Self { data })
  }

  /// Decode a little-endian `f32` payload, 12 bytes per point.
  pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
    if bytes.len() % 12 != 0 {
      return Err(CoreError::UnalignedPayload(bytes.len()));
    }
    let data = bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect();
    Ok(Self { data })
  }

  /// Encode as little-endian bytes, 12 per point.
  pub fn to_le_bytes(&self) -> Vec<u8> {
    let mut out = Vec::with_capacity(self.data.len() * 4);
    for f in &self.data {
      out.extend_from_slice(&f.to_le_bytes());
    }
    out
  }

  /// Number of points (not floats).
  pub fn len(&self) -> usize {
    self.data.len() / 3
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_flat(&self) -> &[f32] {
    &self.data
  }

  pub fn into_flat(self) -> Vec<f32> {
    self.data
  }

  pub fn point(&self, i: usize) -> [f32; 3] {
    let i3 = i * 3;
    [self.data[i3], self.data[i3 + 1], self.data[i3 + 2]]
  }

  pub fn iter_points(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
    self.data.chunks_exact(3).map(|c| [c[0], c[1], c[2]])
  }
}

/// Per-point auxiliary arrays the client wants echoed back unchanged.
///
/// These never travel to a worker process; the router holds them alongside
/// the pending request and re-attaches them when the transformed positions
/// come back, provided per-point correspondence still holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointAttributes {
  /// RGB triples, 3 floats per point.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub colors: Option<Vec<f32>>,
  /// One float per point.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub intensities: Option<Vec<f32>>,
  /// One byte per point.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub classifications: Option<Vec<u8>>,
}

impl PointAttributes {
  pub fn is_empty(&self) -> bool {
    self.colors.is_none() && self.intensities.is_none() && self.classifications.is_none()
  }

  /// Keep only the arrays whose length matches `point_count`. A mismatched
  /// array means per-point correspondence is broken, so it is dropped rather
  /// than truncated or index-shifted.
  pub fn matched_to(self, point_count: usize) -> PointAttributes {
    PointAttributes {
      colors: self.colors.filter(|c| c.len() == point_count * 3),
      intensities: self.intensities.filter(|i| i.len() == point_count),
      classifications: self.classifications.filter(|c| c.len() == point_count),
    }
  }
}
