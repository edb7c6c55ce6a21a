use crate::error::ProtocolError;
use crate::frame::RequestParams;
use pointserve_core::{Algorithm, GlobalBounds, PointAttributes, Variant};
use serde::{Deserialize, Serialize};

/// Single-shot request body: one JSON document per call, points inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    pub points: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voxel_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing_radius: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_bounds: Option<GlobalBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensities: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<u8>>,
}

impl TransformRequest {
    /// Resolve the body against the operation the URL named.
    pub fn params_for(&self, algorithm: Algorithm) -> Result<RequestParams, ProtocolError> {
        let params = match algorithm {
            Algorithm::Downsample => RequestParams::Downsample {
                voxel_size: self
                    .voxel_size
                    .ok_or_else(|| ProtocolError::InvalidParameter("voxelSize is required".to_string()))?,
                global_bounds: self.global_bounds,
            },
            Algorithm::Smooth => RequestParams::Smooth {
                smoothing_radius: self.smoothing_radius.ok_or_else(|| {
                    ProtocolError::InvalidParameter("smoothingRadius is required".to_string())
                })?,
                iterations: self.iterations.unwrap_or(1),
            },
            Algorithm::VoxelDebug => RequestParams::VoxelDebug {
                voxel_size: self
                    .voxel_size
                    .ok_or_else(|| ProtocolError::InvalidParameter("voxelSize is required".to_string()))?,
                global_bounds: self.global_bounds,
            },
        };
        params.validate()?;
        Ok(params)
    }

    pub fn passthrough(&self) -> PointAttributes {
        PointAttributes {
            colors: self.colors.clone(),
            intensities: self.intensities.clone(),
            classifications: self.classifications.clone(),
        }
    }
}

/// Single-shot response body. `processingTime` is milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voxel_count: Option<usize>,
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensities: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransformResponse {
    pub fn success(
        points: Vec<f32>,
        voxel_count: Option<usize>,
        processing_time: f64,
        attributes: PointAttributes,
    ) -> Self {
        Self {
            success: true,
            points: Some(points),
            voxel_count,
            processing_time,
            colors: attributes.colors,
            intensities: attributes.intensities,
            classifications: attributes.classifications,
            error: None,
        }
    }

    pub fn failure(error: String, processing_time: f64) -> Self {
        Self {
            success: false,
            points: None,
            voxel_count: None,
            processing_time,
            colors: None,
            intensities: None,
            classifications: None,
            error: Some(error),
        }
    }
}
