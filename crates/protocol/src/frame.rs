use crate::error::ProtocolError;
use pointserve_core::{Algorithm, GlobalBounds, PointAttributes, Variant};
use serde::{Deserialize, Serialize};

/// A control header: the small JSON message that pairs with at most one
/// following binary payload frame.
///
/// Field names are camelCase on the wire, matching the viewer client's
/// dialect. Failure results carry `success: false` and an `error` string
/// and are NOT followed by a binary frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    #[serde(rename = "downsample-request", rename_all = "camelCase")]
    DownsampleRequest {
        request_id: u64,
        voxel_size: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        global_bounds: Option<GlobalBounds>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<Variant>,
    },

    #[serde(rename = "smooth-request", rename_all = "camelCase")]
    SmoothRequest {
        request_id: u64,
        smoothing_radius: f32,
        iterations: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<Variant>,
        /// Pass-through attributes, echoed back on the result and never
        /// forwarded to the worker.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        colors: Option<Vec<f32>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intensities: Option<Vec<f32>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        classifications: Option<Vec<u8>>,
    },

    #[serde(rename = "debug-request", rename_all = "camelCase")]
    DebugRequest {
        request_id: u64,
        voxel_size: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        global_bounds: Option<GlobalBounds>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<Variant>,
    },

    #[serde(rename = "downsample-result", rename_all = "camelCase")]
    DownsampleResult {
        request_id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voxel_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processing_time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "smooth-result", rename_all = "camelCase")]
    SmoothResult {
        request_id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processing_time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        colors: Option<Vec<f32>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intensities: Option<Vec<f32>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        classifications: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "debug-result", rename_all = "camelCase")]
    DebugResult {
        request_id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voxel_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processing_time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Connection-level error (protocol violations); carries no request id
    /// when the violation cannot be attributed to one.
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        message: String,
    },
}

/// The operation parameters extracted from a request header, normalized for
/// dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestParams {
    Downsample {
        voxel_size: f32,
        global_bounds: Option<GlobalBounds>,
    },
    Smooth {
        smoothing_radius: f32,
        iterations: u32,
    },
    VoxelDebug {
        voxel_size: f32,
        global_bounds: Option<GlobalBounds>,
    },
}

impl RequestParams {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            RequestParams::Downsample { .. } => Algorithm::Downsample,
            RequestParams::Smooth { .. } => Algorithm::Smooth,
            RequestParams::VoxelDebug { .. } => Algorithm::VoxelDebug,
        }
    }

    /// Caller-level validation: rejected before any process is touched.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            RequestParams::Downsample { voxel_size, global_bounds }
            | RequestParams::VoxelDebug { voxel_size, global_bounds } => {
                if !voxel_size.is_finite() || *voxel_size <= 0.0 {
                    return Err(ProtocolError::InvalidParameter(format!(
                        "voxelSize must be a positive number, got {voxel_size}"
                    )));
                }
                if let Some(bounds) = global_bounds {
                    if !bounds.is_finite() {
                        return Err(ProtocolError::InvalidParameter(
                            "globalBounds must be finite".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            RequestParams::Smooth { smoothing_radius, .. } => {
                if !smoothing_radius.is_finite() || *smoothing_radius <= 0.0 {
                    return Err(ProtocolError::InvalidParameter(format!(
                        "smoothingRadius must be a positive number, got {smoothing_radius}"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl ControlFrame {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> String {
        // Serialization of these enums cannot fail: no non-string map keys,
        // no fallible Serialize impls.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            ControlFrame::DownsampleRequest { request_id, .. }
            | ControlFrame::SmoothRequest { request_id, .. }
            | ControlFrame::DebugRequest { request_id, .. }
            | ControlFrame::DownsampleResult { request_id, .. }
            | ControlFrame::SmoothResult { request_id, .. }
            | ControlFrame::DebugResult { request_id, .. } => Some(*request_id),
            ControlFrame::Error { request_id, .. } => *request_id,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            ControlFrame::DownsampleRequest { .. }
                | ControlFrame::SmoothRequest { .. }
                | ControlFrame::DebugRequest { .. }
        )
    }

    /// The backend variant a request asked for, defaulting to pooled.
    pub fn variant(&self) -> Variant {
        match self {
            ControlFrame::DownsampleRequest { variant, .. }
            | ControlFrame::SmoothRequest { variant, .. }
            | ControlFrame::DebugRequest { variant, .. } => variant.unwrap_or_default(),
            _ => Variant::default(),
        }
    }

    /// Normalized operation parameters; `None` for result/error frames.
    pub fn request_params(&self) -> Option<RequestParams> {
        match self {
            ControlFrame::DownsampleRequest { voxel_size, global_bounds, .. } => {
                Some(RequestParams::Downsample {
                    voxel_size: *voxel_size,
                    global_bounds: *global_bounds,
                })
            }
            ControlFrame::SmoothRequest { smoothing_radius, iterations, .. } => {
                Some(RequestParams::Smooth {
                    smoothing_radius: *smoothing_radius,
                    iterations: *iterations,
                })
            }
            ControlFrame::DebugRequest { voxel_size, global_bounds, .. } => {
                Some(RequestParams::VoxelDebug {
                    voxel_size: *voxel_size,
                    global_bounds: *global_bounds,
                })
            }
            _ => None,
        }
    }

    /// Pass-through attributes attached to a request header.
    pub fn passthrough(&self) -> PointAttributes {
        match self {
            ControlFrame::SmoothRequest { colors, intensities, classifications, .. } => {
                PointAttributes {
                    colors: colors.clone(),
                    intensities: intensities.clone(),
                    classifications: classifications.clone(),
                }
            }
            _ => PointAttributes::default(),
        }
    }

    /// Point count of the binary frame that follows this header, if any.
    /// Failure results declare no payload.
    pub fn declared_payload_points(&self) -> Option<usize> {
        match self {
            ControlFrame::DownsampleResult { success: true, data_length, .. }
            | ControlFrame::SmoothResult { success: true, data_length, .. }
            | ControlFrame::DebugResult { success: true, data_length, .. } => *data_length,
            _ => None,
        }
    }

    /// Build the success result header for an operation.
    pub fn success_result(
        algorithm: Algorithm,
        request_id: u64,
        point_count: usize,
        cell_count: Option<usize>,
        processing_time: f64,
        attributes: PointAttributes,
    ) -> Self {
        match algorithm {
            Algorithm::Downsample => ControlFrame::DownsampleResult {
                request_id,
                success: true,
                voxel_count: cell_count,
                data_length: Some(point_count),
                processing_time: Some(processing_time),
                error: None,
            },
            Algorithm::Smooth => ControlFrame::SmoothResult {
                request_id,
                success: true,
                data_length: Some(point_count),
                processing_time: Some(processing_time),
                colors: attributes.colors,
                intensities: attributes.intensities,
                classifications: attributes.classifications,
                error: None,
            },
            Algorithm::VoxelDebug => ControlFrame::DebugResult {
                request_id,
                success: true,
                voxel_count: cell_count,
                data_length: Some(point_count),
                processing_time: Some(processing_time),
                error: None,
            },
        }
    }

    /// Build the failure result header for an operation. Never followed by
    /// a binary frame.
    pub fn failure_result(algorithm: Algorithm, request_id: u64, error: String) -> Self {
        match algorithm {
            Algorithm::Downsample => ControlFrame::DownsampleResult {
                request_id,
                success: false,
                voxel_count: None,
                data_length: None,
                processing_time: None,
                error: Some(error),
            },
            Algorithm::Smooth => ControlFrame::SmoothResult {
                request_id,
                success: false,
                data_length: None,
                processing_time: None,
                colors: None,
                intensities: None,
                classifications: None,
                error: Some(error),
            },
            Algorithm::VoxelDebug => ControlFrame::DebugResult {
                request_id,
                success: false,
                voxel_count: None,
                data_length: None,
                processing_time: None,
                error: Some(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let frame = ControlFrame::DownsampleRequest {
            request_id: 7,
            voxel_size: 0.5,
            global_bounds: Some(GlobalBounds::new([0.0; 3], [10.0; 3])),
            variant: None,
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "downsample-request");
        assert_eq!(json["requestId"], 7);
        assert_eq!(json["voxelSize"], 0.5);
        assert_eq!(json["globalBounds"]["maxY"], 10.0);
    }

    #[test]
    fn test_parse_smooth_request() {
        let text = r#"{"type":"smooth-request","requestId":3,"smoothingRadius":0.2,"iterations":2,"variant":"scripted"}"#;
        let frame = ControlFrame::from_json(text).unwrap();
        assert!(frame.is_request());
        assert_eq!(frame.request_id(), Some(3));
        assert_eq!(frame.variant(), Variant::Scripted);
        match frame.request_params().unwrap() {
            RequestParams::Smooth { smoothing_radius, iterations } => {
                assert_eq!(smoothing_radius, 0.2);
                assert_eq!(iterations, 2);
            }
            other => panic!("wrong params: {other:?}"),
        }
    }

    #[test]
    fn test_failure_result_declares_no_payload() {
        let frame = ControlFrame::failure_result(Algorithm::Smooth, 9, "boom".to_string());
        assert_eq!(frame.declared_payload_points(), None);
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("dataLength").is_none());
    }

    #[test]
    fn test_success_result_declares_payload() {
        let frame = ControlFrame::success_result(
            Algorithm::Downsample,
            4,
            128,
            Some(128),
            12.5,
            PointAttributes::default(),
        );
        assert_eq!(frame.declared_payload_points(), Some(128));
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "downsample-result");
        assert_eq!(json["voxelCount"], 128);
    }

    #[test]
    fn test_validate_rejects_non_positive_sizes() {
        let params = RequestParams::Downsample { voxel_size: 0.0, global_bounds: None };
        assert!(params.validate().is_err());
        let params = RequestParams::Smooth { smoothing_radius: -1.0, iterations: 1 };
        assert!(params.validate().is_err());
        let params = RequestParams::Smooth { smoothing_radius: 0.5, iterations: 0 };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_malformed_header_is_error() {
        assert!(matches!(
            ControlFrame::from_json("{\"type\":\"downsample-request\"}"),
            Err(ProtocolError::MalformedHeader(_))
        ));
    }
}
