//! The per-connection frame state machine.
//!
//! One pending-header slot per connection: a control header arrives as a
//! text frame and waits for the binary frame that carries its point data;
//! the pair becomes one logical request. The machine holds no IO so the
//! pairing rules are testable without sockets.

use pointserve_core::{Algorithm, PointAttributes, PointCloud, Variant};
use protocol::{ControlFrame, ProtocolError, RequestParams};

/// A complete logical request: header plus payload, ready for dispatch.
#[derive(Debug)]
pub struct ClientRequest {
  pub request_id: u64,
  pub params: RequestParams,
  pub variant: Variant,
  pub passthrough: PointAttributes,
  pub points: PointCloud,
}

/// A dropped frame and why. When the violating frame identified a request,
/// the error can be surfaced as that request's failure result; otherwise it
/// is a connection-level error frame.
#[derive(Debug)]
pub struct RouterViolation {
  pub request_id: Option<u64>,
  pub algorithm: Option<Algorithm>,
  pub error: ProtocolError,
}

#[derive(Debug, Default)]
pub struct FrameRouter {
  pending: Option<ControlFrame>,
}

impl FrameRouter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn has_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Handle an inbound text frame. Every data operation carries a payload,
  /// so a valid header is always buffered here and dispatch happens on the
  /// following binary frame. Any violation resets the pending slot.
  pub fn on_text(&mut self, text: &str) -> Result<(), RouterViolation> {
    let frame = match ControlFrame::from_json(text) {
      Ok(frame) => frame,
      Err(error) => {
        self.pending = None;
        return Err(RouterViolation {
          request_id: None,
          algorithm: None,
          error,
        });
      }
    };

    if !frame.is_request() {
      self.pending = None;
      return Err(RouterViolation {
        request_id: frame.request_id(),
        algorithm: None,
        error: ProtocolError::NotARequest,
      });
    }

    if self.pending.is_some() {
      // A second header before the first's payload: drop the new frame and
      // reset so the connection can recover.
      self.pending = None;
      return Err(RouterViolation {
        request_id: frame.request_id(),
        algorithm: frame.request_params().map(|p| p.algorithm()),
        error: ProtocolError::DuplicateHeader,
      });
    }

    self.pending = Some(frame);
    Ok(())
  }

  /// Handle an inbound binary frame: joins the buffered header into a
  /// complete request, or reports the orphan.
  pub fn on_binary(&mut self, bytes: &[u8]) -> Result<ClientRequest, RouterViolation> {
    let Some(header) = self.pending.take() else {
      return Err(RouterViolation {
        request_id: None,
        algorithm: None,
        error: ProtocolError::UnexpectedBinary,
      });
    };

    // The pending slot only ever holds request frames.
    let params = match header.request_params() {
      Some(params) => params,
      None => {
        return Err(RouterViolation {
          request_id: header.request_id(),
          algorithm: None,
          error: ProtocolError::NotARequest,
        });
      }
    };
    let request_id = header.request_id().unwrap_or_default();
    let algorithm = params.algorithm();

    let points = match PointCloud::from_le_bytes(bytes) {
      Ok(points) => points,
      Err(_) => {
        return Err(RouterViolation {
          request_id: Some(request_id),
          algorithm: Some(algorithm),
          error: ProtocolError::UnalignedPayload(bytes.len()),
        });
      }
    };

    Ok(ClientRequest {
      request_id,
      params,
      variant: header.variant(),
      passthrough: header.passthrough(),
      points,
    })
  }
}
