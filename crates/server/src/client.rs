//! WebSocket client for the duplex protocol.
//!
//! Speaks the same header/payload pairing as the server: one text frame,
//! one binary frame, then waits for the result tagged with its request id.

use crate::error::ServerError;
use futures_util::{SinkExt, StreamExt};
use pointserve_core::{GlobalBounds, PointAttributes, PointCloud, Variant};
use protocol::ControlFrame;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A completed operation as seen by the client.
#[derive(Debug)]
pub struct WsResult {
  pub request_id: u64,
  pub points: Vec<f32>,
  pub voxel_count: Option<usize>,
  pub processing_time: Option<f64>,
  pub attributes: PointAttributes,
}

pub struct WsClient {
  ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
  next_id: u64,
}

impl WsClient {
  /// Connect to a server at `host:port`.
  pub async fn connect(addr: &str) -> Result<Self, ServerError> {
    let (ws, _) = connect_async(format!("ws://{addr}")).await?;
    Ok(Self { ws, next_id: 1 })
  }

  fn next_request_id(&mut self) -> u64 {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  pub async fn downsample(
    &mut self,
    points: &PointCloud,
    voxel_size: f32,
    global_bounds: Option<GlobalBounds>,
    variant: Option<Variant>,
  ) -> Result<WsResult, ServerError> {
    let request_id = self.next_request_id();
    let header = ControlFrame::DownsampleRequest {
      request_id,
      voxel_size,
      global_bounds,
      variant,
    };
    self.request(header, points).await
  }

  pub async fn smooth(
    &mut self,
    points: &PointCloud,
    smoothing_radius: f32,
    iterations: u32,
    attributes: PointAttributes,
    variant: Option<Variant>,
  ) -> Result<WsResult, ServerError> {
    let request_id = self.next_request_id();
    let header = ControlFrame::SmoothRequest {
      request_id,
      smoothing_radius,
      iterations,
      variant,
      colors: attributes.colors,
      intensities: attributes.intensities,
      classifications: attributes.classifications,
    };
    self.request(header, points).await
  }

  pub async fn voxel_debug(
    &mut self,
    points: &PointCloud,
    voxel_size: f32,
    global_bounds: Option<GlobalBounds>,
    variant: Option<Variant>,
  ) -> Result<WsResult, ServerError> {
    let request_id = self.next_request_id();
    let header = ControlFrame::DebugRequest {
      request_id,
      voxel_size,
      global_bounds,
      variant,
    };
    self.request(header, points).await
  }

  /// Send a header + payload pair and await the matching result.
  pub async fn request(&mut self, header: ControlFrame, points: &PointCloud) -> Result<WsResult, ServerError> {
    let request_id = header.request_id().unwrap_or_default();
    self.ws.send(Message::text(header.to_json())).await?;
    self.ws.send(Message::binary(points.to_le_bytes())).await?;
    self.await_result(request_id).await
  }

  /// Send a bare control header without its payload; only useful for
  /// protocol tests.
  pub async fn send_header(&mut self, header: ControlFrame) -> Result<(), ServerError> {
    self.ws.send(Message::text(header.to_json())).await?;
    Ok(())
  }

  /// Send a lone binary frame; only useful for protocol tests.
  pub async fn send_orphan_binary(&mut self, bytes: Vec<u8>) -> Result<(), ServerError> {
    self.ws.send(Message::binary(bytes)).await?;
    Ok(())
  }

  /// Read the next control frame, skipping transport chatter.
  pub async fn next_control(&mut self) -> Result<ControlFrame, ServerError> {
    loop {
      let message = self
        .ws
        .next()
        .await
        .ok_or_else(|| ServerError::UnexpectedFrame("connection closed".to_string()))??;
      match message {
        Message::Text(text) => return Ok(ControlFrame::from_json(text.as_str())?),
        Message::Binary(_) => {
          return Err(ServerError::UnexpectedFrame("binary frame with no pending header".to_string()));
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        Message::Close(_) => {
          return Err(ServerError::UnexpectedFrame("connection closed".to_string()));
        }
      }
    }
  }

  async fn read_payload(&mut self, declared_points: usize) -> Result<Vec<f32>, ServerError> {
    loop {
      let message = self
        .ws
        .next()
        .await
        .ok_or_else(|| ServerError::UnexpectedFrame("connection closed before payload".to_string()))??;
      match message {
        Message::Binary(bytes) => {
          let cloud = PointCloud::from_le_bytes(&bytes)?;
          if cloud.len() != declared_points {
            return Err(ServerError::UnexpectedFrame(format!(
              "payload holds {} points but header declared {declared_points}",
              cloud.len()
            )));
          }
          return Ok(cloud.into_flat());
        }
        Message::Text(text) => {
          return Err(ServerError::UnexpectedFrame(format!(
            "expected binary payload, got control frame: {text}"
          )));
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        Message::Close(_) => {
          return Err(ServerError::UnexpectedFrame("connection closed before payload".to_string()));
        }
      }
    }
  }

  async fn await_result(&mut self, request_id: u64) -> Result<WsResult, ServerError> {
    loop {
      let frame = self.next_control().await?;
      match frame {
        ControlFrame::Error { message, .. } => {
          return Err(ServerError::Operation(message));
        }
        ControlFrame::DownsampleResult {
          request_id: id,
          success,
          voxel_count,
          data_length,
          processing_time,
          error,
        }
        | ControlFrame::DebugResult {
          request_id: id,
          success,
          voxel_count,
          data_length,
          processing_time,
          error,
        } if id == request_id => {
          if !success {
            return Err(ServerError::Operation(error.unwrap_or_else(|| "unknown error".to_string())));
          }
          let declared = data_length.unwrap_or_default();
          let points = self.read_payload(declared).await?;
          return Ok(WsResult {
            request_id,
            points,
            voxel_count,
            processing_time,
            attributes: PointAttributes::default(),
          });
        }
        ControlFrame::SmoothResult {
          request_id: id,
          success,
          data_length,
          processing_time,
          colors,
          intensities,
          classifications,
          error,
        } if id == request_id => {
          if !success {
            return Err(ServerError::Operation(error.unwrap_or_else(|| "unknown error".to_string())));
          }
          let declared = data_length.unwrap_or_default();
          let points = self.read_payload(declared).await?;
          return Ok(WsResult {
            request_id,
            points,
            voxel_count: None,
            processing_time,
            attributes: PointAttributes {
              colors,
              intensities,
              classifications,
            },
          });
        }
        // A result for some other in-flight request; responses may complete
        // out of order. This sequential client just skips it (and its
        // payload, if one follows).
        other => {
          if let Some(declared) = other.declared_payload_points() {
            let _ = self.read_payload(declared).await?;
          }
        }
      }
    }
  }
}
