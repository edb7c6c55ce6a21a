mod error;
mod frame;
mod http;

pub use error::ProtocolError;
pub use frame::{ControlFrame, RequestParams};
pub use http::{TransformRequest, TransformResponse};
