use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed control header: {0}")]
    MalformedHeader(#[from] serde_json::Error),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("binary frame received with no pending control header")]
    UnexpectedBinary,

    #[error("control header received while another is awaiting its payload")]
    DuplicateHeader,

    #[error("control frame is not a request")]
    NotARequest,

    #[error("binary payload length {0} is not a whole number of points")]
    UnalignedPayload(usize),
}
