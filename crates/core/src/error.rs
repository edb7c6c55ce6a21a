use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("point buffer length {0} is not a multiple of 3")]
  UnalignedPoints(usize),

  #[error("binary payload length {0} is not a multiple of 12")]
  UnalignedPayload(usize),

  #[error("config error: {0}")]
  Config(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("TOML parse error: {0}")]
  Toml(#[from] toml::de::Error),
}
