use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("truncated request: {0}")]
    Truncated(&'static str),

    #[error("bad number in request: {0}")]
    BadNumber(String),

    #[error("point count mismatch: header says {expected}, data has {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
