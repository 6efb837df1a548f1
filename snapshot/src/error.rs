use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("dataset not found: {0}")]
    NotFound(String),

    #[error("dataset already exists: {0}")]
    AlreadyExists(String),

    #[error("{command} failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("invalid delta stream: {0}")]
    InvalidDelta(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
