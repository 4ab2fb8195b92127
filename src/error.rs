use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse capacity source JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Error connecting to PBS server {server}: {reason}")]
    CapacitySourceUnavailable { server: String, reason: String },

    #[error("Malformed capacity source data: {0}")]
    MalformedCapacitySource(String),

    #[error("Failed to read diagnose output: {0}")]
    DiagnosticStreamError(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
