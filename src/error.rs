use thiserror::Error;

#[derive(Error, Debug)]
pub enum HardsubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("External tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Duration probe failed: {0}")]
    Probe(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Batch worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, HardsubError>;
