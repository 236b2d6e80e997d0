//! Error types for voicover.

use crate::pipeline::error::StageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoicoverError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Audio format error: {message}")]
    AudioFormat { message: String },

    #[error("Audio decode failed: {message}")]
    AudioDecode { message: String },

    #[error("Audio encode failed: {message}")]
    AudioEncode { message: String },

    // Model registry errors
    #[error("Voice model not found: {name}")]
    ModelNotFound { name: String },

    #[error("Model index error: {message}")]
    ModelIndex { message: String },

    // Submission errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Job queue is closed")]
    QueueClosed,

    // Pipeline errors surfaced outside the worker
    #[error(transparent)]
    Stage(#[from] StageError),

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoicoverError>;
