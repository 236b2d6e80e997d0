//! Failure taxonomy for a single cover job.
//!
//! Every variant aborts only the job it happened in. The worker reports it to
//! the requester and moves on to the next queued job.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while a job moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("source separation failed: {0}")]
    Separation(String),
    #[error("voice conversion failed: {0}")]
    Conversion(String),
    #[error("chunk {index} render failed: {message}")]
    ChunkRenderFailed { index: usize, message: String },
    #[error("mixing failed: {0}")]
    Mix(String),
    #[error("voice connection failed: {0}")]
    VoiceConnect(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

impl StageError {
    /// Discriminant used in status reports and the IPC protocol.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Fetch(_) => ErrorKind::FetchError,
            StageError::Separation(_) => ErrorKind::SeparationError,
            StageError::Conversion(_) => ErrorKind::ConversionError,
            StageError::ChunkRenderFailed { .. } => ErrorKind::ChunkRenderFailed,
            StageError::Mix(_) => ErrorKind::MixError,
            StageError::VoiceConnect(_) => ErrorKind::VoiceConnectError,
            StageError::Playback(_) => ErrorKind::PlaybackError,
        }
    }
}

/// Stable name of a failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    FetchError,
    SeparationError,
    ConversionError,
    ChunkRenderFailed,
    MixError,
    VoiceConnectError,
    PlaybackError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FetchError => "FetchError",
            ErrorKind::SeparationError => "SeparationError",
            ErrorKind::ConversionError => "ConversionError",
            ErrorKind::ChunkRenderFailed => "ChunkRenderFailed",
            ErrorKind::MixError => "MixError",
            ErrorKind::VoiceConnectError => "VoiceConnectError",
            ErrorKind::PlaybackError => "PlaybackError",
        };
        f.write_str(name)
    }
}
