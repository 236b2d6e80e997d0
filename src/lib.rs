//! voicover - queued AI voice covers for voice channels
//!
//! Jobs are fetched, split into vocals and accompaniment, resynthesized in a
//! target voice chunk by chunk, mixed back and played on the requesting
//! guild's voice session, strictly one at a time.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod service;

// Capabilities
pub use engine::{Accelerator, MediaFetcher, Separator, VoiceConverter, VoiceProvider};

// Entry point
pub use service::{Capabilities, CoverService, Submitted};

// Error handling
pub use error::{Result, VoicoverError};
pub use pipeline::error::{ErrorKind, StageError};

// Config
pub use config::Config;

pub use audio::{AudioChunker, AudioTrack};
pub use models::ModelRegistry;
pub use pipeline::types::{ChannelId, GuildId, JobId, JobRequest, JobStatus, RequesterId};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
