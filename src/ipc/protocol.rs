//! JSON message protocol for IPC communication between CLI and daemon.

use crate::pipeline::types::{GuildId, JobId, JobRequest};
use crate::queue::registry::JobSnapshot;
use serde::{Deserialize, Serialize};

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Queue a new cover job
    Submit { request: JobRequest },
    /// Look up one job
    Status { job: JobId },
    /// Number of jobs waiting to start
    QueueDepth,
    /// Stop the guild's current playback
    Skip { guild: GuildId },
    /// List voice models, optionally filtered
    Models {
        #[serde(default)]
        query: String,
    },
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Job admitted
    Submitted { job: JobId, position: usize },
    /// Current state of a job
    JobStatus { job: JobSnapshot },
    QueueDepth { depth: usize },
    /// Whether a playback was stopped
    Skipped { stopped: bool },
    Models { names: Vec<String> },
    /// Command succeeded
    Ok,
    /// Error occurred
    Error { message: String },
}

impl Response {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
