//! Data types shared by the queue, the worker and the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Guild (server) a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuildId(pub u64);

/// Voice channel inside a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

/// Opaque submitter identity, only echoed back in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(pub String);

/// Process-unique job identifier, increasing in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved voice model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Display name the user picked.
    pub name: String,
    /// Model weights on disk.
    pub path: PathBuf,
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Fetching,
    Separating,
    Converting,
    Mixing,
    Playing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Fetching => "fetching",
            JobStatus::Separating => "separating",
            JobStatus::Converting => "converting",
            JobStatus::Mixing => "mixing",
            JobStatus::Playing => "playing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Separate,
    Convert,
    Mix,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Separate, Stage::Convert, Stage::Mix];

    /// Status a job carries while this stage runs.
    pub fn status(self) -> JobStatus {
        match self {
            Stage::Fetch => JobStatus::Fetching,
            Stage::Separate => JobStatus::Separating,
            Stage::Convert => JobStatus::Converting,
            Stage::Mix => JobStatus::Mixing,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Separate => "separate",
            Stage::Convert => "convert",
            Stage::Mix => "mix",
        }
    }
}

/// What a caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub requester: RequesterId,
    pub guild: GuildId,
    pub channel: ChannelId,
    pub source_url: String,
    pub model: String,
    #[serde(default)]
    pub pitch_shift: i32,
}

/// One admitted cover job.
///
/// Immutable while queued; only the worker advances `status` after dequeue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub created_at: SystemTime,
    pub requester: RequesterId,
    pub guild: GuildId,
    pub channel: ChannelId,
    pub source_url: String,
    pub model: ModelRef,
    pub pitch_shift: i32,
    pub status: JobStatus,
}
