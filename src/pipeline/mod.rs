//! Cover rendering pipeline.
//!
//! Fetch → separate → convert → mix, each stage failing with its own
//! [`StageError`] variant so the requester learns where a job stopped.

pub mod error;
pub mod notify;
pub mod stages;
pub mod types;

pub use error::{ErrorKind, StageError};
pub use notify::{CollectorNotifier, JobEvent, LogNotifier, Notifier};
pub use stages::PipelineStages;
pub use types::{
    ChannelId, GuildId, Job, JobId, JobRequest, JobStatus, ModelRef, RequesterId, Stage,
};
