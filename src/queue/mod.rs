//! Job admission and sequential execution.
//!
//! Many request handlers enqueue; one worker dequeues and runs each job to
//! completion, including playback, before taking the next.

pub mod fifo;
pub mod registry;
pub mod session;
pub mod sync;
pub mod worker;

pub use fifo::{JobConsumer, JobQueue};
pub use registry::{JobRegistry, JobSnapshot};
pub use session::{GuildVoiceSession, SessionTable};
pub use sync::{CompletionSignal, PlaybackOutcome, PlaybackSynchronizer, SkipHandle};
pub use worker::{JobExecutor, JobWorker};
