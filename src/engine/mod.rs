//! External capabilities the pipeline drives: fetching, separation,
//! conversion, the accelerator and the voice connection.
//!
//! Each capability is a trait with a production implementation and a
//! `Mock*` implementation for tests.

pub mod accelerator;
pub mod command;
pub mod converter;
pub mod fetcher;
pub mod separator;
pub mod voice;

pub use accelerator::{Accelerator, AcceleratorScope, NoopAccelerator, TrackingAccelerator};
pub use command::{CommandRunner, SystemCommandRunner};
pub use converter::{CommandConverter, ConversionParams, MockConverter, VoiceConverter};
pub use fetcher::{MediaFetcher, MockFetcher, SourceFetcher, check_source};
pub use separator::{CommandSeparator, MockSeparator, Separator, Stems};
pub use voice::{
    DirectoryVoiceProvider, FinishedCallback, MockVoiceProvider, SessionHandle, VoiceEvent,
    VoiceProvider,
};
