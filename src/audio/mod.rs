//! PCM tracks, media decoding, WAV I/O and the DSP used by the cover pipeline.

pub mod chunker;
pub mod decode;
pub mod effects;
pub mod mixer;
pub mod track;
pub mod wav;

pub use chunker::{AudioChunker, Chunk, RenderedChunk};
pub use track::AudioTrack;
