//! Default configuration constants for voicover.
//!
//! Shared by the config types and the pipeline so both agree on the
//! out-of-the-box behavior.

/// Length of one voice-conversion chunk in milliseconds.
///
/// Bounds the memory a single inference call needs on the accelerator.
pub const CHUNK_LENGTH_MS: u64 = 60_000;

/// Fade applied to both edges of every reassembled chunk, in milliseconds.
pub const CHUNK_FADE_MS: u64 = 10;

/// Sample rate the voice-conversion engine expects.
pub const CONVERSION_SAMPLE_RATE: u32 = 44_100;

/// Channel count the voice-conversion engine expects.
pub const CONVERSION_CHANNELS: u16 = 1;

/// Pitch extraction method handed to the conversion engine.
pub const F0_METHOD: &str = "rmvpe";

/// Seconds an idle voice session stays connected after the queue drains.
pub const IDLE_DISCONNECT_SECS: u64 = 30;

/// Number of finished jobs whose final status stays queryable.
pub const STATUS_RETENTION: usize = 256;

/// Largest accepted pitch shift, in semitones, either direction.
pub const MAX_PITCH_SHIFT: i32 = 24;

/// Maximum number of suggestions returned by model autocomplete.
pub const AUTOCOMPLETE_LIMIT: usize = 25;

/// Name of the model index file inside the models directory.
pub const MODEL_INDEX_FILE: &str = "index.json";

/// Lowest sample rate a track may carry.
///
/// At 1 kHz and above a whole number of milliseconds maps to frames and back
/// without drift.
pub const MIN_SAMPLE_RATE: u32 = 1_000;

/// Timeout for a direct HTTP media download, in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 300;

/// Upper bound on a downloaded media payload, in megabytes.
pub const MAX_DOWNLOAD_MB: u64 = 512;

// Vocal effect chain.
pub const NOISE_GATE_THRESHOLD_DB: f32 = -35.0;
pub const NOISE_GATE_RATIO: f32 = 10.0;
pub const HIGH_PASS_CUTOFF_HZ: f32 = 150.0;
pub const COMPRESSOR_THRESHOLD_DB: f32 = -18.0;
pub const COMPRESSOR_RATIO: f32 = 3.5;
pub const REVERB_ROOM_SIZE: f32 = 0.4;
pub const REVERB_WET_LEVEL: f32 = 0.12;
pub const REVERB_DRY_LEVEL: f32 = 0.8;
pub const REVERB_WIDTH: f32 = 1.0;
pub const OUTPUT_GAIN_DB: f32 = 1.5;
