//! Duration-exact chunking for voice conversion.
//!
//! A track is cut into fixed-length chunks so a single inference call never
//! sees more than `chunk_length_ms` of audio. The conversion engine does not
//! promise to return as many samples as it was given, so reassembly forces
//! every rendered chunk back to its original length and places it at its
//! original offset on a silent canvas. The result always has the duration of
//! the source, whatever the engine returned.

use crate::audio::track::{AudioTrack, frames_for_ms};
use crate::defaults;
use crate::error::{Result, VoicoverError};
use crate::pipeline::error::StageError;

/// A slice of a source track, cut before conversion.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the split sequence.
    pub index: usize,
    /// Absolute offset in the source timeline.
    pub start_ms: u64,
    /// Exact length before any transformation.
    pub original_length_ms: u64,
    pub payload: AudioTrack,
}

impl Chunk {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.original_length_ms
    }

    /// Pairs this chunk's placement with a transformed payload.
    pub fn rendered(&self, payload: AudioTrack) -> RenderedChunk {
        RenderedChunk {
            index: self.index,
            start_ms: self.start_ms,
            original_length_ms: self.original_length_ms,
            payload,
        }
    }
}

/// A transformed chunk waiting to be stitched back.
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub index: usize,
    pub start_ms: u64,
    pub original_length_ms: u64,
    /// Engine output; any length, rate or channel layout.
    pub payload: AudioTrack,
}

/// Splits tracks into chunks and stitches rendered chunks back together.
#[derive(Debug, Clone)]
pub struct AudioChunker {
    chunk_length_ms: u64,
    fade_ms: u64,
}

impl AudioChunker {
    /// Creates a chunker cutting `chunk_length_ms` pieces.
    pub fn new(chunk_length_ms: u64) -> Result<Self> {
        if chunk_length_ms == 0 {
            return Err(VoicoverError::ConfigInvalidValue {
                key: "convert.chunk_length_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            chunk_length_ms,
            fade_ms: defaults::CHUNK_FADE_MS,
        })
    }

    /// Sets the fade applied to both edges of each stitched chunk.
    pub fn with_fade_ms(mut self, fade_ms: u64) -> Self {
        self.fade_ms = fade_ms;
        self
    }

    pub fn chunk_length_ms(&self) -> u64 {
        self.chunk_length_ms
    }

    /// Cuts `track` into consecutive chunks; the last one may be shorter.
    ///
    /// The chunks' `original_length_ms` always sum to `track.duration_ms()`.
    pub fn split(&self, track: &AudioTrack) -> Vec<Chunk> {
        let duration_ms = track.duration_ms();
        let mut chunks = Vec::new();
        let mut start_ms = 0;

        while start_ms < duration_ms {
            let end_ms = (start_ms + self.chunk_length_ms).min(duration_ms);
            chunks.push(Chunk {
                index: chunks.len(),
                start_ms,
                original_length_ms: end_ms - start_ms,
                payload: track.slice_ms(start_ms, end_ms),
            });
            start_ms = end_ms;
        }

        chunks
    }

    /// Stitches rendered chunks into a track of exactly `total_duration_ms`.
    ///
    /// Chunks may arrive in any order. Each payload is conformed to the
    /// canvas format, truncated or silence-padded to its original length,
    /// faded at both edges and mixed in at its original offset. A gap, an
    /// overlap, a span past the canvas or a non-finite sample fails the
    /// whole reassembly.
    pub fn reassemble(
        &self,
        mut chunks: Vec<RenderedChunk>,
        total_duration_ms: u64,
        sample_rate: u32,
        channels: u16,
    ) -> std::result::Result<AudioTrack, StageError> {
        let mut canvas = AudioTrack::silence(total_duration_ms, sample_rate, channels)
            .map_err(|e| StageError::Conversion(e.to_string()))?;
        let canvas_frames = canvas.frames();
        let ch = usize::from(channels);

        chunks.sort_by_key(|c| c.start_ms);

        let mut expected_start = 0;
        for chunk in chunks {
            if chunk.start_ms != expected_start {
                return Err(StageError::ChunkRenderFailed {
                    index: chunk.index,
                    message: format!(
                        "chunk starts at {} ms but the previous one ended at {} ms",
                        chunk.start_ms, expected_start
                    ),
                });
            }
            if chunk.payload.has_non_finite() {
                return Err(StageError::ChunkRenderFailed {
                    index: chunk.index,
                    message: "rendered audio contains non-finite samples".to_string(),
                });
            }

            let end_ms = chunk.start_ms + chunk.original_length_ms;
            let start_frame = frames_for_ms(chunk.start_ms, sample_rate);
            let end_frame = frames_for_ms(end_ms, sample_rate);
            if end_frame > canvas_frames || end_ms > total_duration_ms {
                return Err(StageError::ChunkRenderFailed {
                    index: chunk.index,
                    message: format!(
                        "chunk ends at {} ms, past the {} ms track",
                        end_ms, total_duration_ms
                    ),
                });
            }

            let mut payload = if chunk.payload.sample_rate() == sample_rate
                && chunk.payload.channels() == channels
            {
                chunk.payload
            } else {
                chunk
                    .payload
                    .to_channels(channels)
                    .and_then(|t| t.resample(sample_rate))
                    .map_err(|e| StageError::ChunkRenderFailed {
                        index: chunk.index,
                        message: e.to_string(),
                    })?
            };

            payload.resize_frames(end_frame - start_frame);
            apply_edge_fades(&mut payload, frames_for_ms(self.fade_ms, sample_rate));

            let dst = &mut canvas.samples_mut()[start_frame * ch..end_frame * ch];
            for (d, s) in dst.iter_mut().zip(payload.samples()) {
                *d += *s;
            }

            expected_start = end_ms;
        }

        if expected_start != total_duration_ms {
            return Err(StageError::ChunkRenderFailed {
                index: usize::MAX,
                message: format!(
                    "chunks cover {} ms of a {} ms track",
                    expected_start, total_duration_ms
                ),
            });
        }

        Ok(canvas)
    }
}

/// Linear fade-in over the first and fade-out over the last `fade_frames`.
///
/// Clamped to half the chunk so the two ramps never overlap.
fn apply_edge_fades(track: &mut AudioTrack, fade_frames: usize) {
    let frames = track.frames();
    let fade = fade_frames.min(frames / 2);
    if fade == 0 {
        return;
    }

    let ch = usize::from(track.channels());
    let samples = track.samples_mut();
    for i in 0..fade {
        let gain = i as f32 / fade as f32;
        for c in 0..ch {
            samples[i * ch + c] *= gain;
            samples[(frames - 1 - i) * ch + c] *= gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;

    fn constant(ms: u64, value: f32) -> AudioTrack {
        let frames = frames_for_ms(ms, RATE);
        AudioTrack::new(vec![value; frames], RATE, 1).unwrap()
    }

    fn sample_at_ms(track: &AudioTrack, ms: u64) -> f32 {
        track.samples()[frames_for_ms(ms, track.sample_rate())]
    }

    #[test]
    fn zero_chunk_length_is_rejected() {
        assert!(AudioChunker::new(0).is_err());
    }

    #[test]
    fn split_lengths_sum_to_duration() {
        let chunker = AudioChunker::new(60_000).unwrap();
        for ms in [1u64, 59_999, 60_000, 60_001, 125_000, 180_000] {
            let track = constant(ms, 0.0);
            let chunks = chunker.split(&track);
            let total: u64 = chunks.iter().map(|c| c.original_length_ms).sum();
            assert_eq!(total, ms, "duration {ms}");
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end_ms(), pair[1].start_ms);
            }
        }
    }

    #[test]
    fn split_empty_track_yields_no_chunks() {
        let chunker = AudioChunker::new(1_000).unwrap();
        assert!(chunker.split(&constant(0, 0.0)).is_empty());
    }

    #[test]
    fn split_125s_into_60s_chunks() {
        let chunker = AudioChunker::new(60_000).unwrap();
        let chunks = chunker.split(&constant(125_000, 0.1));

        let lengths: Vec<u64> = chunks.iter().map(|c| c.original_length_ms).collect();
        assert_eq!(lengths, vec![60_000, 60_000, 5_000]);
        let starts: Vec<u64> = chunks.iter().map(|c| c.start_ms).collect();
        assert_eq!(starts, vec![0, 60_000, 120_000]);
        assert_eq!(chunks[2].payload.duration_ms(), 5_000);
    }

    #[test]
    fn reassemble_truncates_and_pads_to_exact_duration() {
        let chunker = AudioChunker::new(60_000).unwrap();
        let chunks = chunker.split(&constant(125_000, 0.1));

        let rendered = vec![
            chunks[0].rendered(constant(58_000, 0.5)),
            chunks[1].rendered(constant(61_000, 0.25)),
            chunks[2].rendered(constant(5_000, 0.75)),
        ];
        let out = chunker.reassemble(rendered, 125_000, RATE, 1).unwrap();

        assert_eq!(out.duration_ms(), 125_000);
        // Chunk 0 rendered 2000 ms short: the tail is silence.
        assert!((sample_at_ms(&out, 30_000) - 0.5).abs() < 1e-6);
        assert_eq!(sample_at_ms(&out, 58_500), 0.0);
        assert_eq!(sample_at_ms(&out, 59_900), 0.0);
        // Chunk 1 rendered 1000 ms long: cut at 120000 ms, chunk 2 starts there.
        assert!((sample_at_ms(&out, 119_000) - 0.25).abs() < 1e-6);
        assert!((sample_at_ms(&out, 122_000) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn reassemble_handles_empty_and_oversized_renders() {
        let chunker = AudioChunker::new(1_000).unwrap();
        let chunks = chunker.split(&constant(2_500, 0.0));

        let rendered = vec![
            chunks[0].rendered(constant(0, 0.0)),
            chunks[1].rendered(constant(2_500, 0.5)),
            chunks[2].rendered(constant(1_100, 0.5)),
        ];
        let out = chunker.reassemble(rendered, 2_500, RATE, 1).unwrap();

        assert_eq!(out.duration_ms(), 2_500);
        assert_eq!(sample_at_ms(&out, 500), 0.0);
        assert!((sample_at_ms(&out, 1_500) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn reassemble_single_chunk() {
        let chunker = AudioChunker::new(60_000).unwrap();
        let chunks = chunker.split(&constant(3_210, 0.3));
        assert_eq!(chunks.len(), 1);

        let rendered = vec![chunks[0].rendered(constant(9_999, 0.3))];
        let out = chunker.reassemble(rendered, 3_210, RATE, 1).unwrap();
        assert_eq!(out.duration_ms(), 3_210);
    }

    #[test]
    fn reassemble_accepts_out_of_order_chunks() {
        let chunker = AudioChunker::new(1_000).unwrap();
        let chunks = chunker.split(&constant(3_000, 0.0));
        let rendered = vec![
            chunks[2].rendered(constant(1_000, 0.3)),
            chunks[0].rendered(constant(1_000, 0.1)),
            chunks[1].rendered(constant(1_000, 0.2)),
        ];
        let out = chunker.reassemble(rendered, 3_000, RATE, 1).unwrap();

        assert!((sample_at_ms(&out, 500) - 0.1).abs() < 1e-6);
        assert!((sample_at_ms(&out, 1_500) - 0.2).abs() < 1e-6);
        assert!((sample_at_ms(&out, 2_500) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn edges_are_faded() {
        let chunker = AudioChunker::new(1_000).unwrap().with_fade_ms(10);
        let chunks = chunker.split(&constant(1_000, 0.0));
        let out = chunker
            .reassemble(vec![chunks[0].rendered(constant(1_000, 1.0))], 1_000, RATE, 1)
            .unwrap();

        let samples = out.samples();
        assert_eq!(samples[0], 0.0);
        assert!(samples[40] < 1.0);
        assert_eq!(samples[500], 1.0);
        assert!(samples[samples.len() - 1] < 0.02);
    }

    #[test]
    fn missing_chunk_fails_reassembly() {
        let chunker = AudioChunker::new(1_000).unwrap();
        let chunks = chunker.split(&constant(3_000, 0.0));
        let rendered = vec![
            chunks[0].rendered(constant(1_000, 0.1)),
            chunks[2].rendered(constant(1_000, 0.1)),
        ];

        let err = chunker.reassemble(rendered, 3_000, RATE, 1).unwrap_err();
        assert!(matches!(err, StageError::ChunkRenderFailed { index: 2, .. }));
    }

    #[test]
    fn truncated_sequence_fails_reassembly() {
        let chunker = AudioChunker::new(1_000).unwrap();
        let chunks = chunker.split(&constant(3_000, 0.0));
        let rendered = vec![
            chunks[0].rendered(constant(1_000, 0.1)),
            chunks[1].rendered(constant(1_000, 0.1)),
        ];

        let err = chunker.reassemble(rendered, 3_000, RATE, 1).unwrap_err();
        assert!(matches!(err, StageError::ChunkRenderFailed { .. }));
    }

    #[test]
    fn corrupt_chunk_fails_reassembly() {
        let chunker = AudioChunker::new(1_000).unwrap();
        let chunks = chunker.split(&constant(1_000, 0.0));
        let corrupt = AudioTrack::new(vec![f32::NAN; 8_000], RATE, 1).unwrap();

        let err = chunker
            .reassemble(vec![chunks[0].rendered(corrupt)], 1_000, RATE, 1)
            .unwrap_err();
        assert!(matches!(err, StageError::ChunkRenderFailed { index: 0, .. }));
    }

    #[test]
    fn payload_in_other_format_is_conformed() {
        let chunker = AudioChunker::new(1_000).unwrap();
        let chunks = chunker.split(&constant(1_000, 0.0));
        let stereo_48k = AudioTrack::new(vec![0.4; 2 * 48_000], 48_000, 2).unwrap();

        let out = chunker
            .reassemble(vec![chunks[0].rendered(stereo_48k)], 1_000, RATE, 1)
            .unwrap();
        assert_eq!(out.channels(), 1);
        assert_eq!(out.sample_rate(), RATE);
        assert!((sample_at_ms(&out, 500) - 0.4).abs() < 1e-6);
    }
}
