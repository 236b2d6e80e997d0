//! WAV encode/decode for [`AudioTrack`].
//!
//! External engines exchange audio with us as WAV files, and every exported
//! cover is WAV. Source media in other containers goes through
//! [`crate::audio::decode`].

use crate::audio::track::AudioTrack;
use crate::error::{Result, VoicoverError};
use std::io::{Read, Seek, Write};
use std::path::Path;

/// Decodes a WAV stream of any integer or float sample format.
pub fn read_wav<R: Read>(reader: R) -> Result<AudioTrack> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VoicoverError::AudioDecode {
        message: format!("Failed to parse WAV data: {}", e),
    })?;

    let spec = wav_reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| VoicoverError::AudioDecode {
        message: format!("Failed to read WAV samples: {}", e),
    })?;

    AudioTrack::new(samples, spec.sample_rate, spec.channels)
}

/// Decodes a WAV file from disk.
pub fn read_wav_file(path: &Path) -> Result<AudioTrack> {
    let file = std::fs::File::open(path).map_err(|e| VoicoverError::AudioDecode {
        message: format!("Failed to open {}: {}", path.display(), e),
    })?;
    read_wav(std::io::BufReader::new(file))
}

/// Encodes the track as 16-bit PCM WAV.
pub fn write_wav<W: Write + Seek>(track: &AudioTrack, writer: W) -> Result<()> {
    let spec = hound::WavSpec {
        channels: track.channels(),
        sample_rate: track.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav_writer = hound::WavWriter::new(writer, spec).map_err(encode_error)?;
    for &s in track.samples() {
        let clamped = s.clamp(-1.0, 1.0);
        wav_writer
            .write_sample((clamped * f32::from(i16::MAX)) as i16)
            .map_err(encode_error)?;
    }
    wav_writer.finalize().map_err(encode_error)
}

/// Encodes the track to a WAV file on disk.
pub fn write_wav_file(track: &AudioTrack, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| VoicoverError::AudioEncode {
        message: format!("Failed to create {}: {}", path.display(), e),
    })?;
    write_wav(track, std::io::BufWriter::new(file))
}

fn encode_error(e: hound::Error) -> VoicoverError {
    VoicoverError::AudioEncode {
        message: format!("Failed to write WAV data: {}", e),
    }
}
