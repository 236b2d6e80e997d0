//! Decoding source media of any supported container into an [`AudioTrack`].
//!
//! WAV goes through hound, same as the engine interchange files. Everything
//! else (MP3, FLAC, AAC/M4A, Ogg Vorbis) is probed and decoded with symphonia.

use crate::audio::track::AudioTrack;
use crate::audio::wav::{read_wav, read_wav_file};
use crate::error::{Result, VoicoverError};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

fn is_wav(header: &[u8]) -> bool {
    header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WAVE"
}

/// Decodes a media file from disk, picking the decoder from its contents.
pub fn decode_file(path: &Path) -> Result<AudioTrack> {
    let open_error = |e: std::io::Error| VoicoverError::AudioDecode {
        message: format!("Failed to open {}: {}", path.display(), e),
    };

    let mut file = File::open(path).map_err(open_error)?;
    let mut header = Vec::with_capacity(12);
    (&mut file)
        .take(12)
        .read_to_end(&mut header)
        .map_err(open_error)?;

    if is_wav(&header) {
        return read_wav_file(path);
    }

    file.seek(SeekFrom::Start(0)).map_err(open_error)?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_media(Box::new(file), extension)
}

/// Decodes an in-memory media file. `extension` is only a probing hint.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioTrack> {
    if is_wav(&bytes) {
        return read_wav(Cursor::new(bytes));
    }
    decode_media(Box::new(Cursor::new(bytes)), extension)
}

fn decode_error(context: &str, e: SymphoniaError) -> VoicoverError {
    VoicoverError::AudioDecode {
        message: format!("{}: {}", context, e),
    }
}

fn decode_media(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<AudioTrack> {
    let stream = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error("Unrecognized media format", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VoicoverError::AudioDecode {
            message: "No audio track found".to_string(),
        })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error("Unsupported codec", e))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_error("Error reading packet", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(decode_error("Fatal decode error", e)),
        };

        let spec = *decoded.spec();
        sample_rate = Some(spec.rate);
        channels = Some(spec.channels.count());

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let sample_rate = sample_rate.ok_or_else(|| VoicoverError::AudioDecode {
        message: "Sample rate unknown".to_string(),
    })?;
    let channels = channels
        .and_then(|c| u16::try_from(c).ok())
        .ok_or_else(|| VoicoverError::AudioDecode {
            message: "Channel layout unknown".to_string(),
        })?;

    tracing::debug!(
        sample_rate,
        channels,
        frames = samples.len() / usize::from(channels.max(1)),
        "media decoded"
    );
    AudioTrack::new(samples, sample_rate, channels)
}

/// Minimal FLAC writer producing VERBATIM subframes, for test fixtures.
#[cfg(test)]
pub(crate) mod flac_fixture {
    const BLOCK_SIZE: usize = 4096;

    fn crc8(data: &[u8]) -> u8 {
        let mut crc = 0u8;
        for &byte in data {
            crc ^= byte;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ 0x07
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    fn crc16(data: &[u8]) -> u16 {
        let mut crc = 0u16;
        for &byte in data {
            crc ^= u16::from(byte) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x8005
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    /// Encodes 16-bit mono samples as a FLAC stream.
    pub fn encode_mono_16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let mut out = b"fLaC".to_vec();

        // STREAMINFO, flagged as the last metadata block
        out.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
        out.extend_from_slice(&(BLOCK_SIZE as u16).to_be_bytes());
        out.extend_from_slice(&(BLOCK_SIZE as u16).to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        // 20 bits rate, 3 bits channels - 1 (zero for mono), 5 bits bps - 1,
        // 36 bits total samples
        let packed: u64 = (u64::from(sample_rate) << 44)
            | (15u64 << 36)
            | (samples.len() as u64 & 0xF_FFFF_FFFF);
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);

        for (number, block) in samples.chunks(BLOCK_SIZE).enumerate() {
            assert!(number < 128, "fixture frame numbers are single byte");
            let mut frame = vec![
                0xFF,
                0xF8,
                // 16-bit block size at end of header, rate from STREAMINFO
                0x70,
                // mono, 16 bits per sample
                0x08,
                number as u8,
            ];
            frame.extend_from_slice(&((block.len() - 1) as u16).to_be_bytes());
            frame.push(crc8(&frame));

            // VERBATIM subframe, no wasted bits
            frame.push(0x02);
            for sample in block {
                frame.extend_from_slice(&sample.to_be_bytes());
            }
            let crc = crc16(&frame);
            frame.extend_from_slice(&crc.to_be_bytes());
            out.extend_from_slice(&frame);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::write_wav_file;
    use tempfile::TempDir;

    fn ramp(frames: usize) -> Vec<i16> {
        (0..frames).map(|n| ((n % 200) as i16 - 100) * 100).collect()
    }

    #[test]
    fn decodes_flac_bytes() {
        let samples = ramp(8_000);
        let bytes = flac_fixture::encode_mono_16(&samples, 8_000);

        let track = decode_bytes(bytes, Some("flac")).unwrap();

        assert_eq!(track.sample_rate(), 8_000);
        assert_eq!(track.channels(), 1);
        assert_eq!(track.duration_ms(), 1_000);
        let expected = f32::from(samples[150]) / 32_768.0;
        assert!((track.samples()[150] - expected).abs() < 1e-4);
    }

    #[test]
    fn decodes_flac_file_without_extension_hint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.bin");
        std::fs::write(&path, flac_fixture::encode_mono_16(&ramp(12_000), 16_000)).unwrap();

        let track = decode_file(&path).unwrap();
        assert_eq!(track.duration_ms(), 750);
    }

    #[test]
    fn wav_files_still_go_through_hound() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.wav");
        write_wav_file(&AudioTrack::silence(250, 22_050, 2).unwrap(), &path).unwrap();

        let track = decode_file(&path).unwrap();
        assert_eq!(track.duration_ms(), 250);
        assert_eq!(track.channels(), 2);
    }

    #[test]
    fn unknown_bytes_are_a_decode_error() {
        let err = decode_bytes(b"this is not audio at all".to_vec(), Some("mp3")).unwrap_err();
        assert!(matches!(err, VoicoverError::AudioDecode { .. }));
    }
}
