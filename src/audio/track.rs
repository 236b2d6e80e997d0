//! In-memory PCM track passed between pipeline stages.

use crate::defaults::MIN_SAMPLE_RATE;
use crate::error::{Result, VoicoverError};

/// Number of frames covering `ms` milliseconds at `sample_rate`, rounded down.
pub fn frames_for_ms(ms: u64, sample_rate: u32) -> usize {
    (ms * u64::from(sample_rate) / 1000) as usize
}

/// Duration of `frames` frames at `sample_rate`, rounded up to a whole millisecond.
///
/// Inverse of [`frames_for_ms`] for rates of at least 1 kHz.
pub fn ms_for_frames(frames: usize, sample_rate: u32) -> u64 {
    (frames as u64 * 1000).div_ceil(u64::from(sample_rate))
}

/// Interleaved 32-bit float PCM with its format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioTrack {
    /// Wraps interleaved samples, validating the format.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        validate_format(sample_rate, channels)?;
        if samples.len() % usize::from(channels) != 0 {
            return Err(VoicoverError::AudioFormat {
                message: format!(
                    "{} samples do not divide into {} channels",
                    samples.len(),
                    channels
                ),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// A silent track of exactly `duration_ms`.
    pub fn silence(duration_ms: u64, sample_rate: u32, channels: u16) -> Result<Self> {
        validate_format(sample_rate, channels)?;
        let frames = frames_for_ms(duration_ms, sample_rate);
        Ok(Self {
            samples: vec![0.0; frames * usize::from(channels)],
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_ms(&self) -> u64 {
        ms_for_frames(self.frames(), self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True if any sample is NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        self.samples.iter().any(|s| !s.is_finite())
    }

    /// Copies the `[start_ms, end_ms)` span, clamped to the frames present.
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> AudioTrack {
        let frames = self.frames();
        let start = frames_for_ms(start_ms, self.sample_rate).min(frames);
        let end = frames_for_ms(end_ms, self.sample_rate).clamp(start, frames);
        let ch = usize::from(self.channels);
        AudioTrack {
            samples: self.samples[start * ch..end * ch].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Truncates or pads with trailing silence to exactly `frames` frames.
    pub fn resize_frames(&mut self, frames: usize) {
        self.samples.resize(frames * usize::from(self.channels), 0.0);
    }

    /// Re-lays the samples out for `channels` channels.
    ///
    /// Mono is duplicated to every output channel; anything else is averaged
    /// down to mono first.
    pub fn to_channels(&self, channels: u16) -> Result<AudioTrack> {
        validate_format(self.sample_rate, channels)?;
        if channels == self.channels {
            return Ok(self.clone());
        }

        let src_ch = usize::from(self.channels);
        let mono: Vec<f32> = if src_ch == 1 {
            self.samples.clone()
        } else {
            self.samples
                .chunks_exact(src_ch)
                .map(|frame| frame.iter().sum::<f32>() / src_ch as f32)
                .collect()
        };

        let samples = if channels == 1 {
            mono
        } else {
            let dst_ch = usize::from(channels);
            let mut out = Vec::with_capacity(mono.len() * dst_ch);
            for s in mono {
                out.extend(std::iter::repeat_n(s, dst_ch));
            }
            out
        };

        Ok(AudioTrack {
            samples,
            sample_rate: self.sample_rate,
            channels,
        })
    }

    /// Linear-interpolation resampling, channel by channel.
    pub fn resample(&self, to_rate: u32) -> Result<AudioTrack> {
        validate_format(to_rate, self.channels)?;
        Ok(AudioTrack {
            samples: resample_interleaved(
                &self.samples,
                usize::from(self.channels),
                self.sample_rate,
                to_rate,
            ),
            sample_rate: to_rate,
            channels: self.channels,
        })
    }

    /// Converts to `sample_rate`/`channels` while keeping `duration_ms` unchanged.
    pub fn conform(&self, sample_rate: u32, channels: u16) -> Result<AudioTrack> {
        let duration_ms = self.duration_ms();
        let mut out = self.to_channels(channels)?.resample(sample_rate)?;
        out.resize_frames(frames_for_ms(duration_ms, sample_rate));
        Ok(out)
    }
}

fn validate_format(sample_rate: u32, channels: u16) -> Result<()> {
    if sample_rate < MIN_SAMPLE_RATE {
        return Err(VoicoverError::AudioFormat {
            message: format!(
                "sample rate {} Hz is below the {} Hz minimum",
                sample_rate, MIN_SAMPLE_RATE
            ),
        });
    }
    if channels == 0 {
        return Err(VoicoverError::AudioFormat {
            message: "track must have at least one channel".to_string(),
        });
    }
    Ok(())
}

/// Simple linear interpolation resampling over interleaved frames.
fn resample_interleaved(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_frames = (frames as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(output_frames * channels);

    for i in 0..output_frames {
        let source_pos = i as f64 * ratio;
        let source_idx = (source_pos.floor() as usize).min(frames - 1);
        let fraction = (source_pos - source_idx as f64) as f32;
        for c in 0..channels {
            let left = samples[source_idx * channels + c];
            if source_idx + 1 >= frames {
                out.push(left);
            } else {
                let right = samples[(source_idx + 1) * channels + c];
                out.push(left + (right - left) * fraction);
            }
        }
    }

    out
}
