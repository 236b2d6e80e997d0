//! Overlaying one track onto another.

use crate::audio::track::AudioTrack;
use crate::error::Result;

/// Mixes `top` onto `base` starting at frame zero.
///
/// The result keeps the format and length of `base`; `top` is converted to
/// that format first and anything past the end of `base` is dropped. Sums
/// are hard-clipped to [-1, 1].
pub fn overlay(base: &AudioTrack, top: &AudioTrack) -> Result<AudioTrack> {
    let top = if top.sample_rate() == base.sample_rate() && top.channels() == base.channels() {
        top.clone()
    } else {
        top.to_channels(base.channels())?.resample(base.sample_rate())?
    };

    let mut out = base.clone();
    for (d, s) in out.samples_mut().iter_mut().zip(top.samples()) {
        *d = (*d + *s).clamp(-1.0, 1.0);
    }
    Ok(out)
}
