//! Device selection and sample conversion shared by capture and playback.

use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::codec::SAMPLE_RATE;
use crate::error::SdkError;

/// Frames mixed per chunk inside a device callback; keeps scratch space on the stack.
pub(crate) const SCRATCH_FRAMES: usize = 256;

/// Picks a 48 kHz config, preferring `f32`, then `i16`, then `u16`.
pub(crate) fn select_config(
    configs: impl IntoIterator<Item = SupportedStreamConfigRange>,
) -> Result<(StreamConfig, SampleFormat), SdkError> {
    let rate = SampleRate(SAMPLE_RATE);
    let configs: Vec<_> = configs
        .into_iter()
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .collect();

    for format in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
        if let Some(config) = configs.iter().find(|c| c.sample_format() == format) {
            return Ok((config.clone().with_sample_rate(rate).into(), format));
        }
    }

    match configs.first() {
        Some(config) => Err(SdkError::UnsupportedFormat(format!("{:?}", config.sample_format()))),
        None => Err(SdkError::UnsupportedSampleRate(SAMPLE_RATE)),
    }
}

pub(crate) fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}

pub(crate) fn u16_to_f32(sample: u16) -> f32 {
    f32::from(sample) / f32::from(u16::MAX) * 2.0 - 1.0
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0) as i16
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn f32_to_u16(sample: f32) -> u16 {
    ((sample.clamp(-1.0, 1.0) * 0.5 + 0.5) * f32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions_stay_in_range() {
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_u16(1.0), u16::MAX);
        assert_eq!(f32_to_u16(-1.0), 0);
        assert!((u16_to_f32(u16::MAX) - 1.0).abs() < f32::EPSILON);
        assert!((u16_to_f32(0) + 1.0).abs() < f32::EPSILON);
    }
}
