use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use tracing::{error, info};

use crate::error::SdkError;
use crate::ring_buffer::Consumer;
use crate::voice::device::{f32_to_i16, f32_to_u16, select_config, SCRATCH_FRAMES};
use crate::voice::stats::VoiceStats;

/// Fills an interleaved device buffer from the ring buffer, writing the same
/// mono sample to every channel. Missing samples become silence and the
/// callback counts as one underrun.
pub(crate) fn pull_mono<T: Copy>(
    consumer: &mut Consumer,
    output: &mut [T],
    channels: usize,
    stats: &VoiceStats,
    from_f32: impl Fn(f32) -> T,
) {
    let channels = channels.max(1);
    let mut scratch = [0.0f32; SCRATCH_FRAMES];
    let mut underrun = false;

    for chunk in output.chunks_mut(channels * SCRATCH_FRAMES) {
        let frames = chunk.len() / channels;
        let got = consumer.consume(&mut scratch[..frames]);
        if got < frames {
            scratch[got..frames].fill(0.0);
            underrun = true;
        }
        for (frame, &sample) in chunk.chunks_exact_mut(channels).zip(&scratch[..frames]) {
            frame.fill(from_f32(sample));
        }
    }

    if underrun {
        stats.record_underrun();
    }
}

/// Opens the default output device and starts draining `consumer`.
pub(crate) fn start_playback(mut consumer: Consumer, stats: Arc<VoiceStats>) -> Result<Stream, SdkError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SdkError::NoDevice("output"))?;
    let (config, format) = select_config(device.supported_output_configs()?)?;
    let channels = usize::from(config.channels);

    info!("Output stream config: {} channels, {} Hz, format: {:?}", config.channels, config.sample_rate.0, format);

    let err_fn = |e| error!("Output stream error: {}", e);
    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                pull_mono(&mut consumer, output, channels, &stats, |s| s);
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |output: &mut [i16], _: &cpal::OutputCallbackInfo| {
                pull_mono(&mut consumer, output, channels, &stats, f32_to_i16);
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_output_stream(
            &config,
            move |output: &mut [u16], _: &cpal::OutputCallbackInfo| {
                pull_mono(&mut consumer, output, channels, &stats, f32_to_u16);
            },
            err_fn,
            None,
        )?,
        other => return Err(SdkError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::ring_buffer;

    #[test]
    fn mono_is_copied_to_every_channel() {
        let (mut tx, mut rx) = ring_buffer(16);
        let stats = VoiceStats::default();
        tx.produce(&[0.1, 0.2, 0.3]);

        let mut output = [9.0f32; 6];
        pull_mono(&mut rx, &mut output, 2, &stats, |s| s);
        assert_eq!(output, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
        assert_eq!(stats.snapshot().underruns, 0);
    }

    #[test]
    fn underrun_pads_with_silence() {
        let (mut tx, mut rx) = ring_buffer(16);
        let stats = VoiceStats::default();
        tx.produce(&[0.5]);

        let mut output = [7i16; 3];
        pull_mono(&mut rx, &mut output, 1, &stats, f32_to_i16);
        assert_eq!(output, [f32_to_i16(0.5), 0, 0]);
        assert_eq!(stats.snapshot().underruns, 1);
    }
}
