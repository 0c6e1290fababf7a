use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use tracing::{error, info};

use crate::error::SdkError;
use crate::ring_buffer::Producer;
use crate::voice::device::{i16_to_f32, select_config, u16_to_f32, SCRATCH_FRAMES};

/// Averages interleaved frames down to mono and pushes them into the ring buffer.
/// Runs on the audio thread: no allocation, no blocking.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn push_mono<T: Copy>(producer: &mut Producer, data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
    let channels = channels.max(1);
    let mut scratch = [0.0f32; SCRATCH_FRAMES];
    for chunk in data.chunks(channels * SCRATCH_FRAMES) {
        let frames = chunk.len() / channels;
        for (slot, frame) in scratch.iter_mut().zip(chunk.chunks_exact(channels)) {
            *slot = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / channels as f32;
        }
        producer.produce(&scratch[..frames]);
    }
}

/// Opens the default input device and starts feeding `producer`.
pub(crate) fn start_capture(mut producer: Producer) -> Result<Stream, SdkError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(SdkError::NoDevice("input"))?;
    let (config, format) = select_config(device.supported_input_configs()?)?;
    let channels = usize::from(config.channels);

    info!("Input stream config: {} channels, {} Hz, format: {:?}", config.channels, config.sample_rate.0, format);

    let err_fn = |e| error!("Input stream error: {}", e);
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| push_mono(&mut producer, data, channels, |s| s),
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| push_mono(&mut producer, data, channels, i16_to_f32),
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| push_mono(&mut producer, data, channels, u16_to_f32),
            err_fn,
            None,
        )?,
        other => return Err(SdkError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok(stream)
}
