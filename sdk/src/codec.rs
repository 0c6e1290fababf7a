//! Audio codec adapter. Opus is used as an opaque speech codec.

use opus::{Application, Bitrate, Channels};
use thiserror::Error;

/// Sample rate of every PCM buffer handled by the SDK.
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples per voice frame: 5 ms of mono audio at 48 kHz.
pub const FRAME_SAMPLES: usize = 240;

/// Default encoder bitrate in bits per second.
pub const DEFAULT_BITRATE: i32 = 38_000;

/// Largest PCM frame a single Opus packet can decode to (120 ms).
pub const MAX_DECODED_SAMPLES: usize = 5_760;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("opus: {0}")]
    Opus(#[from] opus::Error),

    #[error("expected a frame of {expected} samples, got {got}")]
    FrameSize { expected: usize, got: usize },
}

/// Stateful PCM to compressed-frame transform.
pub trait AudioEncode {
    /// Encodes one frame of [`FRAME_SAMPLES`] samples into `out`, returning the bytes written.
    fn encode(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize, CodecError>;
}

/// Stateful compressed-frame to PCM transform.
pub trait AudioDecode {
    /// Decodes one frame into `pcm`, returning the number of samples written.
    fn decode(&mut self, frame: &[u8], pcm: &mut [f32]) -> Result<usize, CodecError>;
}

/// Opus encoder for 48 kHz mono voice.
///
/// One instance per direction. It may move to another thread but must not be
/// shared between threads (the wrapped encoder is `Send` but not `Sync`).
pub struct OpusEncoder {
    inner: opus::Encoder,
}

impl OpusEncoder {
    pub fn new(bitrate: i32) -> Result<Self, CodecError> {
        let mut inner = opus::Encoder::new(SAMPLE_RATE, Channels::Mono, Application::Voip)?;
        inner.set_bitrate(Bitrate::Bits(bitrate))?;
        Ok(Self { inner })
    }
}

impl AudioEncode for OpusEncoder {
    fn encode(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize, CodecError> {
        if pcm.len() != FRAME_SAMPLES {
            return Err(CodecError::FrameSize {
                expected: FRAME_SAMPLES,
                got: pcm.len(),
            });
        }
        Ok(self.inner.encode_float(pcm, out)?)
    }
}

/// Opus decoder for 48 kHz mono voice. Same threading contract as [`OpusEncoder`].
pub struct OpusDecoder {
    inner: opus::Decoder,
}

impl OpusDecoder {
    pub fn new() -> Result<Self, CodecError> {
        Ok(Self {
            inner: opus::Decoder::new(SAMPLE_RATE, Channels::Mono)?,
        })
    }
}

impl AudioDecode for OpusDecoder {
    fn decode(&mut self, frame: &[u8], pcm: &mut [f32]) -> Result<usize, CodecError> {
        Ok(self.inner.decode_float(frame, pcm, false)?)
    }
}
