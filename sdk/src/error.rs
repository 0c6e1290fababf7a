//! Error types for the relaychat SDK.

use relaychat_protocol::StreamError;
use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Connection timed out")]
    Timeout,

    #[error("Disconnected from server")]
    Disconnected,

    #[error("Invalid voice frame length {0}")]
    InvalidFrame(usize),

    #[error("No {0} device found")]
    NoDevice(&'static str),

    #[error("Audio device does not support {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio device error: {0}")]
    DeviceConfig(#[from] cpal::SupportedStreamConfigsError),

    #[error("Audio stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Audio stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

impl SdkError {
    /// True when the error only means the peer or the session went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            SdkError::Disconnected => true,
            SdkError::Stream(e) => e.is_disconnect(),
            _ => false,
        }
    }
}
