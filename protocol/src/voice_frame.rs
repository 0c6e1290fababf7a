//! Framing for the voice socket: `[length: u16 BE][compressed audio...]`.
//!
//! No kind byte: a voice connection carries nothing else after its routing `UINT`.

use crate::error::ProtocolError;

/// Size of the voice frame length prefix.
pub const VOICE_HEADER_LEN: usize = 2;

/// Largest compressed frame a client will accept (largest Opus packet).
pub const MAX_VOICE_FRAME_LEN: usize = 1276;

/// Prefixes `frame` with its big-endian `u16` length.
pub fn encode_voice_frame(frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(frame.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        limit: usize::from(u16::MAX),
        got: frame.len(),
    })?;
    let mut out = Vec::with_capacity(VOICE_HEADER_LEN + frame.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(frame);
    Ok(out)
}
