//! Client SDK for relaychat: a chat client for the text protocol and a duplex
//! voice session that streams Opus frames through the voice relay.

pub mod chat_client;
pub mod codec;
pub mod error;
pub mod ring_buffer;
pub mod voice;

pub use chat_client::{ChatClient, ChatEvent, UserImage, REFRESH_INTERVAL};
pub use codec::{AudioDecode, AudioEncode, CodecError, OpusDecoder, OpusEncoder, FRAME_SAMPLES, SAMPLE_RATE};
pub use error::SdkError;
pub use ring_buffer::{ring_buffer, Consumer, Producer};
pub use voice::{StopHandle, VoiceConfig, VoiceSession, VoiceStats, VoiceStatsSnapshot};
