//! Wire protocol shared by the relaychat server, SDK and voice relay.
//!
//! Text/control packets are framed as `[kind: u8][length: u32 BE][payload]`.
//! Voice sockets use a separate `[length: u16 BE][frame]` framing.

pub mod error;
pub mod io;
pub mod packet;
pub mod packet_kind;
pub mod records;
pub mod stream;
pub mod voice_frame;

#[cfg(feature = "tokio")]
pub mod async_stream;

pub use error::{ProtocolError, StreamError};
pub use packet::{encode_all, Packet, PacketHeader, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use packet_kind::PacketKind;
pub use records::{ChannelInfo, MessageInfo, UserInfo};
pub use voice_frame::{encode_voice_frame, MAX_VOICE_FRAME_LEN, VOICE_HEADER_LEN};

/// Authentication result codes carried in the `CODE` reply.
pub mod auth_code {
    pub const FAILURE: u8 = 0;
    pub const SUCCESS: u8 = 1;
}

/// Signature every avatar upload must start with (PNG).
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
