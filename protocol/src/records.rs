//! Structured records exchanged on the text protocol.

use crate::error::ProtocolError;
use crate::io::{Reader, Writer};
use crate::packet::{encode_all, Packet};
use crate::packet_kind::PacketKind;

/// `id: u32` + flag `u8` + name length `u32`.
const NAMED_RECORD_MIN_LEN: usize = 9;

/// Channel information. `is_voice` decides between text broadcast and voice relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u32,
    pub is_voice: bool,
    pub name: String,
}

/// User information. `is_online` is filled in by the server at response time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: u32,
    pub is_online: bool,
    pub name: String,
}

/// A chat message. Timestamp is unix seconds, assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub user_id: u32,
    pub timestamp: u32,
    pub msg: String,
}

fn write_named(w: &mut Writer, id: u32, flag: bool, name: &str) {
    w.write_u32(id);
    w.write_bool(flag);
    w.write_string(name);
}

fn read_named(payload: &[u8]) -> Result<(u32, bool, String), ProtocolError> {
    let mut r = Reader::new(payload);
    r.require(NAMED_RECORD_MIN_LEN)?;
    Ok((r.read_u32()?, r.read_bool()?, r.read_string()?))
}

impl ChannelInfo {
    #[must_use]
    pub fn new(id: u32, is_voice: bool, name: impl Into<String>) -> Self {
        Self { id, is_voice, name: name.into() }
    }

    /// Format: `[id: u32][is_voice: u8][name_len: u32][name...]`
    #[must_use]
    pub fn to_packet(&self) -> Packet {
        let mut w = Writer::new();
        write_named(&mut w, self.id, self.is_voice, &self.name);
        Packet::new(PacketKind::ChannelInfo, w.into_vec())
    }

    pub fn from_packet(packet: &Packet) -> Result<Self, ProtocolError> {
        let (id, is_voice, name) = read_named(&packet.expect_kind(PacketKind::ChannelInfo)?.payload)?;
        Ok(Self { id, is_voice, name })
    }
}

impl UserInfo {
    #[must_use]
    pub fn new(id: u32, is_online: bool, name: impl Into<String>) -> Self {
        Self { id, is_online, name: name.into() }
    }

    /// Format: `[id: u32][is_online: u8][name_len: u32][name...]`
    #[must_use]
    pub fn to_packet(&self) -> Packet {
        let mut w = Writer::new();
        write_named(&mut w, self.id, self.is_online, &self.name);
        Packet::new(PacketKind::UserInfo, w.into_vec())
    }

    pub fn from_packet(packet: &Packet) -> Result<Self, ProtocolError> {
        let (id, is_online, name) = read_named(&packet.expect_kind(PacketKind::UserInfo)?.payload)?;
        Ok(Self { id, is_online, name })
    }
}

impl MessageInfo {
    #[must_use]
    pub fn new(user_id: u32, timestamp: u32, msg: impl Into<String>) -> Self {
        Self { user_id, timestamp, msg: msg.into() }
    }

    /// A message travels as four packets: `MESSAGE` marker, `UINT` user id,
    /// `UINT` timestamp, `TEXT` body.
    #[must_use]
    pub fn to_packets(&self) -> [Packet; 4] {
        [
            Packet::marker(PacketKind::Message),
            Packet::uint(self.user_id),
            Packet::uint(self.timestamp),
            Packet::text(&self.msg),
        ]
    }

    /// The full four-packet sequence as one contiguous buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_all(&self.to_packets())
    }

    /// Builds a message from the three packets that follow the `MESSAGE` marker.
    pub fn from_parts(user_id: &Packet, timestamp: &Packet, text: Packet) -> Result<Self, ProtocolError> {
        Ok(Self {
            user_id: user_id.as_uint()?,
            timestamp: timestamp.as_uint()?,
            msg: text.into_text()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_info_wire_layout() {
        let packet = ChannelInfo::new(2, true, "voice-lounge").to_packet();
        assert_eq!(packet.kind, PacketKind::ChannelInfo);
        assert_eq!(&packet.payload[..9], &[0, 0, 0, 2, 1, 0, 0, 0, 12]);
        assert_eq!(&packet.payload[9..], b"voice-lounge");
    }

    #[test]
    fn channel_info_roundtrip() {
        let channel = ChannelInfo::new(1, false, "general");
        assert_eq!(ChannelInfo::from_packet(&channel.to_packet()), Ok(channel));
    }

    #[test]
    fn user_info_roundtrip() {
        let user = UserInfo::new(42, true, "alice");
        assert_eq!(UserInfo::from_packet(&user.to_packet()), Ok(user));
    }

    #[test]
    fn short_record_is_rejected_before_tail() {
        let packet = Packet::new(PacketKind::UserInfo, vec![0, 0, 0, 1, 1]);
        assert_eq!(
            UserInfo::from_packet(&packet),
            Err(ProtocolError::PacketTooShort { expected: 9, got: 5 })
        );
    }

    #[test]
    fn record_kind_mismatch() {
        let packet = UserInfo::new(1, false, "bob").to_packet();
        assert!(matches!(
            ChannelInfo::from_packet(&packet),
            Err(ProtocolError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn message_sequence_order() {
        let message = MessageInfo::new(7, 1_700_000_000, "hello");
        let [marker, user_id, timestamp, text] = message.to_packets();
        assert_eq!(marker, Packet::marker(PacketKind::Message));
        assert_eq!(MessageInfo::from_parts(&user_id, &timestamp, text), Ok(message));
    }
}
