//! Blocking packet I/O over `std::io` streams.
//!
//! Every read blocks until the whole packet is available; a stream that closes
//! part-way through yields [`StreamError::Eof`] and the partial bytes are dropped.

use std::io::{Read, Write};

use crate::error::StreamError;
use crate::packet::{Packet, PacketHeader, HEADER_LEN};
use crate::packet_kind::PacketKind;
use crate::records::{ChannelInfo, MessageInfo, UserInfo};
use crate::voice_frame::{encode_voice_frame, VOICE_HEADER_LEN};

/// Writes one packet, header and payload, retrying partial writes until done.
pub fn write_packet<W: Write>(w: &mut W, packet: &Packet) -> Result<(), StreamError> {
    w.write_all(&packet.encode())?;
    w.flush()?;
    Ok(())
}

/// Writes pre-encoded packet bytes as one unit.
pub fn write_raw<W: Write>(w: &mut W, bytes: &[u8]) -> Result<(), StreamError> {
    w.write_all(bytes)?;
    w.flush()?;
    Ok(())
}

/// Reads one complete packet.
///
/// A packet with an unknown kind byte is consumed in full before
/// `ProtocolError::UnknownPacketKind` is returned, so the stream stays in sync.
pub fn read_packet<R: Read>(r: &mut R) -> Result<Packet, StreamError> {
    let mut header_buf = [0u8; HEADER_LEN];
    r.read_exact(&mut header_buf).map_err(StreamError::from_read)?;
    let header = PacketHeader::decode(&header_buf)?;

    let payload = read_payload(r, header.payload_len()?)?;

    let kind = PacketKind::try_from(header.kind)?;
    Ok(Packet::new(kind, payload))
}

/// Reads exactly `len` payload bytes. The buffer grows with the bytes that
/// actually arrive, never with the length the header claims.
fn read_payload<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>, StreamError> {
    let mut payload = Vec::new();
    r.by_ref()
        .take(len as u64)
        .read_to_end(&mut payload)
        .map_err(StreamError::from_read)?;
    if payload.len() < len {
        return Err(StreamError::Eof);
    }
    Ok(payload)
}

/// Reads one packet and fails unless it has the expected kind.
pub fn read_expected<R: Read>(r: &mut R, kind: PacketKind) -> Result<Packet, StreamError> {
    let packet = read_packet(r)?;
    packet.expect_kind(kind)?;
    Ok(packet)
}

pub fn read_code<R: Read>(r: &mut R) -> Result<u8, StreamError> {
    Ok(read_packet(r)?.as_code()?)
}

pub fn read_int<R: Read>(r: &mut R) -> Result<i32, StreamError> {
    Ok(read_packet(r)?.as_int()?)
}

pub fn read_uint<R: Read>(r: &mut R) -> Result<u32, StreamError> {
    Ok(read_packet(r)?.as_uint()?)
}

pub fn read_uint64<R: Read>(r: &mut R) -> Result<u64, StreamError> {
    Ok(read_packet(r)?.as_uint64()?)
}

pub fn read_string<R: Read>(r: &mut R) -> Result<String, StreamError> {
    Ok(read_packet(r)?.into_text()?)
}

pub fn read_buffer<R: Read>(r: &mut R) -> Result<Vec<u8>, StreamError> {
    Ok(read_packet(r)?.into_buffer()?)
}

pub fn read_channel_info<R: Read>(r: &mut R) -> Result<ChannelInfo, StreamError> {
    Ok(ChannelInfo::from_packet(&read_packet(r)?)?)
}

pub fn read_user_info<R: Read>(r: &mut R) -> Result<UserInfo, StreamError> {
    Ok(UserInfo::from_packet(&read_packet(r)?)?)
}

/// Writes the four-packet message sequence in one write.
pub fn write_message<W: Write>(w: &mut W, message: &MessageInfo) -> Result<(), StreamError> {
    write_raw(w, &message.encode())
}

/// Reads the user id, timestamp and text that follow a `MESSAGE` marker.
pub fn read_message_body<R: Read>(r: &mut R) -> Result<MessageInfo, StreamError> {
    let user_id = read_packet(r)?;
    let timestamp = read_packet(r)?;
    let text = read_packet(r)?;
    Ok(MessageInfo::from_parts(&user_id, &timestamp, text)?)
}

/// Reads a full message sequence including its `MESSAGE` marker.
pub fn read_message<R: Read>(r: &mut R) -> Result<MessageInfo, StreamError> {
    read_expected(r, PacketKind::Message)?;
    read_message_body(r)
}

/// Writes one length-prefixed voice frame.
pub fn write_voice_frame<W: Write>(w: &mut W, frame: &[u8]) -> Result<(), StreamError> {
    w.write_all(&encode_voice_frame(frame)?)?;
    Ok(())
}

/// Reads one voice frame into `buf`, replacing its contents. Returns the frame length.
pub fn read_voice_frame<R: Read>(r: &mut R, buf: &mut Vec<u8>) -> Result<usize, StreamError> {
    let mut len_buf = [0u8; VOICE_HEADER_LEN];
    r.read_exact(&mut len_buf).map_err(StreamError::from_read)?;
    let len = usize::from(u16::from_be_bytes(len_buf));

    buf.resize(len, 0);
    r.read_exact(buf).map_err(StreamError::from_read)?;
    Ok(len)
}
