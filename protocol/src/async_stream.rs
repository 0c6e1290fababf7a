//! Async packet I/O over tokio streams. Same semantics as [`crate::stream`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StreamError;
use crate::packet::{Packet, PacketHeader, HEADER_LEN};
use crate::packet_kind::PacketKind;
use crate::records::{ChannelInfo, MessageInfo, UserInfo};
use crate::voice_frame::{encode_voice_frame, VOICE_HEADER_LEN};

pub async fn write_packet<W: AsyncWrite + Unpin>(w: &mut W, packet: &Packet) -> Result<(), StreamError> {
    write_raw(w, &packet.encode()).await
}

pub async fn write_raw<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> Result<(), StreamError> {
    w.write_all(bytes).await?;
    w.flush().await?;
    Ok(())
}

/// Reads one complete packet. Unknown kinds are consumed before the error is returned.
pub async fn read_packet<R: AsyncRead + Unpin>(r: &mut R) -> Result<Packet, StreamError> {
    let mut header_buf = [0u8; HEADER_LEN];
    r.read_exact(&mut header_buf).await.map_err(StreamError::from_read)?;
    let header = PacketHeader::decode(&header_buf)?;

    let payload = read_payload(r, header.payload_len()?).await?;

    let kind = PacketKind::try_from(header.kind)?;
    Ok(Packet::new(kind, payload))
}

/// Reads exactly `len` payload bytes, growing the buffer only as data arrives.
async fn read_payload<R: AsyncRead + Unpin>(r: &mut R, len: usize) -> Result<Vec<u8>, StreamError> {
    let mut payload = Vec::new();
    (&mut *r)
        .take(len as u64)
        .read_to_end(&mut payload)
        .await
        .map_err(StreamError::from_read)?;
    if payload.len() < len {
        return Err(StreamError::Eof);
    }
    Ok(payload)
}

pub async fn read_expected<R: AsyncRead + Unpin>(r: &mut R, kind: PacketKind) -> Result<Packet, StreamError> {
    let packet = read_packet(r).await?;
    packet.expect_kind(kind)?;
    Ok(packet)
}

pub async fn read_code<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8, StreamError> {
    Ok(read_packet(r).await?.as_code()?)
}

pub async fn read_int<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32, StreamError> {
    Ok(read_packet(r).await?.as_int()?)
}

pub async fn read_uint<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32, StreamError> {
    Ok(read_packet(r).await?.as_uint()?)
}

pub async fn read_uint64<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64, StreamError> {
    Ok(read_packet(r).await?.as_uint64()?)
}

pub async fn read_string<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, StreamError> {
    Ok(read_packet(r).await?.into_text()?)
}

pub async fn read_buffer<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, StreamError> {
    Ok(read_packet(r).await?.into_buffer()?)
}

pub async fn read_channel_info<R: AsyncRead + Unpin>(r: &mut R) -> Result<ChannelInfo, StreamError> {
    Ok(ChannelInfo::from_packet(&read_packet(r).await?)?)
}

pub async fn read_user_info<R: AsyncRead + Unpin>(r: &mut R) -> Result<UserInfo, StreamError> {
    Ok(UserInfo::from_packet(&read_packet(r).await?)?)
}

pub async fn write_message<W: AsyncWrite + Unpin>(w: &mut W, message: &MessageInfo) -> Result<(), StreamError> {
    write_raw(w, &message.encode()).await
}

/// Reads the user id, timestamp and text that follow a `MESSAGE` marker.
pub async fn read_message_body<R: AsyncRead + Unpin>(r: &mut R) -> Result<MessageInfo, StreamError> {
    let user_id = read_packet(r).await?;
    let timestamp = read_packet(r).await?;
    let text = read_packet(r).await?;
    Ok(MessageInfo::from_parts(&user_id, &timestamp, text)?)
}

pub async fn read_message<R: AsyncRead + Unpin>(r: &mut R) -> Result<MessageInfo, StreamError> {
    read_expected(r, PacketKind::Message).await?;
    read_message_body(r).await
}

pub async fn write_voice_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &[u8]) -> Result<(), StreamError> {
    write_raw(w, &encode_voice_frame(frame)?).await
}

/// Reads one voice frame into `buf`, replacing its contents. Returns the frame length.
pub async fn read_voice_frame<R: AsyncRead + Unpin>(r: &mut R, buf: &mut Vec<u8>) -> Result<usize, StreamError> {
    let mut len_buf = [0u8; VOICE_HEADER_LEN];
    r.read_exact(&mut len_buf).await.map_err(StreamError::from_read)?;
    let len = usize::from(u16::from_be_bytes(len_buf));

    buf.resize(len, 0);
    r.read_exact(buf).await.map_err(StreamError::from_read)?;
    Ok(len)
}
