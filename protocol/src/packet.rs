use crate::error::ProtocolError;
use crate::io::{Reader, Writer};
use crate::packet_kind::PacketKind;

/// Size of the unpadded packet header: `[kind: u8][length: u32 BE]`.
pub const HEADER_LEN: usize = 5;

/// Upper bound on a single payload accepted from the wire.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw kind byte, not yet validated against [`PacketKind`].
    pub kind: u8,
    pub length: u32,
}

impl PacketHeader {
    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = self.kind;
        bytes[1..].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(buf);
        Ok(Self {
            kind: r.read_u8()?,
            length: r.read_u32()?,
        })
    }

    /// Checks the declared length against [`MAX_PAYLOAD_LEN`].
    pub fn payload_len(self) -> Result<usize, ProtocolError> {
        let len = self.length as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                limit: MAX_PAYLOAD_LEN,
                got: len,
            });
        }
        Ok(len)
    }
}

/// One framed unit of the text/control protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub payload: Vec<u8>,
}

impl Packet {
    #[must_use]
    pub fn new(kind: PacketKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Bare request/response marker with an empty payload.
    #[must_use]
    pub fn marker(kind: PacketKind) -> Self {
        Self::new(kind, Vec::new())
    }

    #[must_use]
    pub fn code(value: u8) -> Self {
        Self::new(PacketKind::Code, vec![value])
    }

    #[must_use]
    pub fn int(value: i32) -> Self {
        Self::new(PacketKind::Int, value.to_be_bytes().to_vec())
    }

    #[must_use]
    pub fn uint(value: u32) -> Self {
        Self::new(PacketKind::Uint, value.to_be_bytes().to_vec())
    }

    #[must_use]
    pub fn uint64(value: u64) -> Self {
        Self::new(PacketKind::Uint64, value.to_be_bytes().to_vec())
    }

    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::new(PacketKind::Text, value.as_bytes().to_vec())
    }

    #[must_use]
    pub fn buffer(bytes: Vec<u8>) -> Self {
        Self::new(PacketKind::Buffer, bytes)
    }

    /// Encode packet to wire format.
    ///
    /// Format: `[kind: u8][payload_len: u32 BE][payload...]`
    ///
    /// # Panics
    /// Panics if the payload exceeds `u32::MAX` bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(HEADER_LEN + self.payload.len());
        self.encode_into(&mut w);
        w.into_vec()
    }

    /// Appends the encoded packet to an existing buffer, so several packets
    /// can be sent as one contiguous write.
    ///
    /// # Panics
    /// Panics if the payload exceeds `u32::MAX` bytes.
    pub fn encode_into(&self, w: &mut Writer) {
        w.write_u8(self.kind.as_u8());
        w.write_u32(self.payload.len().try_into().expect("payload too large"));
        w.write_bytes(&self.payload);
    }

    /// Decode packet from wire format.
    ///
    /// Returns decoded packet and number of bytes consumed from the buffer.
    ///
    /// # Errors
    /// Returns error if buffer is incomplete or contains invalid data.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let header = PacketHeader::decode(buf)?;
        let payload_len = header.payload_len()?;
        let remaining = &buf[HEADER_LEN..];

        if remaining.len() < payload_len {
            return Err(ProtocolError::IncompletePayload {
                expected: payload_len,
                got: remaining.len(),
            });
        }

        let kind = PacketKind::try_from(header.kind)?;
        let packet = Self::new(kind, remaining[..payload_len].to_vec());
        Ok((packet, HEADER_LEN + payload_len))
    }

    /// Fails with [`ProtocolError::UnexpectedKind`] unless this packet has the given kind.
    pub fn expect_kind(&self, expected: PacketKind) -> Result<&Self, ProtocolError> {
        if self.kind != expected {
            return Err(ProtocolError::UnexpectedKind {
                expected,
                got: self.kind.as_u8(),
            });
        }
        Ok(self)
    }

    pub fn as_code(&self) -> Result<u8, ProtocolError> {
        Reader::new(&self.expect_kind(PacketKind::Code)?.payload).read_u8()
    }

    pub fn as_int(&self) -> Result<i32, ProtocolError> {
        Reader::new(&self.expect_kind(PacketKind::Int)?.payload).read_i32()
    }

    pub fn as_uint(&self) -> Result<u32, ProtocolError> {
        Reader::new(&self.expect_kind(PacketKind::Uint)?.payload).read_u32()
    }

    pub fn as_uint64(&self) -> Result<u64, ProtocolError> {
        Reader::new(&self.expect_kind(PacketKind::Uint64)?.payload).read_u64()
    }

    pub fn into_text(self) -> Result<String, ProtocolError> {
        self.expect_kind(PacketKind::Text)?;
        String::from_utf8(self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn into_buffer(self) -> Result<Vec<u8>, ProtocolError> {
        self.expect_kind(PacketKind::Buffer)?;
        Ok(self.payload)
    }
}

/// Concatenates the wire encoding of several packets.
#[must_use]
pub fn encode_all<'a>(packets: impl IntoIterator<Item = &'a Packet>) -> Vec<u8> {
    let mut w = Writer::new();
    for packet in packets {
        packet.encode_into(&mut w);
    }
    w.into_vec()
}
