use crate::error::ProtocolError;

macro_rules! packet_kinds {
    ($($name:ident = $val:expr),* $(,)?) => {
        /// One-byte packet type tag carried in every packet header.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind { $($name = $val,)* }

        impl PacketKind {
            #[must_use]
            pub const fn as_u8(self) -> u8 { self as u8 }
        }

        impl TryFrom<u8> for PacketKind {
            type Error = ProtocolError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($val => Ok(Self::$name),)*
                    _ => Err(ProtocolError::UnknownPacketKind(value)),
                }
            }
        }
    };
}

packet_kinds! {
    // Scalar carriers
    Code = 0,
    Int = 1,
    Uint = 2,
    Uint64 = 3,
    Text = 4,
    Buffer = 5,

    // Requests
    ListChannels = 6,
    ListUsers = 7,
    ListMessages = 8,
    Message = 9,
    ListUserImages = 10,
    UserImage = 11,

    // Structured responses
    ChannelInfo = 12,
    UserInfo = 13,
}
