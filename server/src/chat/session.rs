use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relaychat_protocol::async_stream::{read_buffer, read_packet, read_string, read_uint, read_uint64, write_packet, write_raw};
use relaychat_protocol::{
    auth_code, encode_all, MessageInfo, Packet, PacketKind, ProtocolError, StreamError, MAX_PAYLOAD_LEN,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::avatars::validate_upload;
use crate::chat::registry::{ConnectionId, Outbound};
use crate::chat::ChatState;
use crate::credentials::verify_password;
use crate::error::ServerError;

/// Reads the username/password pair and answers with one `CODE` packet.
///
/// Returns the authenticated user id. On a bad login `CODE 0` is written before
/// the error is returned, and the caller drops the connection.
pub async fn authenticate<R, W>(
    state: &ChatState,
    reader: &mut R,
    writer: &mut W,
    peer_addr: SocketAddr,
) -> Result<u32, ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let username = read_string(reader).await?;
    let password = read_string(reader).await?;

    let verified = state
        .store
        .user_id(&username)
        .and_then(|id| Ok((id, state.store.user_credential(id)?)));

    match verified {
        Ok((user_id, credential)) if verify_password(&password, &credential) => {
            write_packet(writer, &Packet::code(auth_code::SUCCESS)).await?;
            info!("[{}] {} logged in as user {}", peer_addr, username, user_id);
            Ok(user_id)
        }
        Ok(_) => {
            write_packet(writer, &Packet::code(auth_code::FAILURE)).await?;
            Err(ServerError::AuthenticationFailed(username))
        }
        Err(e) => {
            debug!("[{}] Credential lookup failed: {}", peer_addr, e);
            write_packet(writer, &Packet::code(auth_code::FAILURE)).await?;
            Err(ServerError::AuthenticationFailed(username))
        }
    }
}

/// Drains a session's outbound queue onto the socket until every sender is dropped.
pub async fn write_outbound<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: Receiver<Outbound>,
) -> Result<(), StreamError> {
    while let Some(bytes) = outbound.recv().await {
        write_raw(&mut writer, &bytes).await?;
    }
    Ok(())
}

/// One authenticated connection in the active state.
pub struct ChatSession<R> {
    state: Arc<ChatState>,
    reader: R,
    outbound: Sender<Outbound>,
    evicted: Arc<Notify>,
    conn: ConnectionId,
    user_id: u32,
    peer_addr: SocketAddr,
}

impl<R: AsyncRead + Unpin> ChatSession<R> {
    pub fn new(
        state: Arc<ChatState>,
        reader: R,
        outbound: Sender<Outbound>,
        conn: ConnectionId,
        user_id: u32,
        peer_addr: SocketAddr,
    ) -> Self {
        Self {
            state,
            reader,
            outbound,
            evicted: Arc::new(Notify::new()),
            conn,
            user_id,
            peer_addr,
        }
    }

    /// Registers the session, serves requests until the connection closes,
    /// then unregisters it.
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.state
            .registry
            .register(self.conn, self.user_id, self.outbound.clone(), Arc::clone(&self.evicted));
        let result = self.serve().await;
        self.state.registry.unregister(self.conn);
        info!("[{}] User {} disconnected", self.peer_addr, self.user_id);
        result
    }

    async fn serve(&mut self) -> Result<(), ServerError> {
        let evicted = Arc::clone(&self.evicted);
        loop {
            let read = tokio::select! {
                biased;
                () = evicted.notified() => return Err(ServerError::SlowConsumer),
                read = read_packet(&mut self.reader) => read,
            };
            let packet = match read {
                Ok(packet) => packet,
                Err(StreamError::Protocol(ProtocolError::UnknownPacketKind(kind))) => {
                    warn!("[{}] Ignoring unknown packet kind 0x{:02x}", self.peer_addr, kind);
                    continue;
                }
                Err(e) if e.is_disconnect() => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            match self.dispatch(packet).await {
                Ok(()) => {}
                Err(ServerError::Stream(StreamError::Protocol(e))) => {
                    warn!("[{}] Request aborted: {}", self.peer_addr, e);
                }
                Err(ServerError::Stream(e)) if e.is_disconnect() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(&mut self, packet: Packet) -> Result<(), ServerError> {
        match packet.kind {
            PacketKind::Message => self.handle_message().await,
            PacketKind::ListChannels => self.handle_list_channels(),
            PacketKind::ListUsers => self.handle_list_users(),
            PacketKind::ListMessages => self.handle_list_messages().await,
            PacketKind::ListUserImages => self.handle_list_user_images().await,
            PacketKind::UserImage => self.handle_user_image().await,
            other => {
                warn!("[{}] Unexpected packet kind {:?}", self.peer_addr, other);
                Ok(())
            }
        }
    }

    /// Queues a reply for this session only. A full queue ends the session.
    fn send(&self, bytes: Vec<u8>) -> Result<(), ServerError> {
        self.outbound.try_send(bytes.into()).map_err(|e| match e {
            TrySendError::Full(_) => ServerError::SlowConsumer,
            TrySendError::Closed(_) => ServerError::OutboundClosed,
        })
    }

    async fn handle_message(&mut self) -> Result<(), ServerError> {
        let channel_id = read_uint(&mut self.reader).await?;
        let text = read_string(&mut self.reader).await?;

        let message = MessageInfo::new(self.user_id, unix_timestamp(), text);
        if let Err(e) = self.state.store.save_message(channel_id, &message) {
            error!("[{}] Failed to save message for channel {}: {}", self.peer_addr, channel_id, e);
            return Ok(());
        }

        let delivered = self.state.registry.broadcast(&message);
        debug!("[{}] Message on channel {} delivered to {} sessions", self.peer_addr, channel_id, delivered);
        Ok(())
    }

    fn handle_list_channels(&self) -> Result<(), ServerError> {
        let channels = self.state.store.channels().unwrap_or_else(|e| {
            error!("[{}] Failed to list channels: {}", self.peer_addr, e);
            Vec::new()
        });

        let mut packets = vec![Packet::marker(PacketKind::ListChannels), count_packet(channels.len())];
        packets.extend(channels.iter().map(|c| c.to_packet()));
        self.send(encode_all(&packets))
    }

    fn handle_list_users(&self) -> Result<(), ServerError> {
        let mut users = self.state.store.users().unwrap_or_else(|e| {
            error!("[{}] Failed to list users: {}", self.peer_addr, e);
            Vec::new()
        });
        for user in &mut users {
            user.is_online = self.state.registry.is_online(user.id);
        }

        let mut packets = vec![Packet::marker(PacketKind::ListUsers), count_packet(users.len())];
        packets.extend(users.iter().map(|u| u.to_packet()));
        self.send(encode_all(&packets))
    }

    async fn handle_list_messages(&mut self) -> Result<(), ServerError> {
        let channel_id = read_uint(&mut self.reader).await?;
        let messages = self.state.store.messages(channel_id).unwrap_or_else(|e| {
            error!("[{}] Failed to load history of channel {}: {}", self.peer_addr, channel_id, e);
            Vec::new()
        });
        if messages.is_empty() {
            return Ok(());
        }

        let bytes = messages.iter().flat_map(MessageInfo::encode).collect();
        self.send(bytes)
    }

    async fn handle_list_user_images(&mut self) -> Result<(), ServerError> {
        let listed = self.state.avatars.list().await.unwrap_or_else(|e| {
            error!("[{}] Failed to list avatars: {}", self.peer_addr, e);
            Vec::new()
        });

        let mut images = Vec::with_capacity(listed.len());
        for (user_id, path) in listed {
            match self.state.avatars.read(&path).await {
                Ok(bytes) if bytes.len() > MAX_PAYLOAD_LEN => {
                    warn!("[{}] Skipping avatar {}: grew past the packet limit", self.peer_addr, path.display());
                }
                Ok(bytes) => images.push((user_id, bytes)),
                Err(e) => warn!("[{}] Skipping avatar {}: {}", self.peer_addr, path.display(), e),
            }
        }

        let mut packets = vec![Packet::marker(PacketKind::ListUserImages), count_packet(images.len())];
        for (user_id, bytes) in images {
            packets.push(Packet::uint(user_id));
            packets.push(Packet::uint64(bytes.len() as u64));
            packets.push(Packet::buffer(bytes));
        }
        self.send(encode_all(&packets))
    }

    async fn handle_user_image(&mut self) -> Result<(), ServerError> {
        let announced = read_uint64(&mut self.reader).await?;
        let bytes = read_buffer(&mut self.reader).await?;

        if let Err(reason) = validate_upload(announced, &bytes) {
            warn!("[{}] Rejected avatar from user {}: {}", self.peer_addr, self.user_id, reason);
            return Ok(());
        }

        match self.state.avatars.write(self.user_id, &bytes).await {
            Ok(path) => info!("[{}] Stored avatar for user {} at {}", self.peer_addr, self.user_id, path.display()),
            Err(e) => error!("[{}] Failed to store avatar for user {}: {}", self.peer_addr, self.user_id, e),
        }
        Ok(())
    }
}

fn count_packet(count: usize) -> Packet {
    Packet::uint(u32::try_from(count).unwrap_or(u32::MAX))
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
}
