//! Async client for the text protocol: login, requests and server pushes.

use std::time::Duration;

use async_channel::{unbounded, Receiver, Sender};
use relaychat_protocol::async_stream::{
    read_buffer, read_channel_info, read_code, read_message_body, read_packet, read_uint, read_uint64, read_user_info,
    write_raw,
};
use relaychat_protocol::{
    auth_code, encode_all, ChannelInfo, MessageInfo, Packet, PacketKind, ProtocolError, StreamError, UserInfo,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::error::SdkError;

/// Default timeout for connecting and logging in.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Period for [`ChatClient::start_refresh`] that keeps presence current.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// An avatar entry from a `LIST_USER_IMGS` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserImage {
    pub user_id: u32,
    pub bytes: Vec<u8>,
}

/// Everything the server pushes to a logged-in client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Channels(Vec<ChannelInfo>),
    Users(Vec<UserInfo>),
    /// A broadcast message or one entry of a history replay.
    Message(MessageInfo),
    UserImages(Vec<UserImage>),
    /// The connection is gone. Always the last event.
    Disconnected,
}

/// Logged-in connection to a chat server.
pub struct ChatClient {
    send_tx: Sender<Vec<u8>>,
    events_rx: Receiver<ChatEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    refresh: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Connects and authenticates. A rejected login is [`SdkError::AuthenticationFailed`].
    pub async fn connect(addr: &str, username: &str, password: &str) -> Result<Self, SdkError> {
        debug!("Chat connect to {}", addr);
        let mut socket = tokio::time::timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), async {
            let mut socket = TcpStream::connect(addr).await?;
            write_raw(&mut socket, &encode_all(&[Packet::text(username), Packet::text(password)])).await?;
            Ok::<_, SdkError>(socket)
        })
        .await
        .map_err(|_| SdkError::Timeout)??;

        let code = tokio::time::timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), read_code(&mut socket))
            .await
            .map_err(|_| SdkError::Timeout)??;
        if code != auth_code::SUCCESS {
            return Err(SdkError::AuthenticationFailed);
        }
        debug!("Logged in to {} as {}", addr, username);

        let (reader, writer) = socket.into_split();
        let (send_tx, send_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();

        Ok(Self {
            send_tx,
            events_rx,
            reader: tokio::spawn(read_events(reader, events_tx)),
            writer: tokio::spawn(write_requests(writer, send_rx)),
            refresh: None,
        })
    }

    /// Stream of server pushes. Every clone shares the same queue.
    #[must_use]
    pub fn events(&self) -> Receiver<ChatEvent> {
        self.events_rx.clone()
    }

    async fn send(&self, packets: &[Packet]) -> Result<(), SdkError> {
        self.send_tx
            .send(encode_all(packets))
            .await
            .map_err(|_| SdkError::Disconnected)
    }

    /// Requests the channel and user lists now and then every `period`, until
    /// the client is dropped or the connection goes away. Replaces any refresh
    /// already running. Replies arrive as ordinary events.
    ///
    /// # Panics
    /// Panics if `period` is zero.
    pub fn start_refresh(&mut self, period: Duration) {
        self.stop_refresh();
        let send_tx = self.send_tx.clone();
        let request = encode_all(&[
            Packet::marker(PacketKind::ListChannels),
            Packet::marker(PacketKind::ListUsers),
        ]);
        self.refresh = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if send_tx.send(request.clone()).await.is_err() {
                    break;
                }
            }
            debug!("Chat refresh stopped");
        }));
    }

    pub fn stop_refresh(&mut self) {
        if let Some(task) = self.refresh.take() {
            task.abort();
        }
    }

    pub async fn list_channels(&self) -> Result<(), SdkError> {
        self.send(&[Packet::marker(PacketKind::ListChannels)]).await
    }

    pub async fn list_users(&self) -> Result<(), SdkError> {
        self.send(&[Packet::marker(PacketKind::ListUsers)]).await
    }

    /// History arrives as one [`ChatEvent::Message`] per stored message.
    pub async fn list_messages(&self, channel_id: u32) -> Result<(), SdkError> {
        self.send(&[Packet::marker(PacketKind::ListMessages), Packet::uint(channel_id)])
            .await
    }

    /// Empty messages are not sent.
    pub async fn send_message(&self, channel_id: u32, text: &str) -> Result<(), SdkError> {
        if text.is_empty() {
            return Ok(());
        }
        self.send(&[
            Packet::marker(PacketKind::Message),
            Packet::uint(channel_id),
            Packet::text(text),
        ])
        .await
    }

    pub async fn list_user_images(&self) -> Result<(), SdkError> {
        self.send(&[Packet::marker(PacketKind::ListUserImages)]).await
    }

    /// Uploads a PNG avatar for the logged-in user.
    pub async fn upload_avatar(&self, bytes: Vec<u8>) -> Result<(), SdkError> {
        let size = bytes.len() as u64;
        self.send(&[
            Packet::marker(PacketKind::UserImage),
            Packet::uint64(size),
            Packet::buffer(bytes),
        ])
        .await
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.stop_refresh();
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_requests(mut writer: OwnedWriteHalf, send_rx: Receiver<Vec<u8>>) {
    while let Ok(bytes) = send_rx.recv().await {
        if let Err(e) = write_raw(&mut writer, &bytes).await {
            error!("Chat write error: {}", e);
            break;
        }
    }
    debug!("Chat writer stopped");
}

async fn read_events(mut reader: OwnedReadHalf, events_tx: Sender<ChatEvent>) {
    loop {
        match read_event(&mut reader).await {
            Ok(Some(event)) => {
                if events_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(StreamError::Protocol(e)) => warn!("Chat protocol error: {}", e),
            Err(e) => {
                if !e.is_disconnect() {
                    error!("Chat read error: {}", e);
                }
                let _ = events_tx.send(ChatEvent::Disconnected).await;
                break;
            }
        }
    }
    debug!("Chat reader stopped");
}

/// Reads one top-level reply. Packets that start nothing known yield `None`.
async fn read_event(reader: &mut OwnedReadHalf) -> Result<Option<ChatEvent>, StreamError> {
    let packet = match read_packet(reader).await {
        Ok(packet) => packet,
        Err(StreamError::Protocol(ProtocolError::UnknownPacketKind(kind))) => {
            warn!("Ignoring unknown packet kind 0x{:02x}", kind);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let event = match packet.kind {
        PacketKind::ListChannels => {
            let count = read_uint(reader).await?;
            let mut channels = Vec::new();
            for _ in 0..count {
                channels.push(read_channel_info(reader).await?);
            }
            ChatEvent::Channels(channels)
        }
        PacketKind::ListUsers => {
            let count = read_uint(reader).await?;
            let mut users = Vec::new();
            for _ in 0..count {
                users.push(read_user_info(reader).await?);
            }
            ChatEvent::Users(users)
        }
        PacketKind::Message => ChatEvent::Message(read_message_body(reader).await?),
        PacketKind::ListUserImages => {
            let count = read_uint(reader).await?;
            let mut images = Vec::new();
            for _ in 0..count {
                let user_id = read_uint(reader).await?;
                let size = read_uint64(reader).await?;
                let bytes = read_buffer(reader).await?;
                if size != bytes.len() as u64 {
                    warn!("Avatar of user {} announced {} bytes, got {}", user_id, size, bytes.len());
                }
                images.push(UserImage { user_id, bytes });
            }
            ChatEvent::UserImages(images)
        }
        other => {
            warn!("Unexpected packet kind {:?}", other);
            return Ok(None);
        }
    };
    Ok(Some(event))
}

