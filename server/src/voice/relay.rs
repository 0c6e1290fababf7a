use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relaychat_protocol::async_stream::{read_uint, read_voice_frame, write_raw};
use relaychat_protocol::{encode_voice_frame, StreamError};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::chat::{ConnectionId, Outbound};
use crate::error::ServerError;
use crate::voice::routes::{VoiceRoutes, DEFAULT_VOICE_QUEUE};

struct RelayState {
    routes: VoiceRoutes,
    next_conn: AtomicU64,
    echo: bool,
    queue_frames: usize,
}

/// VoiceRelayServer forwards voice frames to the other members of a channel.
/// Frames are never decoded.
#[derive(Clone)]
pub struct VoiceRelayServer {
    state: Arc<RelayState>,
}

impl VoiceRelayServer {
    /// With `echo` set, a member also receives its own frames.
    #[must_use]
    pub fn new(echo: bool) -> Self {
        Self::with_queue_frames(echo, DEFAULT_VOICE_QUEUE)
    }

    /// Bounds each member's frame queue; frames for a member that falls
    /// further behind are dropped. Clamped to at least one frame.
    #[must_use]
    pub fn with_queue_frames(echo: bool, queue_frames: usize) -> Self {
        Self {
            state: Arc::new(RelayState {
                routes: VoiceRoutes::new(),
                next_conn: AtomicU64::new(1),
                echo,
                queue_frames: queue_frames.max(1),
            }),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &VoiceRoutes {
        &self.state.routes
    }

    /// Binds the listener and relays in the background. Returns the bound address.
    pub async fn bind(&self, addr: &str) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("VoiceRelayServer listening on {}", local_addr);

        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.accept_loop(listener).await {
                error!("VoiceRelayServer stopped accepting: {}", e);
            }
        });
        Ok(local_addr)
    }

    pub async fn run(&self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("VoiceRelayServer listening on {}", listener.local_addr()?);
        self.accept_loop(listener).await
    }

    async fn accept_loop(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            if let Err(e) = socket.set_nodelay(true) {
                debug!("[{}] Failed to set TCP_NODELAY: {}", peer_addr, e);
            }

            let state = Arc::clone(&self.state);
            let conn = state.next_conn.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(async move {
                if let Err(e) = relay_connection(&state, socket, peer_addr, conn).await {
                    debug!("[{}] Voice connection ended: {}", peer_addr, e);
                }
            });
        }
    }
}

async fn relay_connection(
    state: &RelayState,
    socket: TcpStream,
    peer_addr: SocketAddr,
    conn: ConnectionId,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = socket.into_split();
    let channel_id = read_uint(&mut reader).await?;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(state.queue_frames);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write_raw(&mut writer, &frame).await {
                debug!("[{}] Voice writer stopped: {}", peer_addr, e);
                break;
            }
        }
    });

    state.routes.join(channel_id, conn, outbound_tx);
    info!("[{}] Joined voice channel {}", peer_addr, channel_id);

    let result = forward_frames(state, &mut reader, channel_id, conn).await;

    state.routes.leave(channel_id, conn);
    writer_task.abort();
    info!("[{}] Left voice channel {}", peer_addr, channel_id);
    result
}

async fn forward_frames(
    state: &RelayState,
    reader: &mut OwnedReadHalf,
    channel_id: u32,
    conn: ConnectionId,
) -> Result<(), ServerError> {
    let mut buf = Vec::new();
    loop {
        match read_voice_frame(reader, &mut buf).await {
            Ok(_) => {}
            Err(e) if e.is_disconnect() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let frame: Outbound = encode_voice_frame(&buf)
            .map_err(StreamError::from)?
            .into();
        state.routes.fan_out(channel_id, conn, &frame, state.echo);
    }
}
