use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::chat::session::{authenticate, write_outbound, ChatSession};
use crate::chat::ChatState;
use crate::error::ServerError;

/// ChatServer accepts text connections, authenticates them and serves chat requests.
#[derive(Clone)]
pub struct ChatServer {
    state: Arc<ChatState>,
}

impl ChatServer {
    #[must_use]
    pub fn new(state: ChatState) -> Self {
        Self { state: Arc::new(state) }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ChatState> {
        &self.state
    }

    /// Binds the listener and accepts in the background. Returns the bound address.
    pub async fn bind(&self, addr: &str) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("ChatServer listening on {}", local_addr);

        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.accept_loop(listener).await {
                error!("ChatServer stopped accepting: {}", e);
            }
        });
        Ok(local_addr)
    }

    /// Binds the listener and accepts connections until an accept error.
    pub async fn run(&self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("ChatServer listening on {}", listener.local_addr()?);
        self.accept_loop(listener).await
    }

    async fn accept_loop(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            debug!("[{}] Accepted chat connection", peer_addr);

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                match handle_connection(state, socket, peer_addr).await {
                    Ok(()) => {}
                    Err(ServerError::AuthenticationFailed(username)) => {
                        warn!("[{}] Authentication failed for {:?}", peer_addr, username);
                    }
                    Err(ServerError::Stream(e)) if e.is_disconnect() => {
                        debug!("[{}] Closed before login", peer_addr);
                    }
                    Err(ServerError::SlowConsumer) => {
                        warn!("[{}] Disconnected: client stopped reading", peer_addr);
                    }
                    Err(e) => error!("[{}] Error: {}", peer_addr, e),
                }
            });
        }
    }
}

async fn handle_connection(state: Arc<ChatState>, socket: TcpStream, peer_addr: SocketAddr) -> Result<(), ServerError> {
    let (mut reader, mut writer) = socket.into_split();
    let user_id = authenticate(&state, &mut reader, &mut writer, peer_addr).await?;

    let (outbound_tx, outbound_rx) = mpsc::channel(state.session_queue);
    let writer_task = tokio::spawn(async move {
        if let Err(e) = write_outbound(writer, outbound_rx).await {
            debug!("[{}] Writer stopped: {}", peer_addr, e);
        }
    });

    let conn = state.registry.next_connection_id();
    let result = ChatSession::new(state, reader, outbound_tx, conn, user_id, peer_addr)
        .run()
        .await;
    // The writer may be stuck on a peer that stopped reading; dropping it closes the socket.
    writer_task.abort();
    result
}
