//! Text chat: authentication, request dispatch and message broadcast.

mod registry;
mod server;
mod session;

use std::sync::Arc;

pub use registry::{ConnectionId, Outbound, SessionRegistry, DEFAULT_SESSION_QUEUE};
pub use server::ChatServer;

use crate::avatars::AvatarStore;
use crate::store::Store;

/// State shared by every chat session of one server.
pub struct ChatState {
    pub store: Arc<dyn Store>,
    pub avatars: AvatarStore,
    pub registry: SessionRegistry,
    /// Bound of each session's outbound queue.
    pub session_queue: usize,
}

impl ChatState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, avatars: AvatarStore) -> Self {
        Self {
            store,
            avatars,
            registry: SessionRegistry::new(),
            session_queue: DEFAULT_SESSION_QUEUE,
        }
    }

    /// A session whose queue fills up is disconnected. Clamped to at least one entry.
    #[must_use]
    pub fn with_session_queue(mut self, len: usize) -> Self {
        self.session_queue = len.max(1);
        self
    }
}
