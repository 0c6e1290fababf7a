//! Relaychat server: authenticated text chat with broadcast, plus a per-channel
//! voice relay on a separate port.

pub mod avatars;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod store;
pub mod voice;

pub use avatars::AvatarStore;
pub use chat::{ChatServer, ChatState, SessionRegistry};
pub use config::ServerConfig;
pub use error::{ConfigError, ServerError, StoreError};
pub use store::{MemoryStore, Store};
pub use voice::VoiceRelayServer;
