//! Voice relay: per-channel fan-out of opaque voice frames.

mod relay;
mod routes;

pub use relay::VoiceRelayServer;
pub use routes::{VoiceRoutes, DEFAULT_VOICE_QUEUE};
