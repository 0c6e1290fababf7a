//! Client-side voice: device capture and playback bridged to the relay socket.

mod capture;
mod device;
mod pipeline;
mod playback;
mod session;
mod stats;

pub use pipeline::{recv_loop, send_loop};
pub use session::{StopHandle, VoiceConfig, VoiceSession, RING_MS};
pub use stats::{VoiceStats, VoiceStatsSnapshot};
