use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use relaychat_protocol::stream::write_packet;
use relaychat_protocol::Packet;
use tracing::{debug, error, info};

use crate::codec::{OpusDecoder, OpusEncoder, DEFAULT_BITRATE, FRAME_SAMPLES, SAMPLE_RATE};
use crate::error::SdkError;
use crate::ring_buffer::{capacity_for, ring_buffer};
use crate::voice::capture::start_capture;
use crate::voice::pipeline::{recv_loop, send_loop};
use crate::voice::playback::start_playback;
use crate::voice::stats::{VoiceStats, VoiceStatsSnapshot};

/// Default buffering latency of each ring buffer.
pub const RING_MS: u32 = 200;

/// Each ring buffer holds at least this many whole frames, whatever `ring_ms` says.
const MIN_RING_FRAMES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConfig {
    /// Buffering latency of the capture and playback ring buffers.
    pub ring_ms: u32,
    /// Opus bitrate in bits per second.
    pub bitrate: i32,
}

impl VoiceConfig {
    /// Slot count of each ring buffer. Never small enough to keep the send
    /// loop from seeing a whole frame.
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        capacity_for(SAMPLE_RATE, self.ring_ms).max(MIN_RING_FRAMES * FRAME_SAMPLES + 1)
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ring_ms: RING_MS,
            bitrate: DEFAULT_BITRATE,
        }
    }
}

struct StopState {
    running: AtomicBool,
    stopped: Mutex<bool>,
    wake: Condvar,
    socket: TcpStream,
}

/// Stops a voice session from any thread.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<StopState>,
}

impl StopHandle {
    fn new(socket: TcpStream) -> Self {
        Self {
            state: Arc::new(StopState {
                running: AtomicBool::new(true),
                stopped: Mutex::new(false),
                wake: Condvar::new(),
                socket,
            }),
        }
    }

    /// Clears the running flag, wakes [`VoiceSession::wait`] and shuts the
    /// socket down so blocked network reads return. Idempotent.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Release);
        *self.state.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.state.wake.notify_all();
        if let Err(e) = self.state.socket.shutdown(Shutdown::Both) {
            debug!("Voice socket shutdown: {}", e);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    fn running(&self) -> &AtomicBool {
        &self.state.running
    }
}

/// A duplex voice call: capture and playback device streams plus one network
/// thread per direction, joined through lock-free ring buffers.
pub struct VoiceSession {
    stop: StopHandle,
    stats: Arc<VoiceStats>,
    threads: Vec<JoinHandle<()>>,
    streams: Vec<cpal::Stream>,
}

impl VoiceSession {
    /// Connects to the voice relay, routes to `channel_id` and starts audio.
    pub fn start(addr: impl ToSocketAddrs, channel_id: u32, config: VoiceConfig) -> Result<Self, SdkError> {
        let mut socket = TcpStream::connect(addr)?;
        socket.set_nodelay(true)?;
        write_packet(&mut socket, &Packet::uint(channel_id))?;

        let capacity = config.ring_capacity();
        let (capture_tx, mut capture_rx) = ring_buffer(capacity);
        let (mut playback_tx, playback_rx) = ring_buffer(capacity);

        let mut encoder = OpusEncoder::new(config.bitrate)?;
        let mut decoder = OpusDecoder::new()?;
        let stats = Arc::new(VoiceStats::default());
        let stop = StopHandle::new(socket.try_clone()?);

        let mut session = Self {
            stop: stop.clone(),
            stats: Arc::clone(&stats),
            threads: Vec::with_capacity(2),
            streams: Vec::with_capacity(2),
        };

        // Any failure below drops `session`, which stops and joins what already started.
        session.streams.push(start_capture(capture_tx)?);
        session.streams.push(start_playback(playback_rx, Arc::clone(&stats))?);

        let mut send_socket = socket.try_clone()?;
        let (send_stop, send_stats) = (stop.clone(), Arc::clone(&stats));
        session.threads.push(thread::Builder::new().name("voice-send".into()).spawn(move || {
            if let Err(e) = send_loop(&mut send_socket, &mut capture_rx, &mut encoder, &send_stats, send_stop.running()) {
                error!("Voice send failed: {}", e);
            }
            send_stop.stop();
        })?);

        let mut recv_socket = socket;
        let (recv_stop, recv_stats) = (stop, Arc::clone(&stats));
        session.threads.push(thread::Builder::new().name("voice-recv".into()).spawn(move || {
            if let Err(e) = recv_loop(&mut recv_socket, &mut playback_tx, &mut decoder, &recv_stats, recv_stop.running()) {
                error!("Voice receive failed: {}", e);
            }
            recv_stop.stop();
        })?);

        info!("Voice session started on channel {}", channel_id);
        Ok(session)
    }

    /// Blocks the calling thread until the session is stopped.
    pub fn wait(&self) {
        let state = &self.stop.state;
        let mut stopped = state.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            stopped = state.wake.wait(stopped).unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn stats(&self) -> VoiceStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the session and joins both network threads. Device streams are
    /// closed before this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.stop();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("Voice thread panicked");
            }
        }
        self.streams.clear();
        debug!("Voice session stopped");
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if !self.threads.is_empty() || !self.streams.is_empty() {
            self.shutdown();
        }
    }
}
