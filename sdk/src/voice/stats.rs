use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic counters shared by the audio callbacks and network threads.
#[derive(Debug, Default)]
pub struct VoiceStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    underruns: AtomicU64,
    dropped_frames: AtomicU64,
    decode_errors: AtomicU64,
}

/// Point-in-time copy of [`VoiceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceStatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub underruns: u64,
    pub dropped_frames: u64,
    pub decode_errors: u64,
}

impl VoiceStats {
    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Playback callback ran short of samples and padded with silence.
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    /// A decoded frame did not fit in the playback buffer.
    pub fn record_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> VoiceStatsSnapshot {
        VoiceStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}
