//! Lock-free single-producer single-consumer ring buffer for audio samples.
//!
//! Bridges a real-time device callback and a network thread. Neither side
//! blocks or fails: a full buffer drops its oldest samples, an empty one
//! simply returns fewer samples than asked for.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    /// `f32` samples stored as their bit patterns.
    slots: Box<[AtomicU32]>,
    /// Monotonic counters; the slot of index `i` is `i % slots.len()`.
    write: AtomicUsize,
    read: AtomicUsize,
    dropped: AtomicU64,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// At most `capacity - 1` samples are ever buffered.
    fn max_fill(&self) -> usize {
        self.slots.len() - 1
    }

    fn fill(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.max_fill())
    }

    fn slot(&self, index: usize) -> &AtomicU32 {
        &self.slots[index % self.slots.len()]
    }
}

/// Creates a ring buffer with `capacity` slots, holding at most `capacity - 1` samples.
///
/// # Panics
/// Panics if `capacity < 2`.
#[must_use]
pub fn ring_buffer(capacity: usize) -> (Producer, Consumer) {
    assert!(capacity >= 2, "ring buffer needs at least two slots");
    let shared = Arc::new(Shared {
        slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
        dropped: AtomicU64::new(0),
    });
    (
        Producer { shared: Arc::clone(&shared) },
        Consumer { shared },
    )
}

/// Slot count for `ms` milliseconds of mono audio at `sample_rate`.
#[must_use]
pub fn capacity_for(sample_rate: u32, ms: u32) -> usize {
    let samples = u64::from(sample_rate) * u64::from(ms) / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX).max(1) + 1
}

/// Writing half. Not `Clone`: there is exactly one producer.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Appends `samples`. If they do not fit, the oldest unread samples are
    /// dropped first; if `samples` alone exceeds the buffer, only its tail is kept.
    pub fn produce(&mut self, samples: &[f32]) {
        let shared = &*self.shared;
        let max_fill = shared.max_fill();

        let mut skipped = 0;
        let samples = if samples.len() > max_fill {
            skipped = samples.len() - max_fill;
            &samples[skipped..]
        } else {
            samples
        };
        let count = samples.len();
        if count == 0 {
            return;
        }

        let write = shared.write.load(Ordering::Relaxed);
        let mut read = shared.read.load(Ordering::Acquire);
        loop {
            let free = max_fill - write.wrapping_sub(read).min(max_fill);
            if count <= free {
                break;
            }
            let overflow = count - free;
            match shared.read.compare_exchange(
                read,
                read.wrapping_add(overflow),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    skipped += overflow;
                    break;
                }
                Err(current) => read = current,
            }
        }

        for (offset, sample) in samples.iter().enumerate() {
            shared.slot(write.wrapping_add(offset)).store(sample.to_bits(), Ordering::Relaxed);
        }
        shared.write.store(write.wrapping_add(count), Ordering::Release);

        if skipped > 0 {
            shared.dropped.fetch_add(skipped as u64, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn fill(&self) -> usize {
        self.shared.fill()
    }

    /// Samples that can be produced without dropping anything.
    #[must_use]
    pub fn free(&self) -> usize {
        self.shared.max_fill() - self.shared.fill()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Total samples discarded by overflow so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Reading half. Not `Clone`: there is exactly one consumer.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Copies up to `out.len()` samples in FIFO order and returns how many were
    /// copied. The rest of `out` is left untouched.
    pub fn consume(&mut self, out: &mut [f32]) -> usize {
        let shared = &*self.shared;
        loop {
            let read = shared.read.load(Ordering::Acquire);
            let write = shared.write.load(Ordering::Acquire);
            let available = write.wrapping_sub(read);
            if available > shared.max_fill() {
                // The producer moved `read` between the two loads.
                continue;
            }

            let count = available.min(out.len());
            for (offset, sample) in out[..count].iter_mut().enumerate() {
                *sample = f32::from_bits(shared.slot(read.wrapping_add(offset)).load(Ordering::Relaxed));
            }

            // A failed exchange means the producer dropped samples we just copied.
            if shared
                .read
                .compare_exchange(read, read.wrapping_add(count), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return count;
            }
        }
    }

    #[must_use]
    pub fn fill(&self) -> usize {
        self.shared.fill()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use std::thread;

    fn ramp(range: std::ops::Range<usize>) -> Vec<f32> {
        range.map(|i| i as f32).collect()
    }

    #[test]
    fn fifo_without_overflow() {
        let (mut tx, mut rx) = ring_buffer(16);
        tx.produce(&ramp(0..5));
        tx.produce(&ramp(5..9));
        assert_eq!(rx.fill(), 9);

        let mut out = [0.0; 6];
        assert_eq!(rx.consume(&mut out), 6);
        assert_eq!(out.to_vec(), ramp(0..6));

        let mut out = [0.0; 6];
        assert_eq!(rx.consume(&mut out), 3);
        assert_eq!(out[..3].to_vec(), ramp(6..9));
        assert_eq!(tx.dropped(), 0);
    }

    #[test]
    fn empty_consume_leaves_output_alone() {
        let (_tx, mut rx) = ring_buffer(8);
        let mut out = [0.5; 4];
        assert_eq!(rx.consume(&mut out), 0);
        assert_eq!(out, [0.5; 4]);
    }

    #[test]
    fn wraps_around_the_slot_array() {
        let (mut tx, mut rx) = ring_buffer(5);
        let mut out = [0.0; 3];
        for round in 0..10 {
            let base = round * 3;
            tx.produce(&ramp(base..base + 3));
            assert_eq!(rx.consume(&mut out), 3);
            assert_eq!(out.to_vec(), ramp(base..base + 3));
        }
    }

    #[test]
    fn overflow_drops_oldest() {
        let (mut tx, mut rx) = ring_buffer(8);
        tx.produce(&ramp(0..6));
        tx.produce(&ramp(6..10));

        assert_eq!(tx.fill(), 7);
        assert_eq!(tx.free(), 0);
        assert_eq!(tx.dropped(), 3);

        let mut out = [0.0; 8];
        assert_eq!(rx.consume(&mut out), 7);
        assert_eq!(out[..7].to_vec(), ramp(3..10));
    }

    #[test]
    fn oversized_input_keeps_tail() {
        let (mut tx, mut rx) = ring_buffer(4);
        tx.produce(&ramp(0..10));
        assert_eq!(tx.dropped(), 7);

        let mut out = [0.0; 4];
        assert_eq!(rx.consume(&mut out), 3);
        assert_eq!(out[..3].to_vec(), ramp(7..10));
    }

    #[test]
    fn capacity_from_latency() {
        assert_eq!(capacity_for(48_000, 200), 9_601);
        assert_eq!(capacity_for(48_000, 0), 2);
    }

    #[test]
    fn concurrent_order_is_preserved() {
        const TOTAL: usize = 200_000;
        let (mut tx, mut rx) = ring_buffer(1024);

        let producer = thread::spawn(move || {
            let samples = ramp(0..TOTAL);
            for chunk in samples.chunks(240) {
                tx.produce(chunk);
            }
        });

        let mut last = -1.0f32;
        let mut seen = 0usize;
        let mut out = [0.0f32; 128];
        while !producer.is_finished() || rx.fill() > 0 {
            let count = rx.consume(&mut out);
            for &sample in &out[..count] {
                assert!(sample > last, "{sample} after {last}");
                last = sample;
            }
            seen += count;
        }
        producer.join().unwrap();

        assert!(seen > 0);
        assert_eq!(last, (TOTAL - 1) as f32);
    }
}
