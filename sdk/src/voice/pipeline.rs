//! Network halves of a voice session: encode-and-send and receive-and-decode.
//!
//! Both loops are blocking and device independent, so they run on plain
//! threads and can be driven by loopback sockets in tests.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use relaychat_protocol::stream::{read_voice_frame, write_voice_frame};
use relaychat_protocol::MAX_VOICE_FRAME_LEN;
use tracing::{debug, warn};

use crate::codec::{AudioDecode, AudioEncode, FRAME_SAMPLES, MAX_DECODED_SAMPLES};
use crate::error::SdkError;
use crate::ring_buffer::{Consumer, Producer};
use crate::voice::stats::VoiceStats;

/// Polls before the send loop starts sleeping between fill checks.
const SPIN_POLLS: u32 = 64;

/// Longest pause while waiting for captured samples.
const POLL_SLEEP: Duration = Duration::from_millis(1);

/// Drains [`FRAME_SAMPLES`]-sized chunks from the capture buffer, encodes them
/// and writes each as a voice frame. Returns when `running` is cleared; an
/// encode or write failure ends the loop with an error.
pub fn send_loop<W, E>(
    socket: &mut W,
    capture: &mut Consumer,
    encoder: &mut E,
    stats: &VoiceStats,
    running: &AtomicBool,
) -> Result<(), SdkError>
where
    W: Write,
    E: AudioEncode,
{
    let mut pcm = [0.0f32; FRAME_SAMPLES];
    let mut frame = [0u8; MAX_VOICE_FRAME_LEN];
    let mut idle_polls = 0u32;

    while running.load(Ordering::Acquire) {
        if capture.fill() < FRAME_SAMPLES {
            idle_polls += 1;
            if idle_polls < SPIN_POLLS {
                thread::yield_now();
            } else {
                thread::sleep(POLL_SLEEP);
            }
            continue;
        }
        idle_polls = 0;

        let got = capture.consume(&mut pcm);
        debug_assert_eq!(got, FRAME_SAMPLES);

        let len = encoder.encode(&pcm, &mut frame)?;
        write_voice_frame(socket, &frame[..len])?;
        stats.record_sent();
    }

    debug!("Voice send loop stopped");
    Ok(())
}

/// Reads voice frames, decodes them and queues the PCM for playback.
///
/// A frame that does not fit in the playback buffer is dropped; a frame that
/// fails to decode is skipped. A zero or oversized frame length is fatal.
/// Read errors after `running` was cleared count as a clean stop.
pub fn recv_loop<R, D>(
    socket: &mut R,
    playback: &mut Producer,
    decoder: &mut D,
    stats: &VoiceStats,
    running: &AtomicBool,
) -> Result<(), SdkError>
where
    R: Read,
    D: AudioDecode,
{
    let mut frame = Vec::with_capacity(MAX_VOICE_FRAME_LEN);
    let mut pcm = vec![0.0f32; MAX_DECODED_SAMPLES];

    while running.load(Ordering::Acquire) {
        let len = match read_voice_frame(socket, &mut frame) {
            Ok(len) => len,
            Err(_) if !running.load(Ordering::Acquire) => break,
            Err(e) => return Err(e.into()),
        };
        if len == 0 || len > MAX_VOICE_FRAME_LEN {
            return Err(SdkError::InvalidFrame(len));
        }
        stats.record_received();

        let samples = match decoder.decode(&frame, &mut pcm) {
            Ok(samples) => samples,
            Err(e) => {
                stats.record_decode_error();
                warn!("Skipping undecodable voice frame: {}", e);
                continue;
            }
        };

        if playback.free() < samples {
            stats.record_dropped_frame();
            debug!("Playback buffer full, dropping {} samples", samples);
            continue;
        }
        playback.produce(&pcm[..samples]);
    }

    debug!("Voice receive loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::ring_buffer::ring_buffer;
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;

    /// Big-endian f32 bytes; 240 samples fit in one frame.
    struct RawCodec;

    impl AudioEncode for RawCodec {
        fn encode(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize, CodecError> {
            for (chunk, sample) in out.chunks_exact_mut(4).zip(pcm) {
                chunk.copy_from_slice(&sample.to_be_bytes());
            }
            Ok(pcm.len() * 4)
        }
    }

    impl AudioDecode for RawCodec {
        fn decode(&mut self, frame: &[u8], pcm: &mut [f32]) -> Result<usize, CodecError> {
            if frame.len() % 4 != 0 {
                return Err(CodecError::FrameSize { expected: 0, got: frame.len() });
            }
            for (sample, chunk) in pcm.iter_mut().zip(frame.chunks_exact(4)) {
                *sample = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
            Ok(frame.len() / 4)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    fn framed(frames: &[&[u8]]) -> Cursor<Vec<u8>> {
        let mut bytes = Vec::new();
        for frame in frames {
            write_voice_frame(&mut bytes, frame).unwrap();
        }
        Cursor::new(bytes)
    }

    #[test]
    fn samples_cross_a_loopback_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut sender = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut receiver, _) = listener.accept().unwrap();

        let (mut capture_tx, mut capture_rx) = ring_buffer(4 * FRAME_SAMPLES);
        let (mut playback_tx, mut playback_rx) = ring_buffer(4 * FRAME_SAMPLES);
        let stats = Arc::new(VoiceStats::default());
        let running = Arc::new(AtomicBool::new(true));

        let input = ramp(2 * FRAME_SAMPLES);
        capture_tx.produce(&input);

        let send = {
            let (stats, running) = (Arc::clone(&stats), Arc::clone(&running));
            thread::spawn(move || send_loop(&mut sender, &mut capture_rx, &mut RawCodec, &stats, &running))
        };
        let recv = {
            let (stats, running) = (Arc::clone(&stats), Arc::clone(&running));
            thread::spawn(move || {
                let result = recv_loop(&mut receiver, &mut playback_tx, &mut RawCodec, &stats, &running);
                (result, receiver)
            })
        };

        let mut output = Vec::new();
        let mut chunk = [0.0f32; FRAME_SAMPLES];
        while output.len() < input.len() {
            let got = playback_rx.consume(&mut chunk);
            output.extend_from_slice(&chunk[..got]);
            thread::yield_now();
        }
        assert_eq!(output, input);

        running.store(false, Ordering::Release);
        send.join().unwrap().unwrap();
        drop(capture_tx);

        // The send loop dropped its socket; the receiver now sees EOF after stop.
        let (result, _) = recv.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(stats.snapshot().frames_sent, 2);
        assert_eq!(stats.snapshot().frames_received, 2);
    }

    #[test]
    fn undecodable_frame_is_skipped() {
        let good: Vec<u8> = 0.25f32.to_be_bytes().to_vec();
        let mut socket = framed(&[&[1, 2, 3], &good]);
        let (mut tx, mut rx) = ring_buffer(16);
        let stats = VoiceStats::default();
        let running = AtomicBool::new(true);

        let result = recv_loop(&mut socket, &mut tx, &mut RawCodec, &stats, &running);
        assert!(matches!(result, Err(SdkError::Stream(e)) if e.is_disconnect()));

        let mut out = [0.0f32; 4];
        assert_eq!(rx.consume(&mut out), 1);
        assert_eq!(out[0], 0.25);
        assert_eq!(stats.snapshot().decode_errors, 1);
    }

    #[test]
    fn frame_without_room_is_dropped() {
        let big: Vec<u8> = [0.5f32; 8].iter().flat_map(|s| s.to_be_bytes()).collect();
        let small: Vec<u8> = 0.75f32.to_be_bytes().to_vec();
        let mut socket = framed(&[&big, &small]);
        let (mut tx, mut rx) = ring_buffer(4);
        let stats = VoiceStats::default();
        let running = AtomicBool::new(true);

        let _ = recv_loop(&mut socket, &mut tx, &mut RawCodec, &stats, &running);

        let mut out = [0.0f32; 4];
        assert_eq!(rx.consume(&mut out), 1);
        assert_eq!(out[0], 0.75);
        assert_eq!(stats.snapshot().dropped_frames, 1);
    }

    #[test]
    fn empty_frame_is_fatal() {
        let mut socket = framed(&[&[]]);
        let (mut tx, _rx) = ring_buffer(4);
        let result = recv_loop(&mut socket, &mut tx, &mut RawCodec, &VoiceStats::default(), &AtomicBool::new(true));
        assert!(matches!(result, Err(SdkError::InvalidFrame(0))));
    }

    #[test]
    fn encode_failure_ends_send_loop() {
        struct Failing;
        impl AudioEncode for Failing {
            fn encode(&mut self, _: &[f32], _: &mut [u8]) -> Result<usize, CodecError> {
                Err(CodecError::FrameSize { expected: FRAME_SAMPLES, got: 0 })
            }
        }

        let (mut tx, mut rx) = ring_buffer(2 * FRAME_SAMPLES);
        tx.produce(&ramp(FRAME_SAMPLES));
        let mut sink = Vec::new();
        let result = send_loop(&mut sink, &mut rx, &mut Failing, &VoiceStats::default(), &AtomicBool::new(true));
        assert!(matches!(result, Err(SdkError::Codec(_))));
        assert!(sink.is_empty());
    }
}
