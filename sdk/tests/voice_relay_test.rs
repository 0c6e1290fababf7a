use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use relaychat_protocol::stream::write_packet;
use relaychat_protocol::Packet;
use relaychat_sdk::voice::{recv_loop, send_loop};
use relaychat_sdk::{ring_buffer, AudioDecode, AudioEncode, CodecError, VoiceStats, FRAME_SAMPLES};
use relaychat_server::VoiceRelayServer;

/// Carries PCM as big-endian `f32` bytes so the relayed samples can be compared exactly.
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
        for (sample, chunk) in pcm.iter_mut().zip(frame.chunks_exact(4)) {
            *sample = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(frame.len() / 4)
    }
}

fn join(addr: SocketAddr, channel_id: u32) -> TcpStream {
    let mut socket = TcpStream::connect(addr).expect("connect relay");
    write_packet(&mut socket, &Packet::uint(channel_id)).unwrap();
    socket
}

async fn wait_for_members(relay: &VoiceRelayServer, channel_id: u32, count: usize) {
    for _ in 0..100 {
        if relay.routes().member_count(channel_id) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("channel {channel_id} never reached {count} members");
}

#[allow(clippy::cast_precision_loss)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_frame_travels_through_relay() {
    let relay = VoiceRelayServer::new(false);
    let addr = relay.bind("127.0.0.1:0").await.unwrap();

    let mut speaker = join(addr, 7);
    let mut listener = join(addr, 7);
    wait_for_members(&relay, 7, 2).await;

    let input: Vec<f32> = (0..FRAME_SAMPLES).map(|i| i as f32 / FRAME_SAMPLES as f32).collect();
    let (mut capture_tx, mut capture_rx) = ring_buffer(4 * FRAME_SAMPLES);
    let (mut playback_tx, mut playback_rx) = ring_buffer(4 * FRAME_SAMPLES);
    let stats = Arc::new(VoiceStats::default());
    let running = Arc::new(AtomicBool::new(true));
    capture_tx.produce(&input);

    let send = {
        let (stats, running) = (Arc::clone(&stats), Arc::clone(&running));
        thread::spawn(move || send_loop(&mut speaker, &mut capture_rx, &mut RawCodec, &stats, &running))
    };
    let recv_socket = listener.try_clone().unwrap();
    let recv = {
        let (stats, running) = (Arc::clone(&stats), Arc::clone(&running));
        thread::spawn(move || recv_loop(&mut listener, &mut playback_tx, &mut RawCodec, &stats, &running))
    };

    let received = tokio::task::spawn_blocking(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut output = Vec::new();
        let mut chunk = [0.0f32; FRAME_SAMPLES];
        while output.len() < FRAME_SAMPLES && Instant::now() < deadline {
            let got = playback_rx.consume(&mut chunk);
            output.extend_from_slice(&chunk[..got]);
            thread::sleep(Duration::from_millis(1));
        }
        output
    })
    .await
    .unwrap();
    assert_eq!(received, input);

    running.store(false, Ordering::Release);
    recv_socket.shutdown(std::net::Shutdown::Both).unwrap();
    send.join().unwrap().unwrap();
    recv.join().unwrap().unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.frames_sent, 1);
    assert_eq!(snapshot.frames_received, 1);
}
