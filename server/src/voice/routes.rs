//! Channel id to voice connection routing table.

use dashmap::DashMap;
use tokio::sync::mpsc::Sender;

use crate::chat::{ConnectionId, Outbound};

/// Default bound of each member's frame queue. 64 frames is 320 ms of audio.
pub const DEFAULT_VOICE_QUEUE: usize = 64;

struct VoiceMember {
    conn: ConnectionId,
    outbound: Sender<Outbound>,
}

/// Voice connections grouped by the channel they routed to.
#[derive(Default)]
pub struct VoiceRoutes {
    channels: DashMap<u32, Vec<VoiceMember>>,
}

impl VoiceRoutes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, channel_id: u32, conn: ConnectionId, outbound: Sender<Outbound>) {
        self.channels
            .entry(channel_id)
            .or_default()
            .push(VoiceMember { conn, outbound });
    }

    /// Removes the connection; an emptied channel is dropped from the table.
    pub fn leave(&self, channel_id: u32, conn: ConnectionId) {
        self.channels.remove_if_mut(&channel_id, |_, members| {
            members.retain(|m| m.conn != conn);
            members.is_empty()
        });
    }

    #[must_use]
    pub fn member_count(&self, channel_id: u32) -> usize {
        self.channels.get(&channel_id).map_or(0, |members| members.len())
    }

    /// Frames waiting in the queues of the channel's members.
    #[must_use]
    pub fn queued_frames(&self, channel_id: u32) -> usize {
        self.channels.get(&channel_id).map_or(0, |members| {
            members
                .iter()
                .map(|m| m.outbound.max_capacity() - m.outbound.capacity())
                .sum()
        })
    }

    /// Queues `frame` for every member of the channel. The sender itself is
    /// skipped unless `echo` is set. A member whose queue is full misses the
    /// frame. Returns the number of members reached.
    pub fn fan_out(&self, channel_id: u32, sender: ConnectionId, frame: &Outbound, echo: bool) -> usize {
        let Some(members) = self.channels.get(&channel_id) else {
            return 0;
        };
        members
            .iter()
            .filter(|m| echo || m.conn != sender)
            .filter(|m| m.outbound.try_send(Outbound::clone(frame)).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn fan_out_skips_sender_and_other_channels() {
        let routes = VoiceRoutes::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let (tx3, mut rx3) = mpsc::channel(4);
        routes.join(7, 1, tx1);
        routes.join(7, 2, tx2);
        routes.join(8, 3, tx3);

        let frame: Outbound = vec![0, 3, 1, 2, 3].into();
        assert_eq!(routes.fan_out(7, 1, &frame, false), 1);

        assert_eq!(rx2.try_recv().unwrap(), frame);
        assert!(rx1.try_recv().is_err());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn echo_includes_sender() {
        let routes = VoiceRoutes::new();
        let (tx, mut rx) = mpsc::channel(4);
        routes.join(1, 10, tx);

        let frame: Outbound = vec![0, 1, 9].into();
        assert_eq!(routes.fan_out(1, 10, &frame, true), 1);
        assert_eq!(rx.try_recv().unwrap(), frame);
    }

    #[test]
    fn full_member_queue_drops_frames() {
        let routes = VoiceRoutes::new();
        let (stalled_tx, mut stalled_rx) = mpsc::channel(2);
        let (live_tx, mut live_rx) = mpsc::channel(2);
        routes.join(5, 1, stalled_tx);
        routes.join(5, 2, live_tx);

        for i in 0..10u8 {
            let frame: Outbound = vec![0, 1, i].into();
            let reached = routes.fan_out(5, 3, &frame, false);
            assert_eq!(reached, if i < 2 { 2 } else { 1 });
            assert_eq!(live_rx.try_recv().unwrap(), frame);
        }

        assert_eq!(routes.queued_frames(5), 2);
        assert_eq!(stalled_rx.try_recv().unwrap().as_ref(), &[0, 1, 0]);
        assert_eq!(stalled_rx.try_recv().unwrap().as_ref(), &[0, 1, 1]);
        assert!(stalled_rx.try_recv().is_err());
    }

    #[test]
    fn leaving_last_member_drops_channel() {
        let routes = VoiceRoutes::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        routes.join(4, 1, tx1);
        routes.join(4, 2, tx2);

        routes.leave(4, 1);
        assert_eq!(routes.member_count(4), 1);
        routes.leave(4, 2);
        assert_eq!(routes.member_count(4), 0);
        assert!(routes.channels.is_empty());
    }
}
