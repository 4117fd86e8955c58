//! Peer set, fan-out, and per-peer backpressure (§3, §4.4).

pub mod rtt;

pub use rtt::RttEstimator;

use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Per-peer outbound backlog bound (§4.4). A reasonable default; frames
/// for a peer over this are dropped rather than queued.
pub const HIGH_WATER_MARK_BYTES: usize = 4 * 1024 * 1024;

/// Opaque, process-local handle minted on accept, discarded on
/// disconnect. Never serialized (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(u64);

/// Fanned-out frames are reference-counted so one encode is shared
/// across every peer's queue instead of being copied per peer.
pub type OutboundSender = mpsc::UnboundedSender<Bytes>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Bytes>;

struct Peer {
    created_at: Instant,
    last_frame_sent_at: Mutex<Option<Instant>>,
    send_errors: AtomicU32,
    backlog_bytes: AtomicUsize,
    outbound: OutboundSender,
}

/// The sole owner of peer handles (§3 invariant); a handle's lifetime
/// is bounded by its entry here.
pub struct ConnectionSet {
    peers: Mutex<HashMap<PeerHandle, Peer>>,
    next_id: AtomicU64,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self { peers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a newly accepted peer and return its handle plus the
    /// receiving half of its outbound queue, for the connection's write
    /// task to drain.
    pub fn insert(&self) -> (PeerHandle, OutboundReceiver) {
        let id = PeerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Peer {
            created_at: Instant::now(),
            last_frame_sent_at: Mutex::new(None),
            send_errors: AtomicU32::new(0),
            backlog_bytes: AtomicUsize::new(0),
            outbound: tx,
        };
        self.peers.lock().insert(id, peer);
        (id, rx)
    }

    pub fn remove(&self, handle: PeerHandle) {
        self.peers.lock().remove(&handle);
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fan a frame out to every peer; returns the number of peers the
    /// frame was actually queued to (the rest were over the high-water
    /// mark and had this frame dropped for them alone, §4.4). The
    /// underlying bytes are shared via refcount, not copied per peer.
    pub fn fan_out(&self, bytes: &[u8]) -> usize {
        let shared = Bytes::copy_from_slice(bytes);
        let peers = self.peers.lock();
        let mut sent = 0;
        for (handle, peer) in peers.iter() {
            let backlog = peer.backlog_bytes.load(Ordering::Relaxed);
            if backlog + shared.len() > HIGH_WATER_MARK_BYTES {
                debug!(
                    "peer {:?}: {}",
                    handle,
                    crate::error::PeerError::BacklogOverflow
                );
                continue;
            }
            if peer.outbound.send(shared.clone()).is_ok() {
                peer.backlog_bytes.fetch_add(shared.len(), Ordering::Relaxed);
                *peer.last_frame_sent_at.lock() = Some(Instant::now());
                sent += 1;
            } else {
                peer.send_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        sent
    }

    /// Called by the per-peer write task once bytes have actually been
    /// written to the socket, to release backlog credit.
    pub fn release_backlog(&self, handle: PeerHandle, bytes: usize) {
        if let Some(peer) = self.peers.lock().get(&handle) {
            peer.backlog_bytes.fetch_sub(bytes.min(peer.backlog_bytes.load(Ordering::Relaxed)), Ordering::Relaxed);
        }
    }

    pub fn mark_send_error(&self, handle: PeerHandle) {
        if let Some(peer) = self.peers.lock().get(&handle) {
            peer.send_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// An ack (`0x01`) arrived for `handle`: consume the pending send
    /// timestamp and return the elapsed RTT, or `None` if no frame was
    /// outstanding (§4.5, §8 single-sample-per-frame invariant).
    pub fn take_rtt_sample(&self, handle: PeerHandle) -> Option<Duration> {
        let peers = self.peers.lock();
        let peer = peers.get(&handle)?;
        let mut slot = peer.last_frame_sent_at.lock();
        slot.take().map(|sent_at| sent_at.elapsed())
    }

    pub fn peer_age(&self, handle: PeerHandle) -> Option<Duration> {
        self.peers.lock().get(&handle).map(|p| p.created_at.elapsed())
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_track_len() {
        let set = ConnectionSet::new();
        let (h1, _rx1) = set.insert();
        let (_h2, _rx2) = set.insert();
        assert_eq!(set.len(), 2);
        set.remove(h1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn fan_out_delivers_to_every_peer() {
        let set = ConnectionSet::new();
        let (_h1, mut rx1) = set.insert();
        let (_h2, mut rx2) = set.insert();
        let sent = set.fan_out(b"hello");
        assert_eq!(sent, 2);
        assert_eq!(&rx1.try_recv().unwrap()[..], b"hello");
        assert_eq!(&rx2.try_recv().unwrap()[..], b"hello");
    }

    #[test]
    fn fan_out_skips_peer_over_high_water_mark() {
        let set = ConnectionSet::new();
        let (h1, _rx1) = set.insert();
        {
            let peers = set.peers.lock();
            peers.get(&h1).unwrap().backlog_bytes.store(HIGH_WATER_MARK_BYTES, Ordering::Relaxed);
        }
        let sent = set.fan_out(b"frame");
        assert_eq!(sent, 0);
    }

    #[test]
    fn rtt_sample_requires_outstanding_send() {
        let set = ConnectionSet::new();
        let (h, _rx) = set.insert();
        assert!(set.take_rtt_sample(h).is_none());
        set.fan_out(b"a frame");
        assert!(set.take_rtt_sample(h).is_some());
        // second ack with no intervening frame yields no sample
        assert!(set.take_rtt_sample(h).is_none());
    }
}
