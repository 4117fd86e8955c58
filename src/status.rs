//! Read-only status snapshot for the injected UI / HTTP status endpoint
//! (§7 "user-visible surface", §9 "observable state vs message passing").

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub fps: u32,
    pub quality_percent: i32,
    pub latency_ms: i32,
    pub peer_count: u32,
    pub memory_bytes: u64,
    pub uptime_secs: u64,
    pub audio_enabled: bool,
    pub recent_error: Option<String>,
}

/// The authoritative, lock-protected status fields plus an optional
/// debounced change-notification channel (§9). Reads never block on a
/// tick; writers update atomics, readers assemble a consistent snapshot.
pub struct StatusBoard {
    started_at: Instant,
    fps: AtomicU32,
    quality_percent: AtomicI32,
    latency_ms: AtomicI32,
    peer_count: AtomicU32,
    memory_bytes: AtomicU64,
    audio_enabled: AtomicBool,
    recent_error: parking_lot::Mutex<Option<String>>,
    notify: watch::Sender<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> (std::sync::Arc<Self>, watch::Receiver<StatusSnapshot>) {
        let initial = StatusSnapshot {
            fps: 0,
            quality_percent: 0,
            latency_ms: 0,
            peer_count: 0,
            memory_bytes: 0,
            uptime_secs: 0,
            audio_enabled: false,
            recent_error: None,
        };
        let (tx, rx) = watch::channel(initial);
        let board = std::sync::Arc::new(Self {
            started_at: Instant::now(),
            fps: AtomicU32::new(0),
            quality_percent: AtomicI32::new(0),
            latency_ms: AtomicI32::new(0),
            peer_count: AtomicU32::new(0),
            memory_bytes: AtomicU64::new(0),
            audio_enabled: AtomicBool::new(false),
            recent_error: parking_lot::Mutex::new(None),
            notify: tx,
        });
        (board, rx)
    }

    pub fn update_stream(&self, fps: u32, quality_percent: i32, latency_ms: i32, audio_enabled: bool) {
        self.fps.store(fps, Ordering::Relaxed);
        self.quality_percent.store(quality_percent, Ordering::Relaxed);
        self.latency_ms.store(latency_ms, Ordering::Relaxed);
        self.audio_enabled.store(audio_enabled, Ordering::Relaxed);
        self.publish();
    }

    pub fn update_peer_count(&self, count: u32) {
        self.peer_count.store(count, Ordering::Relaxed);
        self.publish();
    }

    pub fn update_memory(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::Relaxed);
        self.publish();
    }

    pub fn record_error(&self, kind: impl Into<String>) {
        *self.recent_error.lock() = Some(kind.into());
        self.publish();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            fps: self.fps.load(Ordering::Relaxed),
            quality_percent: self.quality_percent.load(Ordering::Relaxed),
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
            peer_count: self.peer_count.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            audio_enabled: self.audio_enabled.load(Ordering::Relaxed),
            recent_error: self.recent_error.lock().clone(),
        }
    }

    /// Debounced by the `watch` channel itself: a burst of updates
    /// between reads collapses to the latest value only.
    fn publish(&self) {
        let _ = self.notify.send(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_latest_update() {
        let (board, mut rx) = StatusBoard::new();
        board.update_stream(30, 50, 12, true);
        let snap = board.snapshot();
        assert_eq!(snap.fps, 30);
        assert_eq!(snap.quality_percent, 50);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn uptime_increases_monotonically() {
        let (board, _rx) = StatusBoard::new();
        let first = board.snapshot().uptime_secs;
        assert!(board.snapshot().uptime_secs >= first);
    }
}
