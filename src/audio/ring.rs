//! Single-producer/single-consumer ring buffer for interleaved audio
//! samples (§3, §4.6). Sized 8192 samples; overwrite-on-full, because
//! audio is a loss-tolerant live stream, not a reliable queue.

use parking_lot::Mutex;
use std::collections::VecDeque;

pub const RING_CAPACITY: usize = 8192;

pub struct AudioRing {
    inner: Mutex<VecDeque<f32>>,
    capacity: usize,
}

impl AudioRing {
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)), capacity: RING_CAPACITY }
    }

    /// Producer side: write interleaved samples, dropping the oldest
    /// samples if the ring is full.
    pub fn push(&self, samples: &[f32]) {
        let mut buf = self.inner.lock();
        for &s in samples {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(s);
        }
    }

    /// Consumer side: drain up to `max` samples in FIFO order.
    pub fn drain_up_to(&self, max: usize) -> Vec<f32> {
        let mut buf = self.inner.lock();
        let n = max.min(buf.len());
        buf.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all buffered samples (§4.7: "drain rings" on last-peer-leaves).
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for AudioRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let ring = AudioRing::new();
        ring.push(&[1.0, 2.0, 3.0]);
        assert_eq!(ring.drain_up_to(2), vec![1.0, 2.0]);
        assert_eq!(ring.drain_up_to(10), vec![3.0]);
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let ring = AudioRing::new();
        let filler = vec![0.0f32; RING_CAPACITY];
        ring.push(&filler);
        ring.push(&[42.0]);
        assert_eq!(ring.len(), RING_CAPACITY);
        let drained = ring.drain_up_to(RING_CAPACITY);
        assert_eq!(*drained.last().unwrap(), 42.0);
    }

    #[test]
    fn clear_empties_ring() {
        let ring = AudioRing::new();
        ring.push(&[1.0, 2.0]);
        ring.clear();
        assert!(ring.is_empty());
    }
}
