//! Audio capture and encoding pipeline (§4.6).
//!
//! Capture is injected (`AudioTap`) and writes into a lock-free-ish
//! SPSC ring (`AudioRing`); a periodic flush task drains the ring,
//! scales by the current audio quality, converts to clipped int16 PCM,
//! and hands the encoded wire bytes to its caller for fan-out as a
//! `0xFA` packet.

pub mod ring;
pub mod runtime;

pub use ring::AudioRing;
pub use runtime::{AudioFormat, AudioStreamHandle, AudioTap, CpalAudioTap, NullAudioTap};

use crate::error::AudioError;
use crate::protocol::{codec, AudioInfoJson};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Samples drained per flush, matching a ~20ms tick at 48kHz stereo.
pub const FLUSH_BUFFER_SIZE: usize = 1024;
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(20);

/// Owns the capture tap and ring, and produces ready-to-send audio
/// packets. Two independent flags gate flushing: `failed` is permanent
/// (§7 `AudioInitFailure`, set once capture fails to initialize, never
/// cleared) while `stopped` is the reversible "no session currently
/// streaming" state toggled by `stop()`/`start()` across §4.7's
/// Streaming/Listening transitions.
pub struct AudioPipeline {
    ring: Arc<AudioRing>,
    tap: Box<dyn AudioTap>,
    handle: parking_lot::Mutex<Option<Box<dyn AudioStreamHandle>>>,
    failed: AtomicBool,
    stopped: AtomicBool,
}

impl AudioPipeline {
    pub fn new(tap: Box<dyn AudioTap>) -> Self {
        Self {
            ring: Arc::new(AudioRing::new()),
            tap,
            handle: parking_lot::Mutex::new(None),
            failed: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
        }
    }

    /// True while flushing should be skipped, whether because capture
    /// permanently failed or because no session is currently streaming.
    pub fn is_disabled(&self) -> bool {
        self.failed.load(Ordering::Relaxed) || self.stopped.load(Ordering::Relaxed)
    }

    /// True only once capture has permanently failed to initialize
    /// (§7 `AudioInitFailure`); unlike [`is_disabled`], this does not
    /// report the ordinary "no peers attached" state.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Permanently disable audio for the remainder of the process
    /// session; there is no retry (§7 `AudioInitFailure`).
    fn fail(&self) {
        self.failed.store(true, Ordering::Relaxed);
        *self.handle.lock() = None;
        self.drain_stale();
    }

    /// Reversible stop: last peer left (§4.7 Streaming -> Listening).
    /// Capture resumes on the next `start()` unless `failed`.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        *self.handle.lock() = None;
        self.drain_stale();
    }

    /// Start the capture stream. On failure, audio is permanently
    /// disabled and the error is returned for logging; callers must not
    /// retry. On success, clears the reversible `stopped` flag so a
    /// later session resumes capture.
    pub fn start(&self) -> Result<(), AudioError> {
        if self.is_failed() {
            return Err(AudioError::Disabled);
        }
        match self.tap.start(self.ring.clone()) {
            Ok(h) => {
                *self.handle.lock() = Some(h);
                self.stopped.store(false, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Drain one flush's worth of samples, apply quality scaling, and
    /// encode as wire-ready `0xFA` bytes. Returns `None` if disabled or
    /// the ring has nothing buffered.
    pub fn flush(&self, audio_quality: f32, timestamp: f64) -> Option<Vec<u8>> {
        if self.is_disabled() {
            return None;
        }
        let samples = self.ring.drain_up_to(FLUSH_BUFFER_SIZE);
        if samples.is_empty() {
            return None;
        }

        let pcm = samples_to_int16(&samples, audio_quality);
        let format = self.tap.format();
        let frames = samples.len() / format.channels.max(1) as usize;
        let info = AudioInfoJson::new(format.sample_rate, format.channels, frames, audio_quality, timestamp);
        Some(codec::encode_audio_packet(&info, &pcm))
    }

    /// Drop any buffered-but-unflushed samples (§4.7: last peer leaves).
    pub fn drain_stale(&self) {
        self.ring.clear();
    }
}

/// Scale by `quality` and convert to little-endian int16 bytes,
/// clipping to the valid i16 range rather than wrapping.
fn samples_to_int16(samples: &[f32], quality: f32) -> Vec<u8> {
    let q = quality.clamp(0.0, 1.0);
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let scaled = (s * q * 32767.0).clamp(-32767.0, 32767.0);
        out.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_returns_none_before_start() {
        let pipeline = AudioPipeline::new(Box::new(NullAudioTap::new()));
        pipeline.ring.push(&[0.5, 0.5]);
        assert!(pipeline.flush(1.0, 0.0).is_none());
    }

    #[test]
    fn flush_returns_none_when_empty() {
        let pipeline = AudioPipeline::new(Box::new(NullAudioTap::new()));
        pipeline.start().unwrap();
        assert!(pipeline.flush(1.0, 0.0).is_none());
    }

    #[test]
    fn flush_returns_none_once_failed() {
        let pipeline = AudioPipeline::new(Box::new(NullAudioTap::new()));
        pipeline.start().unwrap();
        pipeline.ring.push(&[0.5, 0.5]);
        pipeline.fail();
        assert!(pipeline.flush(1.0, 0.0).is_none());
    }

    #[test]
    fn stop_then_start_resumes_flushing() {
        let pipeline = AudioPipeline::new(Box::new(NullAudioTap::new()));
        pipeline.start().unwrap();
        pipeline.stop();
        pipeline.ring.push(&[0.5, 0.5]);
        assert!(pipeline.flush(1.0, 0.0).is_none(), "still stopped, no session streaming");
        pipeline.start().unwrap();
        pipeline.ring.push(&[0.5, 0.5]);
        assert!(pipeline.flush(1.0, 0.0).is_some(), "resumed after restart");
    }

    #[test]
    fn flush_encodes_available_samples() {
        let pipeline = AudioPipeline::new(Box::new(NullAudioTap::new()));
        pipeline.start().unwrap();
        pipeline.ring.push(&[0.5; 4]);
        let bytes = pipeline.flush(1.0, 1.0).expect("samples were buffered");
        assert_eq!(bytes[0], crate::protocol::TAG_AUDIO);
    }

    #[test]
    fn info_samples_field_is_frames_not_interleaved_count() {
        let pipeline = AudioPipeline::new(Box::new(NullAudioTap::new()));
        pipeline.start().unwrap();
        pipeline.ring.push(&[0.1, 0.2, 0.3, 0.4]); // 4 interleaved, 2 channels -> 2 frames
        let bytes = pipeline.flush(1.0, 0.0).expect("samples were buffered");
        let mut dec = codec::FrameDecoder::new(codec::Direction::ServerToClient);
        dec.extend(&bytes);
        match dec.next_packet().unwrap().unwrap() {
            codec::Decoded::Packet(crate::protocol::Packet::AudioPacket { info, .. }) => {
                assert_eq!(info.samples, 2);
            }
            _ => panic!("expected audio packet"),
        }
    }

    #[test]
    fn int16_scaling_clips_rather_than_wraps() {
        let bytes = samples_to_int16(&[2.0, -2.0], 1.0);
        let a = i16::from_le_bytes([bytes[0], bytes[1]]);
        let b = i16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(a, 32767);
        assert_eq!(b, -32767);
    }

    #[test]
    fn quality_scales_amplitude_down() {
        let full = samples_to_int16(&[1.0], 1.0);
        let half = samples_to_int16(&[1.0], 0.5);
        let full_v = i16::from_le_bytes([full[0], full[1]]);
        let half_v = i16::from_le_bytes([half[0], half[1]]);
        assert!(half_v < full_v);
    }
}
