//! Mutable stream configuration, user-mode setpoints, and the ring
//! buffers the controller reads from (§3).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserMode {
    Performance,
    Balanced,
    Fidelity,
}

impl UserMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Performance" => Some(UserMode::Performance),
            "Balanced" => Some(UserMode::Balanced),
            "Fidelity" => Some(UserMode::Fidelity),
            _ => None,
        }
    }

    /// (fps, quality, max_frame_time) setpoint row, §3.
    pub fn setpoint(self) -> (u32, f32, Duration) {
        match self {
            UserMode::Performance => (45, 0.30, Duration::from_secs_f64(1.0 / 30.0)),
            UserMode::Balanced => (30, 0.50, Duration::from_secs_f64(1.0 / 25.0)),
            UserMode::Fidelity => (20, 0.70, Duration::from_secs_f64(1.0 / 15.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTarget {
    FullDisplay { display_id: u32 },
    SingleWindow { window_id: u32 },
}

impl Default for CaptureTarget {
    fn default() -> Self {
        CaptureTarget::FullDisplay { display_id: 0 }
    }
}

/// Mutable per-stream settings, written by the controller and by
/// inbound client settings, read every tick by capture/audio (§3).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub fps_target: u32,
    pub image_quality: f32,
    pub output_scale: f32,
    pub audio_quality: f32,
    pub audio_enabled: bool,
    pub capture_target: CaptureTarget,
    pub user_mode: UserMode,
    pub max_frame_time: Duration,
}

impl StreamConfig {
    pub fn from_mode(mode: UserMode) -> Self {
        let (fps, quality, max_frame_time) = mode.setpoint();
        Self {
            fps_target: fps,
            image_quality: quality,
            output_scale: 0.50,
            audio_quality: 0.70,
            audio_enabled: true,
            capture_target: CaptureTarget::default(),
            user_mode: mode,
            max_frame_time,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps_target.max(1) as f64)
    }

    pub fn clamp(&mut self) {
        self.fps_target = self.fps_target.clamp(10, 60);
        self.image_quality = self.image_quality.clamp(0.20, 0.80);
        self.output_scale = self.output_scale.clamp(0.30, 1.00);
        self.audio_quality = self.audio_quality.clamp(0.10, 1.00);
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_mode(UserMode::Balanced)
    }
}

/// Fixed-capacity ring of sample values whose mean is read on demand.
/// Oldest sample is dropped once capacity is reached.
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Last 60 frame-process durations (§3).
pub fn new_perf_window() -> SampleRing {
    SampleRing::new(60)
}

/// Last 30 round-trip samples (§3, §4.5).
pub fn new_rtt_window() -> SampleRing {
    SampleRing::new(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setpoints_match_table() {
        assert_eq!(UserMode::Performance.setpoint().0, 45);
        assert_eq!(UserMode::Balanced.setpoint().0, 30);
        assert_eq!(UserMode::Fidelity.setpoint().0, 20);
    }

    #[test]
    fn clamp_enforces_bounds() {
        let mut cfg = StreamConfig::default();
        cfg.fps_target = 999;
        cfg.image_quality = 5.0;
        cfg.output_scale = -1.0;
        cfg.audio_quality = 10.0;
        cfg.clamp();
        assert_eq!(cfg.fps_target, 60);
        assert_eq!(cfg.image_quality, 0.80);
        assert_eq!(cfg.output_scale, 0.30);
        assert_eq!(cfg.audio_quality, 1.00);
    }

    #[test]
    fn sample_ring_drops_oldest() {
        let mut ring = SampleRing::new(3);
        ring.push(1.0);
        ring.push(2.0);
        ring.push(3.0);
        ring.push(4.0);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.mean(), (2.0 + 3.0 + 4.0) / 3.0);
    }
}
