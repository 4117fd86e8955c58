//! Adaptive quality controller (§4.3): a closed-loop regulator over
//! frame rate, image quality, output scale, and audio quality.

use crate::stream_config::StreamConfig;
use log::debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const MIN_QUALITY: f32 = 0.20;
pub const LATENCY_THRESHOLD_MS: f64 = 40.0;
const MEMORY_WARNING_THRESHOLD_BYTES: u64 = 400 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalState {
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    pub fn is_throttling(self) -> bool {
        matches!(self, ThermalState::Serious | ThermalState::Critical)
    }
}

/// Inputs sampled once per controller evaluation (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct ControllerInputs {
    pub avg_frame_time: Duration,
    pub dropped_frames: u32,
    pub estimated_rtt: Duration,
    pub thermal: ThermalState,
}

/// Ceiling on `image_quality` that user mode may raise (§4.3 constants).
fn max_quality_for(mode: crate::stream_config::UserMode) -> f32 {
    match mode {
        crate::stream_config::UserMode::Fidelity => 0.70,
        _ => 0.60,
    }
}

pub struct AdaptiveController {
    memory_warning_count: AtomicU32,
}

impl AdaptiveController {
    pub fn new() -> Self {
        Self { memory_warning_count: AtomicU32::new(0) }
    }

    /// Apply the first matching action rule (§4.3). `user_setpoint` is
    /// the `(fps, quality)` the current `user_mode` was created from —
    /// not the (possibly degraded) live config — so rebounds have a
    /// ceiling to climb back toward.
    pub fn evaluate(&self, cfg: &mut StreamConfig, inputs: ControllerInputs, user_setpoint: (u32, f32)) {
        let (user_fps, user_quality) = user_setpoint;
        let rtt_ms = inputs.estimated_rtt.as_secs_f64() * 1000.0;
        let max_frame_time = cfg.max_frame_time;

        let degrade = (inputs.avg_frame_time > max_frame_time.mul_f64(1.5) || inputs.dropped_frames > 5)
            && rtt_ms > 60.0;
        if degrade {
            if cfg.image_quality > MIN_QUALITY + 0.10 {
                cfg.image_quality -= 0.05;
            } else if cfg.fps_target > user_fps.saturating_sub(8).max(10) {
                cfg.fps_target -= 1;
            } else if cfg.audio_quality > 0.40 {
                cfg.audio_quality -= 0.10;
            }
            cfg.clamp();
            return;
        }

        let rebound = inputs.avg_frame_time < max_frame_time.mul_f64(0.5)
            && inputs.dropped_frames == 0
            && rtt_ms < LATENCY_THRESHOLD_MS * 0.6;
        if rebound {
            if cfg.fps_target < user_fps {
                cfg.fps_target += 1;
            }
            if cfg.image_quality < user_quality {
                cfg.image_quality += 0.03;
            }
            if cfg.audio_quality < 0.80 {
                cfg.audio_quality += 0.05;
            }
            cfg.clamp();
        }
    }

    /// Independent memory-guard track, own 3s cadence (§4.3).
    pub fn evaluate_memory(&self, cfg: &mut StreamConfig, memory_bytes: u64) {
        if memory_bytes > MEMORY_WARNING_THRESHOLD_BYTES {
            let warnings = self.memory_warning_count.fetch_add(1, Ordering::Relaxed) + 1;
            if warnings > 2 {
                cfg.image_quality = (cfg.image_quality - 0.05).max(0.20);
            } else if cfg.fps_target > 15 {
                cfg.fps_target = cfg.fps_target.saturating_sub(2).max(15);
            } else {
                cfg.audio_quality = (cfg.audio_quality - 0.10).max(0.40);
            }
            debug!("memory guard: {} warnings, memory={}B", warnings, memory_bytes);
        } else {
            let _ = self.memory_warning_count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |w| {
                Some(w.saturating_sub(1))
            });
        }
        cfg.clamp();
    }

    pub fn memory_warning_count(&self) -> u32 {
        self.memory_warning_count.load(Ordering::Relaxed)
    }

    pub fn quality_ceiling(&self, mode: crate::stream_config::UserMode) -> f32 {
        max_quality_for(mode)
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new()
    }
}

/// Output-scale sub-rule, computed per capture tick rather than by the
/// controller (§4.3).
pub fn compute_output_scale(avg_frame_time: Duration, target_frame_time: Duration, estimated_rtt_ms: f64) -> f32 {
    let performance_ratio = if avg_frame_time.as_secs_f64() > 0.0 {
        target_frame_time.as_secs_f64() / avg_frame_time.as_secs_f64()
    } else {
        1.0
    };
    let latency_factor = if estimated_rtt_ms > 0.0 {
        (LATENCY_THRESHOLD_MS / estimated_rtt_ms).min(1.0)
    } else {
        1.0
    };
    let combined = (performance_ratio + latency_factor) / 2.0;
    if combined < 0.6 {
        0.30
    } else if combined < 0.8 {
        0.40
    } else if combined > 1.3 {
        0.70
    } else {
        0.50
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_config::{StreamConfig, UserMode};

    #[test]
    fn degrades_quality_first_under_sustained_pressure() {
        let controller = AdaptiveController::new();
        let mut cfg = StreamConfig::from_mode(UserMode::Balanced);
        let setpoint = (cfg.fps_target, cfg.image_quality);
        let inputs = ControllerInputs {
            avg_frame_time: cfg.max_frame_time.mul_f64(2.0),
            dropped_frames: 0,
            estimated_rtt: Duration::from_millis(80),
            thermal: ThermalState::Nominal,
        };
        let before = cfg.image_quality;
        controller.evaluate(&mut cfg, inputs, setpoint);
        assert!(cfg.image_quality < before);
    }

    #[test]
    fn converges_within_ten_evaluations() {
        let controller = AdaptiveController::new();
        let mut cfg = StreamConfig::from_mode(UserMode::Balanced);
        let setpoint = (cfg.fps_target, cfg.image_quality);
        let inputs = ControllerInputs {
            avg_frame_time: cfg.max_frame_time.mul_f64(2.0),
            dropped_frames: 0,
            estimated_rtt: Duration::from_millis(80),
            thermal: ThermalState::Nominal,
        };
        for _ in 0..10 {
            controller.evaluate(&mut cfg, inputs, setpoint);
        }
        assert!(cfg.image_quality <= MIN_QUALITY + 0.10 || cfg.fps_target <= setpoint.0.saturating_sub(8).max(10));
    }

    #[test]
    fn rebounds_toward_setpoint_once_pressure_removed() {
        let controller = AdaptiveController::new();
        let mut cfg = StreamConfig::from_mode(UserMode::Balanced);
        let setpoint = (cfg.fps_target, cfg.image_quality);
        let pressure = ControllerInputs {
            avg_frame_time: cfg.max_frame_time.mul_f64(2.0),
            dropped_frames: 0,
            estimated_rtt: Duration::from_millis(80),
            thermal: ThermalState::Nominal,
        };
        for _ in 0..10 {
            controller.evaluate(&mut cfg, pressure, setpoint);
        }
        let slack = ControllerInputs {
            avg_frame_time: cfg.max_frame_time.mul_f64(0.1),
            dropped_frames: 0,
            estimated_rtt: Duration::from_millis(5),
            thermal: ThermalState::Nominal,
        };
        for _ in 0..30 {
            controller.evaluate(&mut cfg, slack, setpoint);
        }
        assert!((cfg.image_quality - setpoint.1).abs() <= 0.03);
        assert!((cfg.fps_target as i32 - setpoint.0 as i32).abs() <= 1);
    }

    #[test]
    fn memory_guard_escalates_with_repeated_warnings() {
        let controller = AdaptiveController::new();
        let mut cfg = StreamConfig::from_mode(UserMode::Balanced);
        for _ in 0..3 {
            controller.evaluate_memory(&mut cfg, 500 * 1024 * 1024);
        }
        assert!(controller.memory_warning_count() >= 3);
    }

    #[test]
    fn output_scale_maps_combined_ranges() {
        let target = Duration::from_millis(40);
        assert_eq!(compute_output_scale(Duration::from_millis(200), target, 200.0), 0.30);
        assert_eq!(compute_output_scale(Duration::from_millis(20), target, 10.0), 0.70);
    }
}
