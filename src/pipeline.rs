//! Capture-encode-send pipeline (§4.2): one video frame per tick,
//! fanned out to every connected peer.

use crate::capture::{fallback, Capturer, RawImage};
use crate::connection::ConnectionSet;
use crate::controller::ThermalState;
use crate::encode::JpegEncoder;
use crate::protocol::{self, codec, StatusJson};
use crate::stream_config::{new_perf_window, SampleRing, StreamConfig};
use log::warn;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CAPTURE_DEADLINE: Duration = Duration::from_millis(500);

/// Guard inputs checked at the top of every tick (§4.2 step 2).
#[derive(Debug, Clone, Copy)]
pub struct GuardState {
    pub thermal: ThermalState,
    pub memory_warning_count: u32,
}

pub struct Pipeline {
    capturer: Arc<dyn Capturer>,
    encoder: Arc<JpegEncoder>,
    connections: Arc<ConnectionSet>,
    perf_window: Mutex<SampleRing>,
    dropped_frames: AtomicU32,
    in_flight: AtomicBool,
}

impl Pipeline {
    pub fn new(capturer: Arc<dyn Capturer>, encoder: Arc<JpegEncoder>, connections: Arc<ConnectionSet>) -> Self {
        Self {
            capturer,
            encoder,
            connections,
            perf_window: Mutex::new(new_perf_window()),
            dropped_frames: AtomicU32::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn dropped_frames(&self) -> u32 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn reset_dropped_frames(&self) {
        self.dropped_frames.store(0, Ordering::Relaxed);
    }

    pub fn avg_frame_time(&self) -> Duration {
        Duration::from_secs_f64(self.perf_window.lock().mean())
    }

    /// Run one tick. `estimated_rtt_ms`/`audio_latency_ms` feed the
    /// status JSON; `guard` gates the tick before any capture work.
    pub async fn tick(&self, cfg: &StreamConfig, guard: GuardState, estimated_rtt_ms: i32, audio_latency_ms: i32) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let t_start = Instant::now();

        if guard.thermal.is_throttling() || guard.memory_warning_count > 2 {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            self.perf_window.lock().push(t_start.elapsed().as_secs_f64());
            self.in_flight.store(false, Ordering::Release);
            return;
        }

        let scaled_size = (
            (1920.0 * cfg.output_scale.clamp(0.30, 1.00)) as u32,
            (1080.0 * cfg.output_scale.clamp(0.30, 1.00)) as u32,
        );

        let image = match tokio::time::timeout(
            CAPTURE_DEADLINE,
            self.capturer.capture(cfg.capture_target, scaled_size, true),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("capture failed, using fallback image: {}", e);
                fallback_raw_image(cfg)
            }
            Err(_) => {
                warn!("capture exceeded 500ms deadline, using fallback image");
                fallback_raw_image(cfg)
            }
        };

        let jpeg = self.encoder.encode(&image, cfg.image_quality);
        if jpeg.is_empty() {
            warn!("encoder produced an empty buffer, dropping this frame for all peers");
            self.perf_window.lock().push(t_start.elapsed().as_secs_f64());
            self.in_flight.store(false, Ordering::Release);
            return;
        }
        let jpeg = protocol::pad_image(jpeg);

        let status = StatusJson {
            fps: cfg.fps_target as i32,
            quality: (cfg.image_quality * 100.0).round() as i32,
            latency: estimated_rtt_ms,
            audio_enabled: cfg.audio_enabled,
            audio_latency: audio_latency_ms,
        };
        let frame_bytes = codec::encode_video_frame(&status, &jpeg);
        self.connections.fan_out(&frame_bytes);

        let elapsed = t_start.elapsed();
        self.perf_window.lock().push(elapsed.as_secs_f64());
        self.in_flight.store(false, Ordering::Release);
    }
}

fn fallback_raw_image(cfg: &StreamConfig) -> RawImage {
    let (w, h, pixels) = fallback::render_fallback(cfg.fps_target, (cfg.image_quality * 100.0).round() as i32, cfg.audio_enabled);
    RawImage { width: w, height: h, stride: w * 3, pixels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NullCapturer;
    use crate::connection::ConnectionSet;
    use crate::stream_config::UserMode;

    #[tokio::test]
    async fn falls_back_when_capturer_errors() {
        let pipeline = Pipeline::new(
            Arc::new(NullCapturer),
            Arc::new(JpegEncoder::new().expect("turbojpeg available")),
            Arc::new(ConnectionSet::new()),
        );
        let cfg = StreamConfig::from_mode(UserMode::Balanced);
        let guard = GuardState { thermal: ThermalState::Nominal, memory_warning_count: 0 };
        pipeline.tick(&cfg, guard, 10, 10).await;
        assert_eq!(pipeline.dropped_frames(), 0);
        assert!(pipeline.avg_frame_time() >= Duration::ZERO);
    }

    #[tokio::test]
    async fn concurrent_tick_increments_dropped_frames() {
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(NullCapturer),
            Arc::new(JpegEncoder::new().expect("turbojpeg available")),
            Arc::new(ConnectionSet::new()),
        ));
        pipeline.in_flight.store(true, Ordering::Release);
        let cfg = StreamConfig::from_mode(UserMode::Balanced);
        let guard = GuardState { thermal: ThermalState::Nominal, memory_warning_count: 0 };
        pipeline.tick(&cfg, guard, 10, 10).await;
        assert_eq!(pipeline.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn thermal_guard_drops_without_capturing() {
        let pipeline = Pipeline::new(
            Arc::new(NullCapturer),
            Arc::new(JpegEncoder::new().expect("turbojpeg available")),
            Arc::new(ConnectionSet::new()),
        );
        let cfg = StreamConfig::from_mode(UserMode::Balanced);
        let guard = GuardState { thermal: ThermalState::Critical, memory_warning_count: 0 };
        pipeline.tick(&cfg, guard, 10, 10).await;
        assert_eq!(pipeline.dropped_frames(), 1);
    }
}
