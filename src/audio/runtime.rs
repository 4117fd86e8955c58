//! Injected audio capture primitive (§6) and the default `cpal`-backed
//! implementation of it.

use super::ring::AudioRing;
use crate::error::AudioError;
use log::{error, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A running capture stream. Dropping it stops capture.
pub trait AudioStreamHandle: Send {}

/// Injected audio capture primitive. `start` registers a callback
/// invoked on the capture thread with interleaved float samples; the
/// callback must never block (it only writes into the SPSC ring).
pub trait AudioTap: Send + Sync {
    fn start(&self, ring: Arc<AudioRing>) -> Result<Box<dyn AudioStreamHandle>, AudioError>;
    fn format(&self) -> AudioFormat;
}

struct NoopHandle;
impl AudioStreamHandle for NoopHandle {}

/// `cpal`-backed default input tap. Falls back to the default output
/// device (monitor/loopback) once if the default input device is
/// unavailable (§4.6, §7 `AudioInitFailure`).
pub struct CpalAudioTap {
    format: AudioFormat,
}

impl CpalAudioTap {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { format: AudioFormat { sample_rate, channels } }
    }
}

#[cfg(feature = "audio")]
impl AudioTap for CpalAudioTap {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&self, ring: Arc<AudioRing>) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = match host.default_input_device() {
            Some(d) => d,
            None => {
                warn!("no default audio input device, attempting output-mixer fallback");
                host.default_output_device()
                    .ok_or_else(|| AudioError::InitFailed("no input or output device".into()))?
            }
        };

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::InitFailed(e.to_string()))?;

        let err_fn = |err| error!("audio stream error: {:?}", err);
        let ring_for_stream = ring.clone();
        let stream = device
            .build_input_stream(
                &config.config(),
                move |data: &[f32], _| ring_for_stream.push(data),
                err_fn,
                None,
            )
            .map_err(|e| AudioError::InitFailed(e.to_string()))?;

        stream.play().map_err(|e| AudioError::InitFailed(e.to_string()))?;
        info!("audio capture started: {} Hz", config.sample_rate().0);

        struct CpalHandle {
            _stream: cpal::Stream,
        }
        impl AudioStreamHandle for CpalHandle {}
        Ok(Box::new(CpalHandle { _stream: stream }))
    }
}

#[cfg(not(feature = "audio"))]
impl AudioTap for CpalAudioTap {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&self, _ring: Arc<AudioRing>) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        Err(AudioError::InitFailed("built without the `audio` feature".into()))
    }
}

/// Always-fails tap, used when `DISABLE_AUDIO=1` or in tests.
pub struct NullAudioTap {
    format: AudioFormat,
}

impl NullAudioTap {
    pub fn new() -> Self {
        Self { format: AudioFormat { sample_rate: 48_000, channels: 2 } }
    }
}

impl Default for NullAudioTap {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTap for NullAudioTap {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&self, _ring: Arc<AudioRing>) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        Ok(Box::new(NoopHandle))
    }
}
