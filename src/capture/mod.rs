//! Screen/window capture abstraction.
//!
//! The actual capture primitive (grabbing pixels off a display or
//! window) is an injected collaborator (§6) — this module only defines
//! the interface it must satisfy, the raw image it hands back, and the
//! deterministic fallback frame emitted when capture is unavailable.

mod bitmap_font;
pub mod fallback;
pub mod frame;

pub use frame::RawImage;

use crate::error::CaptureError;
use crate::stream_config::CaptureTarget;
use async_trait::async_trait;

/// Injected screen/window capture primitive (§6).
///
/// Implementations must not retain pixel memory across calls: each
/// `capture` call returns a freshly allocated buffer.
#[async_trait]
pub trait Capturer: Send + Sync {
    async fn capture(
        &self,
        target: CaptureTarget,
        scaled_size: (u32, u32),
        cursor: bool,
    ) -> Result<RawImage, CaptureError>;
}

/// A capturer that always fails; used in tests and as a baseline for
/// exercising the fallback-image path.
pub struct NullCapturer;

#[async_trait]
impl Capturer for NullCapturer {
    async fn capture(
        &self,
        _target: CaptureTarget,
        _scaled_size: (u32, u32),
        _cursor: bool,
    ) -> Result<RawImage, CaptureError> {
        Err(CaptureError::Unavailable)
    }
}
