//! Whole-frame JPEG encoding using turbojpeg (§6: `encode_jpeg`).
//!
//! An empty output vector is the caller's signal for "encode failure,
//! drop this frame" (§7 `EncodeError`), matching turbojpeg's own
//! fallibility without threading a `Result` through the hot path.

use crate::capture::RawImage;
use log::warn;
use parking_lot::Mutex;
use turbojpeg::{Compressor, PixelFormat, Subsamp};

/// Encode `image` as a JPEG at `quality` (0.0-1.0, mapped onto
/// turbojpeg's 1-100 scale). Returns an empty `Vec` on failure.
pub fn encode_jpeg(image: &RawImage, quality: f32) -> Vec<u8> {
    let mut compressor = match Compressor::new() {
        Ok(c) => c,
        Err(err) => {
            warn!("turbojpeg compressor init failed: {}", err);
            return Vec::new();
        }
    };
    encode_with(&mut compressor, image, quality)
}

fn encode_with(compressor: &mut Compressor, image: &RawImage, quality: f32) -> Vec<u8> {
    let q = (quality.clamp(0.0, 1.0) * 100.0).round() as i32;
    compressor.set_quality(q.clamp(1, 100));
    compressor.set_subsamp(Subsamp::Sub2x2);

    let tj_image = turbojpeg::Image {
        pixels: image.pixels.as_slice(),
        width: image.width as usize,
        pitch: image.stride as usize,
        height: image.height as usize,
        format: PixelFormat::RGB,
    };

    match compressor.compress_to_vec(tj_image) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("jpeg encode failed: {}", err);
            Vec::new()
        }
    }
}

/// A reusable JPEG encoder. Holding on to the `Compressor` avoids
/// re-initializing turbojpeg's internal state on every tick.
pub struct JpegEncoder {
    compressor: Mutex<Compressor>,
}

impl JpegEncoder {
    pub fn new() -> Result<Self, crate::error::EncodeError> {
        let compressor =
            Compressor::new().map_err(|e| crate::error::EncodeError::Failed(e.to_string()))?;
        Ok(Self { compressor: Mutex::new(compressor) })
    }

    pub fn encode(&self, image: &RawImage, quality: f32) -> Vec<u8> {
        let mut compressor = self.compressor.lock();
        encode_with(&mut compressor, image, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_solid_fill_to_nonempty_jpeg() {
        let image = RawImage::solid_fill(16, 16, [200, 50, 50]);
        let bytes = encode_jpeg(&image, 0.5);
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]); // JPEG SOI marker
    }

    #[test]
    fn quality_clamped_to_valid_range() {
        let image = RawImage::solid_fill(8, 8, [1, 2, 3]);
        assert!(!encode_jpeg(&image, -1.0).is_empty());
        assert!(!encode_jpeg(&image, 2.0).is_empty());
    }
}
