//! The raw pixel buffer handed back by the capture primitive.

use std::fmt;

/// Raw RGB pixels captured for one tick. `stride` is the row pitch in
/// bytes (may exceed `width * 3` if the source pads rows).
#[derive(Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn solid_fill(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let stride = width * 3;
        let mut pixels = Vec::with_capacity((stride * height) as usize);
        for _ in 0..(width * height) {
            pixels.extend_from_slice(&rgb);
        }
        Self { width, height, stride, pixels }
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_fill_has_expected_size() {
        let img = RawImage::solid_fill(4, 2, [10, 20, 30]);
        assert_eq!(img.pixels.len(), 4 * 2 * 3);
        assert_eq!(&img.pixels[0..3], &[10, 20, 30]);
    }
}
