//! Deterministic fallback image emitted when capture fails (§4.2).
//!
//! 640x480, solid blue fill, centered status text, so a receiver can
//! tell "server running but degraded" from "server disconnected".

use super::bitmap_font::{draw_text, text_width};
use image::RgbImage;

const FALLBACK_WIDTH: u32 = 640;
const FALLBACK_HEIGHT: u32 = 480;
const FALLBACK_FILL: [u8; 3] = [30, 80, 200];
const GLYPH_SCALE: u32 = 4;
const LINE_HEIGHT: i32 = 48;

/// Render the fallback frame's pixels (RGB, tightly packed rows).
pub fn render_fallback(fps: u32, quality_percent: i32, audio_enabled: bool) -> (u32, u32, Vec<u8>) {
    let mut img = RgbImage::from_pixel(FALLBACK_WIDTH, FALLBACK_HEIGHT, image::Rgb(FALLBACK_FILL));
    let buf = img.as_flat_samples_mut().samples;

    let lines = [
        "Mac Screen Mirroring".to_string(),
        format!("FPS: {}", fps),
        format!("Quality: {}%", quality_percent),
        format!("Audio: {}", if audio_enabled { "ON" } else { "OFF" }),
    ];

    let start_y = (FALLBACK_HEIGHT as i32 - lines.len() as i32 * LINE_HEIGHT) / 2;
    for (i, line) in lines.iter().enumerate() {
        let w = text_width(line, GLYPH_SCALE) as i32;
        let x = ((FALLBACK_WIDTH as i32 - w) / 2).max(0);
        let y = start_y + i as i32 * LINE_HEIGHT;
        draw_text(buf, FALLBACK_WIDTH, FALLBACK_HEIGHT, x, y, GLYPH_SCALE, [255, 255, 255], line);
    }

    (FALLBACK_WIDTH, FALLBACK_HEIGHT, img.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_expected_size() {
        let (w, h, pixels) = render_fallback(30, 50, true);
        assert_eq!(w, FALLBACK_WIDTH);
        assert_eq!(h, FALLBACK_HEIGHT);
        assert_eq!(pixels.len(), (w * h * 3) as usize);
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = render_fallback(45, 30, false);
        let b = render_fallback(45, 30, false);
        assert_eq!(a.2, b.2);
    }

    #[test]
    fn fallback_text_is_visible_against_fill() {
        let (_, _, pixels) = render_fallback(30, 50, true);
        let white_pixels = pixels.chunks_exact(3).filter(|p| p == &[255, 255, 255]).count();
        assert!(white_pixels > 0, "expected some white text pixels over the blue fill");
    }
}
