use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::{Detection, Frame};

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const COUNT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const DENSITY_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const BOX_THICKNESS: u32 = 2;

/// Copy of the frame with a rectangle drawn around each detection.
pub fn annotate(frame: &Frame, dets: &[Detection]) -> RgbImage {
    let mut img = frame.image.clone();
    for d in dets {
        draw_box(&mut img, d, BOX_COLOR, BOX_THICKNESS);
    }
    img
}

fn draw_box(img: &mut RgbImage, d: &Detection, color: Rgb<u8>, thickness: u32) {
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return;
    }
    let to_px = |v: f32, max: u32| ((v.clamp(0.0, 1.0) * max as f32) as u32).min(max - 1);
    let x0 = to_px(d.cx - d.w / 2.0, w);
    let x1 = to_px(d.cx + d.w / 2.0, w);
    let y0 = to_px(d.cy - d.h / 2.0, h);
    let y1 = to_px(d.cy + d.h / 2.0, h);

    for t in 0..thickness {
        let (bw, bh) = ((x1 - x0 + 1).saturating_sub(2 * t), (y1 - y0 + 1).saturating_sub(2 * t));
        if bw == 0 || bh == 0 {
            break;
        }
        let rect = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(bw, bh);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Count and density caption written in the top-left corner of a frame.
pub struct Overlay {
    font: FontVec,
    scale: PxScale,
}

impl Overlay {
    /// Loads a TTF/OTF font; `px` is the height of the count line.
    pub fn load(font_path: impl AsRef<Path>, px: f32) -> Result<Self> {
        let path = font_path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes).with_context(|| format!("parse font {}", path.display()))?;
        Ok(Self { font, scale: PxScale::from(px) })
    }

    pub fn draw(&self, img: &mut RgbImage, persons: u32, density: f64) {
        let small = PxScale::from(self.scale.y * 0.85);
        let x = 20;
        let y = 20;
        draw_text_mut(img, COUNT_COLOR, x, y, self.scale, &self.font, &format!("Personas: {}", persons));
        let y2 = y + (self.scale.y * 1.5) as i32;
        draw_text_mut(img, DENSITY_COLOR, x, y2, small, &self.font, &format!("Densidad: {:.2} pers/m²", density));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_outline_drawn_interior_untouched() {
        let frame = Frame::from_rgb(RgbImage::new(100, 100));
        let d = Detection { class_id: 0, conf: 0.9, cx: 0.5, cy: 0.5, w: 0.4, h: 0.4 };
        let img = annotate(&frame, &[d]);

        assert_eq!(*img.get_pixel(30, 50), BOX_COLOR);
        assert_eq!(*img.get_pixel(31, 50), BOX_COLOR);
        assert_eq!(*img.get_pixel(69, 50), BOX_COLOR);
        assert_eq!(*img.get_pixel(50, 30), BOX_COLOR);
        assert_eq!(*img.get_pixel(50, 50), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(5, 5), Rgb([0, 0, 0]));
        // source frame untouched
        assert_eq!(*frame.image.get_pixel(30, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_clamped_to_image() {
        let frame = Frame::from_rgb(RgbImage::new(20, 10));
        let d = Detection { class_id: 0, conf: 0.9, cx: 1.0, cy: 1.0, w: 0.8, h: 0.8 };
        let img = annotate(&frame, &[d]);
        assert_eq!(*img.get_pixel(19, 9), BOX_COLOR);
    }

    #[test]
    fn test_degenerate_box_does_not_panic() {
        let frame = Frame::from_rgb(RgbImage::new(20, 10));
        let d = Detection { class_id: 0, conf: 0.9, cx: 0.5, cy: 0.5, w: 0.0, h: 0.0 };
        let img = annotate(&frame, &[d]);
        assert_eq!(img.dimensions(), (20, 10));
    }

    #[test]
    fn test_overlay_rejects_missing_or_invalid_font() {
        assert!(Overlay::load("/nonexistent/font.ttf", 32.0).is_err());
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), b"not a font").unwrap();
        assert!(Overlay::load(f.path(), 32.0).is_err());
    }

    #[test]
    fn test_overlay_writes_caption_top_left() {
        // only where a system font is installed
        let candidates = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
        ];
        let Some(path) = candidates.iter().find(|p| Path::new(p).is_file()) else {
            return;
        };
        let overlay = Overlay::load(path, 32.0).unwrap();
        let mut img = RgbImage::new(400, 200);
        overlay.draw(&mut img, 12, 0.4);

        let reddish = img.pixels().filter(|p| p[0] > 128 && p[1] < 64).count();
        let cyanish = img.pixels().filter(|p| p[0] < 64 && p[1] > 128 && p[2] > 128).count();
        assert!(reddish > 0);
        assert!(cyanish > 0);
        assert_eq!(*img.get_pixel(399, 199), Rgb([0, 0, 0]));
    }
}
