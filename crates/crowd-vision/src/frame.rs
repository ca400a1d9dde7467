use anyhow::{Context, Result};
use image::RgbImage;
use std::time::Instant;

/// One decoded camera sample. Owned by a single loop iteration.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image, captured_at: Instant::now() }
    }

    /// Decodes a JPEG/PNG buffer.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self> {
        anyhow::ensure!(!bytes.is_empty(), "empty image buffer");
        let img = image::load_from_memory(bytes).context("decode frame")?;
        Ok(Self::from_rgb(img.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}
