//! Off-screen drawing surfaces
//!
//! A surface is allocated per render call and sized to the page viewport.
//! Surfaces are never shared between concurrent renders.

use crate::{PdfEngineError, PdfEngineResult};
use image::{ImageBuffer, Rgba};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Pixel-space rectangle a page occupies at a given scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

/// An RGBA pixel buffer a backend renders into.
#[derive(Debug, Clone)]
pub struct RenderSurface {
    viewport: PageViewport,
    pixels: RgbaImage,
}

impl RenderSurface {
    /// Allocate a transparent surface matching `viewport`.
    pub fn new(viewport: PageViewport) -> Self {
        Self { viewport, pixels: RgbaImage::new(viewport.width, viewport.height) }
    }

    pub fn viewport(&self) -> PageViewport {
        self.viewport
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color;
        }
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        self.pixels.put_pixel(x, y, color);
    }

    /// Replace the surface contents with tightly packed RGBA bytes.
    pub fn copy_from_rgba(&mut self, rgba: &[u8]) -> PdfEngineResult<()> {
        let expected = self.width() as usize * self.height() as usize * 4;
        if rgba.len() != expected {
            return Err(PdfEngineError::Backend(format!(
                "bitmap has {} bytes, surface expects {expected}",
                rgba.len()
            )));
        }

        self.pixels.copy_from_slice(rgba);
        Ok(())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }
}
