//! Single-page rendering
//!
//! [`PageRenderer`] rasterizes one page into a freshly allocated surface and
//! encodes it twice. Calls are independent, so any number may run at once for
//! distinct pages of the same document.

use crate::encode::EncodedImage;
use pdf_engine::{Document, PdfEngineError, RenderSurface};
use std::time::Instant;

/// Default render scale (pixels per PDF point)
pub const DEFAULT_SCALE: f32 = 2.0;

/// Default JPEG quality for preview images
pub const DEFAULT_PREVIEW_QUALITY: u8 = 50;

/// Errors that can occur while rendering a page
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f32),

    #[error("page {page} could not be rasterized: {source}")]
    Engine {
        page: u32,
        #[source]
        source: PdfEngineError,
    },

    #[error("page {page} could not be encoded: {source}")]
    Encode {
        page: u32,
        #[source]
        source: image::ImageError,
    },
}

impl RenderError {
    /// Page the error belongs to, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::InvalidScale(_) => None,
            Self::Engine { page, .. } | Self::Encode { page, .. } => Some(*page),
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Both encodings of one rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page index (0-based)
    pub page_index: u32,

    /// Pixel width shared by both images
    pub width: u32,

    /// Pixel height shared by both images
    pub height: u32,

    /// Lossless full-quality image
    pub full: EncodedImage,

    /// Lower-fidelity preview image
    pub preview: EncodedImage,
}

/// Page renderer
#[derive(Debug, Clone)]
pub struct PageRenderer {
    preview_quality: u8,
}

impl PageRenderer {
    pub fn new() -> Self {
        Self { preview_quality: DEFAULT_PREVIEW_QUALITY }
    }

    /// Create a renderer with a custom preview JPEG quality (1-100)
    pub fn with_preview_quality(quality: u8) -> Self {
        Self { preview_quality: quality.clamp(1, 100) }
    }

    pub fn preview_quality(&self) -> u8 {
        self.preview_quality
    }

    /// Render a page at `scale`
    ///
    /// # Arguments
    /// * `document` - The open document
    /// * `page_index` - Zero-based page index
    /// * `scale` - Pixels per PDF point, must be positive
    pub fn render(
        &self,
        document: &Document,
        page_index: u32,
        scale: f32,
    ) -> RenderResult<RenderedPage> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(RenderError::InvalidScale(scale));
        }

        let start = Instant::now();
        let engine_error = |source| RenderError::Engine { page: page_index, source };
        let encode_error = |source| RenderError::Encode { page: page_index, source };

        let viewport = document.viewport(page_index, scale).map_err(engine_error)?;
        let mut surface = RenderSurface::new(viewport);
        document.render_to(page_index, &mut surface).map_err(engine_error)?;

        let pixels = surface.into_image();
        let full = EncodedImage::png(&pixels).map_err(encode_error)?;
        let preview = EncodedImage::jpeg(&pixels, self.preview_quality).map_err(encode_error)?;

        log::debug!(
            "rendered page {page_index} at {}x{} in {}ms",
            viewport.width,
            viewport.height,
            start.elapsed().as_millis()
        );

        Ok(RenderedPage {
            page_index,
            width: viewport.width,
            height: viewport.height,
            full,
            preview,
        })
    }
}

impl Default for PageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::ImageEncoding;
    use pdf_engine::fixtures::pdf_with_page_sizes;
    use pdf_engine::{EngineConfig, LopdfEngine, OpenSource};
    use std::sync::Arc;

    fn document(sizes: &[(i64, i64)]) -> Document {
        let engine = Arc::new(LopdfEngine::new(EngineConfig::default()));
        Document::open(engine, &OpenSource::Bytes(pdf_with_page_sizes(sizes)))
            .expect("fixture should open")
    }

    #[test]
    fn full_and_preview_have_equal_dimensions() {
        let document = document(&[(100, 140), (80, 60)]);
        let renderer = PageRenderer::new();

        let page = renderer.render(&document, 1, DEFAULT_SCALE).expect("page renders");

        assert_eq!(page.page_index, 1);
        assert_eq!((page.width, page.height), (160, 120));
        for image in [&page.full, &page.preview] {
            let decoded = image::load_from_memory(&image.data).expect("image decodes");
            assert_eq!((decoded.width(), decoded.height()), (160, 120));
        }
        assert_eq!(page.full.encoding, ImageEncoding::Png);
        assert_eq!(page.preview.encoding, ImageEncoding::Jpeg { quality: DEFAULT_PREVIEW_QUALITY });
    }

    #[test]
    fn rendering_is_deterministic() {
        let document = document(&[(50, 50)]);
        let renderer = PageRenderer::with_preview_quality(30);

        let first = renderer.render(&document, 0, 1.5).unwrap();
        let second = renderer.render(&document, 0, 1.5).unwrap();

        assert_eq!(first.full, second.full);
        assert_eq!(first.preview, second.preview);
    }

    #[test]
    fn invalid_scale_is_rejected() {
        let document = document(&[(50, 50)]);
        let renderer = PageRenderer::new();

        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let err = renderer.render(&document, 0, scale).expect_err("scale must be positive");
            assert!(matches!(err, RenderError::InvalidScale(_)));
            assert_eq!(err.page(), None);
        }
    }

    #[test]
    fn out_of_range_page_reports_engine_error() {
        let document = document(&[(50, 50)]);

        let err = PageRenderer::new().render(&document, 3, 1.0).expect_err("page 3 missing");
        assert!(matches!(
            err,
            RenderError::Engine { page: 3, source: PdfEngineError::PageOutOfRange { .. } }
        ));
        assert_eq!(err.page(), Some(3));
    }

    #[test]
    fn oversized_scale_fails_instead_of_allocating() {
        let document = document(&[(612, 792)]);

        let err = PageRenderer::new().render(&document, 0, 1.0e8).expect_err("too many pixels");
        assert!(matches!(
            err,
            RenderError::Engine { page: 0, source: PdfEngineError::SurfaceTooLarge { .. } }
        ));
    }

    #[test]
    fn empty_page_fails_without_touching_siblings() {
        let document = document(&[(0, 50), (50, 50)]);
        let renderer = PageRenderer::new();

        assert!(renderer.render(&document, 0, 1.0).is_err());
        assert!(renderer.render(&document, 1, 1.0).is_ok());
    }

    #[test]
    fn preview_quality_is_clamped() {
        assert_eq!(PageRenderer::with_preview_quality(0).preview_quality(), 1);
        assert_eq!(PageRenderer::with_preview_quality(250).preview_quality(), 100);
    }
}
