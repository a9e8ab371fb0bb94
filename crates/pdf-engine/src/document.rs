//! Opaque document handle
//!
//! A [`Document`] binds an engine to one of its open handles. All operations go
//! through the document itself; the handle id is never exposed, and the engine
//! record is released when the document is dropped.

use crate::{
    DocumentHandle, OpenSource, PageSize, PageViewport, PdfEngine, PdfEngineError,
    PdfEngineResult, RenderSurface,
};
use std::fmt;
use std::sync::Arc;

pub struct Document {
    engine: Arc<dyn PdfEngine>,
    handle: DocumentHandle,
    page_count: u32,
}

impl Document {
    /// Open `source` with `engine`.
    ///
    /// Fails if the engine cannot open the source or reports zero pages.
    pub fn open(engine: Arc<dyn PdfEngine>, source: &OpenSource) -> PdfEngineResult<Self> {
        let handle = engine.open(source)?;

        let page_count = match engine.page_count(handle) {
            Ok(0) => Err(PdfEngineError::Backend("document has no pages".to_owned())),
            other => other,
        };

        match page_count {
            Ok(page_count) => Ok(Self { engine, handle, page_count }),
            Err(err) => {
                let _ = engine.close(handle);
                Err(err)
            }
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn page_size(&self, page_index: u32) -> PdfEngineResult<PageSize> {
        self.check_page(page_index)?;
        self.engine.page_size(self.handle, page_index)
    }

    /// Pixel viewport of a page at `scale`.
    ///
    /// Fails with [`PdfEngineError::SurfaceTooLarge`] when the viewport would
    /// exceed the engine's surface limit.
    pub fn viewport(&self, page_index: u32, scale: f32) -> PdfEngineResult<PageViewport> {
        let size = self.page_size(page_index)?;

        let pixels = size.pixel_count(scale);
        let limit = self.engine.max_surface_pixels();
        if !(pixels <= limit as f64) {
            return Err(PdfEngineError::SurfaceTooLarge { page: page_index, pixels, limit });
        }

        size.viewport(scale).ok_or(PdfEngineError::EmptyPage(page_index))
    }

    /// Rasterize a page into a surface previously sized with [`Document::viewport`].
    pub fn render_to(&self, page_index: u32, surface: &mut RenderSurface) -> PdfEngineResult<()> {
        self.check_page(page_index)?;
        self.engine.render_to(self.handle, page_index, surface)
    }

    fn check_page(&self, page_index: u32) -> PdfEngineResult<()> {
        if page_index >= self.page_count {
            return Err(PdfEngineError::PageOutOfRange {
                page: page_index,
                page_count: self.page_count,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").field("page_count", &self.page_count).finish_non_exhaustive()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if let Err(err) = self.engine.close(self.handle) {
            log::warn!("failed to close document handle {}: {err}", self.handle.raw());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::pdf_with_page_sizes;
    use crate::{EngineConfig, LopdfEngine};

    fn open(sizes: &[(i64, i64)]) -> (Arc<LopdfEngine>, Document) {
        let engine = Arc::new(LopdfEngine::new(EngineConfig::default()));
        let source = OpenSource::Bytes(pdf_with_page_sizes(sizes));
        let document = Document::open(engine.clone(), &source).expect("open should succeed");
        (engine, document)
    }

    #[test]
    fn viewport_scales_page_size() {
        let (_, document) = open(&[(100, 150), (300, 200)]);

        assert_eq!(document.page_count(), 2);
        let viewport = document.viewport(1, 2.0).expect("page 1 exists");
        assert_eq!((viewport.width, viewport.height), (600, 400));
    }

    #[test]
    fn out_of_range_pages_are_rejected_before_the_engine() {
        let (_, document) = open(&[(100, 100)]);

        let err = document.viewport(1, 1.0).expect_err("only one page");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 1, page_count: 1 }));
    }

    #[test]
    fn empty_media_box_has_no_viewport() {
        let (_, document) = open(&[(0, 100)]);

        let err = document.viewport(0, 1.0).expect_err("zero width page");
        assert!(matches!(err, PdfEngineError::EmptyPage(0)));
    }

    #[test]
    fn oversized_viewport_is_refused() {
        let engine = Arc::new(LopdfEngine::new(
            EngineConfig::default().with_max_surface_pixels(100 * 100),
        ));
        let source = OpenSource::Bytes(pdf_with_page_sizes(&[(100, 100)]));
        let document = Document::open(engine, &source).expect("open should succeed");

        assert!(document.viewport(0, 1.0).is_ok());
        let err = document.viewport(0, 1.5).expect_err("over the pixel limit");
        assert!(matches!(err, PdfEngineError::SurfaceTooLarge { page: 0, limit: 10_000, .. }));
    }

    #[test]
    fn huge_scale_does_not_allocate() {
        let (_, document) = open(&[(612, 792)]);

        for scale in [1.0e8, f32::MAX] {
            let err = document.viewport(0, scale).expect_err("far over the default limit");
            assert!(matches!(err, PdfEngineError::SurfaceTooLarge { .. }));
        }
    }

    #[test]
    fn dropping_document_closes_engine_record() {
        let (engine, document) = open(&[(100, 100)]);
        let handle = document.handle;

        drop(document);
        assert!(matches!(engine.page_count(handle), Err(PdfEngineError::InvalidHandle(_))));
    }
}
