//! PDF engine abstraction
//!
//! The rendering collaborator behind the viewer. Documents are opened from an
//! [`OpenSource`], addressed by an opaque [`DocumentHandle`] and rasterized one
//! page at a time into a caller-owned [`RenderSurface`].
//!
//! Backends are configured explicitly through [`EngineConfig`] at construction
//! time; there is no process-wide engine state.

mod document;
mod surface;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use document::Document;
pub use surface::{PageViewport, RenderSurface, RgbaImage};

use image::Rgba;
use lopdf::Document as LopdfDocument;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default upper bound for a single document, in bytes.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 256 * 1024 * 1024;

/// Default upper bound for one render surface, in pixels (512 MiB of RGBA).
pub const DEFAULT_MAX_SURFACE_PIXELS: u64 = 128 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Page size in points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Pixel viewport for this page at `scale` (1.0 = one pixel per point).
    ///
    /// Returns `None` when the page has no drawable area.
    pub fn viewport(self, scale: f32) -> Option<PageViewport> {
        let (width, height) = self.pixel_dimensions(scale);

        if !(width >= 1.0 && height >= 1.0) {
            return None;
        }
        if width > f64::from(u32::MAX) || height > f64::from(u32::MAX) {
            return None;
        }

        Some(PageViewport { width: width as u32, height: height as u32, scale })
    }

    /// Pixel count of the viewport at `scale`, without allocating anything.
    pub fn pixel_count(self, scale: f32) -> f64 {
        let (width, height) = self.pixel_dimensions(scale);
        width * height
    }

    fn pixel_dimensions(self, scale: f32) -> (f64, f64) {
        let scale = f64::from(scale);
        ((f64::from(self.width_pt) * scale).round(), (f64::from(self.height_pt) * scale).round())
    }
}

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl FromStr for OpenSource {
    type Err = PdfEngineError;

    /// Accepts plain filesystem paths and `file://` URLs.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !value.contains("://") {
            return Ok(Self::Path(PathBuf::from(value)));
        }

        let parsed = url::Url::parse(value)
            .map_err(|err| PdfEngineError::UnsupportedSource(format!("{value}: {err}")))?;

        if parsed.scheme() != "file" {
            return Err(PdfEngineError::UnsupportedSource(format!(
                "scheme `{}` is not supported",
                parsed.scheme()
            )));
        }

        parsed
            .to_file_path()
            .map(Self::Path)
            .map_err(|_| PdfEngineError::UnsupportedSource(value.to_owned()))
    }
}

impl fmt::Display for OpenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("page {0} has no drawable area")]
    EmptyPage(u32),
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("unsupported document source: {0}")]
    UnsupportedSource(String),
    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("page {page} would need {pixels} pixels at this scale, limit is {limit}")]
    SurfaceTooLarge { page: u32, pixels: f64, limit: u64 },
    #[error("backend error: {0}")]
    Backend(String),
}

pub type PdfEngineResult<T> = Result<T, PdfEngineError>;

/// Engine construction options.
///
/// Passed by value to a backend constructor; backends never read global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding the native rendering library, for backends that need one.
    pub library_dir: Option<PathBuf>,
    /// Documents larger than this are rejected at open time.
    pub max_document_bytes: usize,
    /// Viewports with more pixels than this are refused before allocation.
    pub max_surface_pixels: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_dir: None,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_surface_pixels: DEFAULT_MAX_SURFACE_PIXELS,
        }
    }
}

impl EngineConfig {
    pub fn with_library_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.library_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_max_document_bytes(mut self, limit: usize) -> Self {
        self.max_document_bytes = limit;
        self
    }

    pub fn with_max_surface_pixels(mut self, limit: u64) -> Self {
        self.max_surface_pixels = limit;
        self
    }
}

/// A PDF rendering backend.
///
/// Implementations must tolerate concurrent `render_to` calls for distinct
/// pages of the same document.
pub trait PdfEngine: Send + Sync {
    fn open(&self, source: &OpenSource) -> PdfEngineResult<DocumentHandle>;
    fn page_count(&self, handle: DocumentHandle) -> PdfEngineResult<u32>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> PdfEngineResult<PageSize>;
    /// Rasterize a page into `surface`, scaled to the surface's viewport.
    fn render_to(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        surface: &mut RenderSurface,
    ) -> PdfEngineResult<()>;
    fn close(&self, handle: DocumentHandle) -> PdfEngineResult<()>;

    /// Largest surface, in pixels, this engine is willing to render into.
    fn max_surface_pixels(&self) -> u64 {
        DEFAULT_MAX_SURFACE_PIXELS
    }
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    bytes: Arc<Vec<u8>>,
    page_sizes: Vec<PageSize>,
}

/// Default backend: parses page geometry with lopdf and paints blank pages.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    config: EngineConfig,
    next_handle: AtomicU64,
    docs: RwLock<HashMap<DocumentHandle, DocumentRecord>>,
}

impl LopdfEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, next_handle: AtomicU64::new(0), docs: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn parse_sizes(bytes: &[u8]) -> PdfEngineResult<Vec<PageSize>> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = LopdfDocument::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(PageSize { width_pt: 612.0, height_pt: 792.0 });

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn read_docs(
        &self,
    ) -> PdfEngineResult<RwLockReadGuard<'_, HashMap<DocumentHandle, DocumentRecord>>> {
        self.docs.read().map_err(|_| PdfEngineError::Backend("engine state poisoned".to_owned()))
    }

    fn write_docs(
        &self,
    ) -> PdfEngineResult<RwLockWriteGuard<'_, HashMap<DocumentHandle, DocumentRecord>>> {
        self.docs.write().map_err(|_| PdfEngineError::Backend("engine state poisoned".to_owned()))
    }

    fn record(&self, handle: DocumentHandle) -> PdfEngineResult<DocumentRecord> {
        self.read_docs()?.get(&handle).cloned().ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    #[cfg_attr(not(feature = "pdfium"), allow(dead_code))]
    pub(crate) fn document_bytes(&self, handle: DocumentHandle) -> PdfEngineResult<Arc<Vec<u8>>> {
        Ok(self.record(handle)?.bytes)
    }

    fn read_source(&self, source: &OpenSource) -> PdfEngineResult<Vec<u8>> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes.clone(),
        };

        if bytes.len() > self.config.max_document_bytes {
            return Err(PdfEngineError::TooLarge {
                size: bytes.len(),
                limit: self.config.max_document_bytes,
            });
        }

        Ok(bytes)
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&self, source: &OpenSource) -> PdfEngineResult<DocumentHandle> {
        let bytes = self.read_source(source)?;
        let page_sizes = Self::parse_sizes(&bytes)?;

        let handle = DocumentHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        log::debug!("opened {source} as handle {} ({} pages)", handle.raw(), page_sizes.len());

        self.write_docs()?
            .insert(handle, DocumentRecord { bytes: Arc::new(bytes), page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> PdfEngineResult<u32> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> PdfEngineResult<PageSize> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn render_to(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        surface: &mut RenderSurface,
    ) -> PdfEngineResult<()> {
        let page_size = self.page_size(handle, page_index)?;
        if page_size.viewport(surface.viewport().scale).is_none() {
            return Err(PdfEngineError::EmptyPage(page_index));
        }

        let width = surface.width();
        let height = surface.height();

        surface.fill(Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            let border = Rgba([220, 220, 220, 255]);
            for x in 0..width {
                surface.put_pixel(x, 0, border);
                surface.put_pixel(x, height - 1, border);
            }
            for y in 0..height {
                surface.put_pixel(0, y, border);
                surface.put_pixel(width - 1, y, border);
            }
        }

        Ok(())
    }

    fn close(&self, handle: DocumentHandle) -> PdfEngineResult<()> {
        self.write_docs()?
            .remove(&handle)
            .map(|_| ())
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn max_surface_pixels(&self) -> u64 {
        self.config.max_surface_pixels
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// PDFium-backed engine.
    ///
    /// Geometry and document bookkeeping come from [`LopdfEngine`]; pixels come
    /// from PDFium. PDFium is bound per render call because its handle is not
    /// shareable across threads.
    pub struct PdfiumEngine {
        inner: LopdfEngine,
    }

    impl PdfiumEngine {
        pub fn new(config: EngineConfig) -> PdfEngineResult<Self> {
            let _ = bind(&config)?;
            Ok(Self { inner: LopdfEngine::new(config) })
        }
    }

    fn bind(config: &EngineConfig) -> PdfEngineResult<Pdfium> {
        if let Some(dir) = &config.library_dir {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(bindings));
            }
            log::warn!("no pdfium library in {}, trying system library", dir.display());
        }

        Pdfium::bind_to_system_library().map(Pdfium::new).map_err(|err| {
            PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
        })
    }

    impl PdfEngine for PdfiumEngine {
        fn open(&self, source: &OpenSource) -> PdfEngineResult<DocumentHandle> {
            self.inner.open(source)
        }

        fn page_count(&self, handle: DocumentHandle) -> PdfEngineResult<u32> {
            self.inner.page_count(handle)
        }

        fn page_size(&self, handle: DocumentHandle, page_index: u32) -> PdfEngineResult<PageSize> {
            self.inner.page_size(handle, page_index)
        }

        fn render_to(
            &self,
            handle: DocumentHandle,
            page_index: u32,
            surface: &mut RenderSurface,
        ) -> PdfEngineResult<()> {
            let bytes = self.inner.document_bytes(handle)?;
            let pdfium = bind(self.inner.config())?;
            let doc = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
            let out_of_range = || PdfEngineError::PageOutOfRange {
                page: page_index,
                page_count: doc.pages().len() as u32,
            };
            let index = u16::try_from(page_index).map_err(|_| out_of_range())?;
            let page = doc.pages().get(index).map_err(|_| out_of_range())?;

            let config = PdfRenderConfig::new()
                .set_target_width(surface.width() as i32)
                .set_target_height(surface.height() as i32)
                .render_form_data(true)
                .render_annotations(true);

            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            surface.copy_from_rgba(&bitmap.as_rgba_bytes())
        }

        fn close(&self, handle: DocumentHandle) -> PdfEngineResult<()> {
            self.inner.close(handle)
        }

        fn max_surface_pixels(&self) -> u64 {
            self.inner.max_surface_pixels()
        }
    }
}

/// The engine selected by enabled features.
pub fn default_engine(config: EngineConfig) -> PdfEngineResult<Arc<dyn PdfEngine>> {
    #[cfg(feature = "pdfium")]
    {
        Ok(Arc::new(pdfium_backend::PdfiumEngine::new(config)?))
    }

    #[cfg(not(feature = "pdfium"))]
    {
        Ok(Arc::new(LopdfEngine::new(config)))
    }
}
