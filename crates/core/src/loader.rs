//! Document loading
//!
//! [`DocumentLoader`] opens a source and renders every page concurrently,
//! publishing progress as a [`LoadState`] on a watch channel. Each load gets
//! a generation number; results that arrive for a superseded generation are
//! dropped instead of landing in the newer document's slots.

use futures::stream::{FuturesUnordered, StreamExt};
use pdf_engine::{Document, OpenSource, PdfEngine, PdfEngineError};
use pdf_viewer_render::{
    EncodedImage, PageRenderer, RenderError, DEFAULT_PREVIEW_QUALITY, DEFAULT_SCALE,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinError;
use viewer_core::{LoadPolicy, ViewerConfig};

/// Errors that can occur while loading a document
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open document: {0}")]
    Open(#[source] PdfEngineError),

    #[error("failed to render page {page}: {source}")]
    Render {
        page: u32,
        #[source]
        source: RenderError,
    },

    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f32),

    #[error("background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("load was superseded by a newer one")]
    Superseded,
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Options applied to every load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoaderOptions {
    /// Render scale (pixels per PDF point)
    pub scale: f32,

    /// JPEG quality for preview images
    pub preview_quality: u8,

    pub policy: LoadPolicy,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            preview_quality: DEFAULT_PREVIEW_QUALITY,
            policy: LoadPolicy::default(),
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            scale: config.scale,
            preview_quality: config.preview_quality,
            policy: config.load_policy,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_preview_quality(mut self, quality: u8) -> Self {
        self.preview_quality = quality;
        self
    }

    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Observable state of the most recent load.
///
/// Image slots are sized to the page count as soon as the document opens and
/// are filled in completion order.
#[derive(Debug, Clone, Default)]
pub struct LoadState {
    pub generation: u64,

    /// Display form of the source being loaded
    pub source: Option<String>,

    /// True from the moment a load starts until every page has settled.
    /// Stays true when the load fails; check `error`.
    pub loading: bool,

    pub page_count: u32,
    pub full_images: Vec<Option<Arc<EncodedImage>>>,
    pub preview_images: Vec<Option<Arc<EncodedImage>>>,

    /// Per-page failures, only populated under [`LoadPolicy::PerPage`]
    pub page_errors: Vec<Option<String>>,

    pub error: Option<String>,
}

impl LoadState {
    pub fn rendered_count(&self) -> usize {
        self.full_images.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.page_errors
            .iter()
            .enumerate()
            .filter(|(_, error)| error.is_some())
            .map(|(index, _)| index as u32)
            .collect()
    }

    /// Finished without a load-level error
    pub fn is_complete(&self) -> bool {
        !self.loading && self.error.is_none() && self.source.is_some()
    }
}

/// Outcome of a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub generation: u64,
    pub page_count: u32,
    pub failed_pages: Vec<u32>,
}

pub struct DocumentLoader {
    engine: Arc<dyn PdfEngine>,
    options: Mutex<LoaderOptions>,
    source: Mutex<Option<OpenSource>>,
    document: Mutex<Option<Arc<Document>>>,
    generation: AtomicU64,
    state: watch::Sender<LoadState>,
}

impl DocumentLoader {
    pub fn new(engine: Arc<dyn PdfEngine>, options: LoaderOptions) -> Self {
        let (state, _) = watch::channel(LoadState::default());
        Self {
            engine,
            options: Mutex::new(options),
            source: Mutex::new(None),
            document: Mutex::new(None),
            generation: AtomicU64::new(0),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn options(&self) -> LoaderOptions {
        *lock(&self.options)
    }

    pub fn source(&self) -> Option<OpenSource> {
        lock(&self.source).clone()
    }

    /// The document opened by the most recent load, if it got that far
    pub fn document(&self) -> Option<Arc<Document>> {
        lock(&self.document).clone()
    }

    /// Record the scale used by future loads. Never triggers a reload.
    pub fn set_scale(&self, scale: f32) -> LoadResult<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(LoadError::InvalidScale(scale));
        }
        lock(&self.options).scale = scale;
        Ok(())
    }

    /// Load `source` unless it is already the current source.
    ///
    /// Returns `None` when nothing changed; otherwise the started load.
    pub fn set_source(
        &self,
        source: OpenSource,
    ) -> Option<impl Future<Output = LoadResult<LoadSummary>> + '_> {
        if lock(&self.source).as_ref() == Some(&source) {
            log::debug!("source unchanged, not reloading");
            return None;
        }
        Some(self.load(source))
    }

    /// Start loading `source`.
    ///
    /// Outputs are reset and `loading` is set before this returns; the
    /// returned future performs the open and the page renders.
    pub fn load(&self, source: OpenSource) -> impl Future<Output = LoadResult<LoadSummary>> + '_ {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let options = self.options();

        log::info!("loading {source} (generation {generation})");
        lock(&self.document).take();
        *lock(&self.source) = Some(source.clone());
        self.state.send_replace(LoadState {
            generation,
            source: Some(source.to_string()),
            loading: true,
            ..LoadState::default()
        });

        self.run(generation, source, options)
    }

    async fn run(
        &self,
        generation: u64,
        source: OpenSource,
        options: LoaderOptions,
    ) -> LoadResult<LoadSummary> {
        let start = Instant::now();

        let engine = Arc::clone(&self.engine);
        let opened = tokio::task::spawn_blocking(move || Document::open(engine, &source)).await;
        let document = match opened {
            Ok(Ok(document)) => Arc::new(document),
            Ok(Err(err)) => return Err(self.fail(generation, LoadError::Open(err))),
            Err(err) => return Err(self.fail(generation, LoadError::TaskFailed(err))),
        };
        self.store_document(generation, &document)?;

        let page_count = document.page_count();
        let slots = page_count as usize;
        self.update(generation, |state| {
            state.page_count = page_count;
            state.full_images = vec![None; slots];
            state.preview_images = vec![None; slots];
            state.page_errors = vec![None; slots];
        });

        let renderer = PageRenderer::with_preview_quality(options.preview_quality);
        let mut renders: FuturesUnordered<_> = (0..page_count)
            .map(|page_index| {
                let document = Arc::clone(&document);
                let renderer = renderer.clone();
                let task = tokio::task::spawn_blocking(move || {
                    renderer.render(&document, page_index, options.scale)
                });
                async move { (page_index, task.await) }
            })
            .collect();

        let mut failed_pages = Vec::new();
        while let Some((page_index, joined)) = renders.next().await {
            self.ensure_current(generation)?;

            let rendered = match joined {
                Ok(result) => result.map_err(|source| LoadError::Render { page: page_index, source }),
                Err(err) => Err(LoadError::TaskFailed(err)),
            };

            match rendered {
                Ok(page) => {
                    let index = page_index as usize;
                    let full = Arc::new(page.full);
                    let preview = Arc::new(page.preview);
                    self.update(generation, |state| {
                        state.full_images[index] = Some(full);
                        state.preview_images[index] = Some(preview);
                    });
                }
                Err(err) => match options.policy {
                    LoadPolicy::FailFast => return Err(self.fail(generation, err)),
                    LoadPolicy::PerPage => {
                        log::warn!("{err}");
                        let message = err.to_string();
                        let index = page_index as usize;
                        self.update(generation, |state| state.page_errors[index] = Some(message));
                        failed_pages.push(page_index);
                    }
                },
            }
        }

        self.update(generation, |state| state.loading = false);
        failed_pages.sort_unstable();

        log::info!(
            "loaded {page_count} pages in {}ms ({} failed)",
            start.elapsed().as_millis(),
            failed_pages.len()
        );

        Ok(LoadSummary { generation, page_count, failed_pages })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn ensure_current(&self, generation: u64) -> LoadResult<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            log::debug!("discarding results of superseded load {generation}");
            Err(LoadError::Superseded)
        }
    }

    /// Publish `document` unless a newer load has started.
    ///
    /// The generation is checked with the slot locked; `load` bumps the
    /// generation before it clears the slot.
    fn store_document(&self, generation: u64, document: &Arc<Document>) -> LoadResult<()> {
        let mut slot = lock(&self.document);
        self.ensure_current(generation)?;
        *slot = Some(Arc::clone(document));
        Ok(())
    }

    /// Apply `modify` if the published state still belongs to `generation`
    fn update<F>(&self, generation: u64, modify: F)
    where
        F: FnOnce(&mut LoadState),
    {
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            modify(state);
            true
        });
    }

    fn fail(&self, generation: u64, err: LoadError) -> LoadError {
        log::error!("load {generation} failed: {err}");
        let message = err.to_string();
        self.update(generation, |state| state.error = Some(message));
        err
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_engine::fixtures::uniform_pdf;
    use pdf_engine::{
        DocumentHandle, EngineConfig, LopdfEngine, PageSize, PdfEngineResult, RenderSurface,
    };
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Wraps the lopdf engine, counting renders and failing chosen pages
    #[derive(Default)]
    struct CountingEngine {
        inner: LopdfEngine,
        renders: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        failing_pages: HashSet<u32>,
        render_delay: Duration,
    }

    impl CountingEngine {
        fn failing(pages: &[u32]) -> Self {
            Self { failing_pages: pages.iter().copied().collect(), ..Self::default() }
        }

        fn slow(delay: Duration) -> Self {
            Self { render_delay: delay, ..Self::default() }
        }
    }

    impl PdfEngine for CountingEngine {
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
            self.renders.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            std::thread::sleep(self.render_delay);
            let result = if self.failing_pages.contains(&page_index) {
                Err(PdfEngineError::Backend(format!("page {page_index} is broken")))
            } else {
                self.inner.render_to(handle, page_index, surface)
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn close(&self, handle: DocumentHandle) -> PdfEngineResult<()> {
            self.inner.close(handle)
        }
    }

    fn pdf(pages: usize) -> OpenSource {
        OpenSource::Bytes(uniform_pdf(pages, 60, 80))
    }

    fn loader_with(engine: Arc<CountingEngine>, options: LoaderOptions) -> DocumentLoader {
        DocumentLoader::new(engine, options)
    }

    #[tokio::test]
    async fn renders_every_page_once() {
        let engine = Arc::new(CountingEngine::default());
        let loader = loader_with(engine.clone(), LoaderOptions::default());

        let summary = loader.load(pdf(4)).await.expect("load succeeds");

        assert_eq!(summary.page_count, 4);
        assert!(summary.failed_pages.is_empty());
        assert_eq!(engine.renders.load(Ordering::SeqCst), 4);

        let state = loader.state();
        assert!(!state.loading);
        assert!(state.is_complete());
        assert_eq!(state.rendered_count(), 4);
        for (full, preview) in state.full_images.iter().zip(&state.preview_images) {
            let (full, preview) = (full.as_ref().unwrap(), preview.as_ref().unwrap());
            assert_eq!((full.width, full.height), (120, 160));
            assert_eq!((full.width, full.height), (preview.width, preview.height));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pages_render_concurrently() {
        let engine = Arc::new(CountingEngine::slow(Duration::from_millis(50)));
        let loader = loader_with(engine.clone(), LoaderOptions::default());

        loader.load(pdf(4)).await.expect("load succeeds");

        assert!(engine.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn loading_is_set_before_the_first_await() {
        let loader = loader_with(Arc::new(CountingEngine::default()), LoaderOptions::default());
        let receiver = loader.subscribe();
        assert!(!receiver.borrow().loading);

        let pending = loader.load(pdf(2));
        {
            let state = receiver.borrow();
            assert!(state.loading);
            assert_eq!(state.generation, 1);
            assert!(state.full_images.is_empty());
        }

        pending.await.expect("load succeeds");
        assert!(!receiver.borrow().loading);
    }

    #[tokio::test]
    async fn scale_change_does_not_reload() {
        let engine = Arc::new(CountingEngine::default());
        let loader = loader_with(engine.clone(), LoaderOptions::default());
        loader.load(pdf(3)).await.unwrap();
        let before = loader.state();

        loader.set_scale(1.0).expect("valid scale");

        let after = loader.state();
        assert_eq!(engine.renders.load(Ordering::SeqCst), 3);
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.full_images[0], before.full_images[0]);
        assert_eq!(loader.options().scale, 1.0);
        assert!(matches!(loader.set_scale(0.0), Err(LoadError::InvalidScale(_))));
    }

    #[tokio::test]
    async fn new_scale_applies_to_the_next_load() {
        let loader = loader_with(Arc::new(CountingEngine::default()), LoaderOptions::default());
        loader.set_scale(0.5).unwrap();

        loader.load(pdf(1)).await.unwrap();

        let full = loader.state().full_images[0].clone().unwrap();
        assert_eq!((full.width, full.height), (30, 40));
    }

    #[tokio::test]
    async fn same_source_is_not_reloaded() {
        let engine = Arc::new(CountingEngine::default());
        let loader = loader_with(engine.clone(), LoaderOptions::default());
        let source = pdf(2);

        loader.set_source(source.clone()).expect("first source loads").await.unwrap();
        assert!(loader.set_source(source).is_none());

        assert_eq!(engine.renders.load(Ordering::SeqCst), 2);
        assert_eq!(loader.state().generation, 1);
    }

    #[tokio::test]
    async fn source_change_resets_and_repopulates() {
        let loader = loader_with(Arc::new(CountingEngine::default()), LoaderOptions::default());
        let receiver = loader.subscribe();
        loader.load(pdf(3)).await.unwrap();

        let pending = loader.set_source(pdf(2)).expect("different source");
        {
            let state = receiver.borrow();
            assert!(state.loading);
            assert_eq!(state.page_count, 0);
            assert!(state.full_images.is_empty());
            assert!(state.preview_images.is_empty());
        }
        pending.await.unwrap();

        let state = loader.state();
        assert_eq!(state.generation, 2);
        assert_eq!(state.page_count, 2);
        assert_eq!(state.rendered_count(), 2);
        assert_eq!(loader.document().map(|document| document.page_count()), Some(2));
    }

    #[tokio::test]
    async fn open_failure_keeps_loading_and_sets_error() {
        let loader = loader_with(Arc::new(CountingEngine::default()), LoaderOptions::default());

        let err = loader
            .load(OpenSource::Bytes(b"not a pdf".to_vec()))
            .await
            .expect_err("garbage does not open");

        assert!(matches!(err, LoadError::Open(_)));
        let state = loader.state();
        assert!(state.loading);
        assert!(state.error.is_some());
        assert!(!state.is_complete());
        assert!(loader.document().is_none());
    }

    #[tokio::test]
    async fn one_failed_page_fails_the_whole_load() {
        let loader = loader_with(Arc::new(CountingEngine::failing(&[1])), LoaderOptions::default());

        let err = loader.load(pdf(3)).await.expect_err("page 1 fails");

        assert!(matches!(err, LoadError::Render { page: 1, .. }));
        let state = loader.state();
        assert!(state.loading);
        assert!(state.error.as_deref().unwrap_or_default().contains("page 1"));
    }

    #[tokio::test]
    async fn per_page_policy_keeps_the_rest() {
        let options = LoaderOptions::new().with_policy(LoadPolicy::PerPage);
        let loader = loader_with(Arc::new(CountingEngine::failing(&[0, 2])), options);

        let summary = loader.load(pdf(4)).await.expect("partial load succeeds");

        assert_eq!(summary.failed_pages, vec![0, 2]);
        let state = loader.state();
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(state.failed_pages(), vec![0, 2]);
        assert!(state.full_images[1].is_some() && state.full_images[3].is_some());
        assert!(state.full_images[0].is_none() && state.preview_images[2].is_none());
    }

    #[tokio::test]
    async fn superseded_load_is_discarded() {
        let engine = Arc::new(CountingEngine::slow(Duration::from_millis(100)));
        let loader = loader_with(engine, LoaderOptions::default());
        let mut receiver = loader.subscribe();

        let first = loader.load(pdf(3));
        let second = async {
            receiver
                .wait_for(|state| state.generation == 1 && state.page_count == 3)
                .await
                .expect("loader alive");
            loader.load(pdf(2)).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Err(LoadError::Superseded)));
        assert_eq!(second.expect("second load succeeds").page_count, 2);

        let state = loader.state();
        assert_eq!(state.generation, 2);
        assert_eq!(state.full_images.len(), 2);
        assert_eq!(state.rendered_count(), 2);
        assert!(state.error.is_none());
    }

    #[test]
    fn stale_load_cannot_restore_its_document() {
        let engine: Arc<dyn PdfEngine> = Arc::new(CountingEngine::default());
        let loader = DocumentLoader::new(Arc::clone(&engine), LoaderOptions::default());
        let document = Arc::new(Document::open(engine, &pdf(2)).expect("fixture opens"));

        drop(loader.load(pdf(1)));
        let stale = loader.state().generation;
        // a newer load starts after the stale one finished opening
        drop(loader.load(pdf(3)));

        assert!(matches!(loader.store_document(stale, &document), Err(LoadError::Superseded)));
        assert!(loader.document().is_none());

        let current = loader.state().generation;
        loader.store_document(current, &document).expect("current load may publish");
        assert_eq!(loader.document().map(|document| document.page_count()), Some(2));
    }

    #[test]
    fn options_follow_viewer_config() {
        let config = ViewerConfig::default()
            .with_scale(1.5)
            .with_preview_quality(20)
            .with_load_policy(LoadPolicy::PerPage);

        let options = LoaderOptions::from_config(&config);

        assert_eq!(options, LoaderOptions { scale: 1.5, preview_quality: 20, policy: LoadPolicy::PerPage });
        let loader = DocumentLoader::new(Arc::new(LopdfEngine::new(EngineConfig::default())), options);
        assert_eq!(loader.options(), options);
    }
}
