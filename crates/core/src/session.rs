//! A loader and a navigator working on the same document

use crate::loader::{DocumentLoader, LoadResult, LoadState, LoadSummary, LoaderOptions};
use pdf_engine::{OpenSource, PdfEngine};
use std::sync::Arc;
use tokio::sync::watch;
use viewer_core::{ConfigError, PageNavigator, ScrollView, ViewerConfig, ViewerHost, ViewportState};

/// One open viewer: loads documents and keeps the current page for them.
pub struct ViewerSession<H> {
    loader: DocumentLoader,
    navigator: PageNavigator<H>,
}

impl<H: ViewerHost> ViewerSession<H> {
    pub fn new(engine: Arc<dyn PdfEngine>, host: H, config: &ViewerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            loader: DocumentLoader::new(engine, LoaderOptions::from_config(config)),
            navigator: PageNavigator::new(host, config)?,
        })
    }

    /// Load `source` and retarget navigation at its pages.
    ///
    /// Navigation has no document while the load runs, and stays that way if
    /// the load fails.
    pub async fn open(&mut self, source: OpenSource) -> LoadResult<LoadSummary> {
        self.navigator.document_cleared();
        let summary = self.loader.load(source).await?;
        self.navigator.document_ready(summary.page_count);
        Ok(summary)
    }

    /// Like [`open`](Self::open), but does nothing when `source` is already loaded
    pub async fn set_source(&mut self, source: OpenSource) -> LoadResult<Option<LoadSummary>> {
        if self.loader.source().as_ref() == Some(&source) {
            return Ok(None);
        }
        self.open(source).await.map(Some)
    }

    pub fn set_scale(&self, scale: f32) -> LoadResult<()> {
        self.loader.set_scale(scale)
    }

    pub fn state(&self) -> LoadState {
        self.loader.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.loader.subscribe()
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    pub fn navigator(&self) -> &PageNavigator<H> {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut PageNavigator<H> {
        &mut self.navigator
    }
}

impl ViewerSession<ScrollView> {
    /// Lay the rendered pages out in the scroll view, one below the other.
    ///
    /// Pages without an image keep the height of the first rendered page.
    pub fn layout_pages(&mut self, spacing_px: f32, viewport_height_px: f32) {
        let state = self.loader.state();
        let fallback = state.full_images.iter().flatten().map(|image| image.height as f32).next();
        let heights = state
            .full_images
            .iter()
            .map(|slot| slot.as_ref().map(|image| image.height as f32).or(fallback).unwrap_or(0.0))
            .collect();

        let host = self.navigator.host_mut();
        host.set_layout(ViewportState::new(heights, spacing_px, viewport_height_px));
        host.scroll_immediate(0.0);
        self.navigator.sync_visibility();
    }
}
