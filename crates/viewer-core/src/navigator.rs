//! Page navigation for one viewing session
//!
//! Wires the visibility tracker, the current page controller, and the host
//! that actually scrolls.

use crate::config::{ConfigError, ViewerConfig};
use crate::controller::{CrossingOutcome, CurrentPageController, NavigationError, ScrollCommand};
use crate::scroll::ScrollView;
use crate::visibility::{PageVisibilityTracker, VisibilitySample};
use crate::PageIndex;
use std::time::Duration;

/// The UI side of navigation
pub trait ViewerHost {
    /// Bring a page container into view
    fn scroll_into_view(&mut self, command: &ScrollCommand);
}

pub struct PageNavigator<H> {
    host: H,
    tracker: PageVisibilityTracker,
    controller: CurrentPageController,
}

impl<H: ViewerHost> PageNavigator<H> {
    pub fn new(host: H, config: &ViewerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            host,
            tracker: PageVisibilityTracker::new(config.threshold)?,
            controller: CurrentPageController::from_config(config),
        })
    }

    /// A document finished loading; observe its pages and start at the first.
    pub fn document_ready(&mut self, page_count: u32) {
        self.tracker.observe(0..page_count);
        self.controller.reset(page_count);
        log::debug!("navigator ready for {page_count} pages");
    }

    pub fn document_cleared(&mut self) {
        self.tracker.unobserve_all();
        self.controller.clear();
    }

    pub fn current_page(&self) -> Option<PageIndex> {
        self.controller.current_page()
    }

    pub fn page_count(&self) -> u32 {
        self.controller.page_count()
    }

    pub fn is_navigating(&self) -> bool {
        self.controller.is_navigating()
    }

    pub fn navigate_to(&mut self, page_index: PageIndex) -> Result<PageIndex, NavigationError> {
        let command = self.controller.navigate_to(page_index)?;
        self.host.scroll_into_view(&command);
        Ok(command.page_index)
    }

    pub fn jump_to(&mut self, page_index: PageIndex) -> Result<PageIndex, NavigationError> {
        let command = self.controller.jump_to(page_index)?;
        self.host.scroll_into_view(&command);
        Ok(command.page_index)
    }

    pub fn next_page(&mut self) -> Option<PageIndex> {
        let command = self.controller.next_page()?;
        self.host.scroll_into_view(&command);
        Some(command.page_index)
    }

    pub fn previous_page(&mut self) -> Option<PageIndex> {
        let command = self.controller.previous_page()?;
        self.host.scroll_into_view(&command);
        Some(command.page_index)
    }

    /// Feed visibility samples from the host and return the current page.
    pub fn handle_samples<I>(&mut self, samples: I) -> Option<PageIndex>
    where
        I: IntoIterator<Item = VisibilitySample>,
    {
        for event in self.tracker.record(samples) {
            if !event.became_visible {
                self.controller.on_visibility_lost(event.page_index);
                continue;
            }
            if self.controller.on_visibility_crossed(event.page_index) == CrossingOutcome::Applied {
                log::trace!("page {} became current", event.page_index);
            }
        }

        self.controller.current_page()
    }

    pub fn scroll_settled(&mut self, generation: u64) -> bool {
        self.controller.scroll_settled(generation)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn tracker(&self) -> &PageVisibilityTracker {
        &self.tracker
    }

    pub fn controller(&self) -> &CurrentPageController {
        &self.controller
    }
}

impl PageNavigator<ScrollView> {
    /// Sample the scroll view at its current position
    pub fn sync_visibility(&mut self) -> Option<PageIndex> {
        let samples = self.host.samples();
        self.handle_samples(samples)
    }

    /// Advance the scroll animation by one frame and process what it reveals.
    ///
    /// Returns true while the view is still moving.
    pub fn tick(&mut self, delta_time: Duration) -> bool {
        let moved = self.host.update(delta_time);
        self.sync_visibility();
        if let Some(generation) = self.host.take_settled() {
            self.scroll_settled(generation);
        }
        moved
    }
}
