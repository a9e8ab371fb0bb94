//! Current page coordination
//!
//! Two producers write the current page: explicit navigation requests and
//! visibility crossings reported by [`crate::PageVisibilityTracker`]. A smooth
//! scroll towards a distant page sweeps past every page in between, and each
//! of those pages crosses the visibility threshold on the way. The controller
//! keeps such crossings from overwriting the navigation target.

use crate::config::ViewerConfig;
use crate::PageIndex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long a programmatic scroll suppresses crossings for other pages
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_millis(600);

/// Navigation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("page {page} is out of range (document has {page_count} pages)")]
    OutOfRange { page: PageIndex, page_count: u32 },

    #[error("no document is loaded")]
    NoDocument,
}

/// How visibility crossings interact with an in-flight navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationGuard {
    /// Every crossing is applied immediately; last event wins
    Unguarded,

    /// While a navigation is pending only the target page's crossing applies
    #[default]
    Generation,
}

/// What to do with a navigation request past the last page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutOfRangePolicy {
    #[default]
    Reject,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// Imperative request for the host to bring a page container into view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollCommand {
    pub page_index: PageIndex,
    pub behavior: ScrollBehavior,
    /// Identifies the navigation; echoed back through `scroll_settled`
    pub generation: u64,
}

/// Result of feeding one visibility crossing to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingOutcome {
    /// The crossing became the current page
    Applied,

    /// A navigation to another page is in flight
    Suppressed,

    /// No document, or the page is outside it
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct PendingNavigation {
    target: PageIndex,
    generation: u64,
    started_at: Instant,
}

/// Single authoritative "current page" for one viewing session
#[derive(Debug, Clone)]
pub struct CurrentPageController {
    current_page: Option<PageIndex>,
    page_count: u32,
    guard: NavigationGuard,
    out_of_range: OutOfRangePolicy,
    suppression_window: Duration,
    pending: Option<PendingNavigation>,
    /// Pages whose crossing was held back by the pending navigation and
    /// that are still visible, oldest first
    suppressed: Vec<PageIndex>,
    last_generation: u64,
}

impl CurrentPageController {
    pub fn new() -> Self {
        Self {
            current_page: None,
            page_count: 0,
            guard: NavigationGuard::default(),
            out_of_range: OutOfRangePolicy::default(),
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
            pending: None,
            suppressed: Vec::new(),
            last_generation: 0,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new()
            .with_guard(config.navigation_guard)
            .with_out_of_range(config.out_of_range)
            .with_suppression_window(config.suppression_window())
    }

    pub fn with_guard(mut self, guard: NavigationGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.out_of_range = policy;
        self
    }

    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = window;
        self
    }

    pub fn current_page(&self) -> Option<PageIndex> {
        self.current_page_at(Instant::now())
    }

    /// Current page as of `now`. Once a pending navigation has timed out the
    /// most recent suppressed page that is still visible takes over.
    pub fn current_page_at(&self, now: Instant) -> Option<PageIndex> {
        match self.pending {
            Some(pending) if self.expired(&pending, now) => {
                self.suppressed.last().copied().or(self.current_page)
            }
            _ => self.current_page,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn guard(&self) -> NavigationGuard {
        self.guard
    }

    /// Start over for a newly loaded document. The first page becomes current.
    pub fn reset(&mut self, page_count: u32) {
        self.page_count = page_count;
        self.current_page = (page_count > 0).then_some(0);
        self.pending = None;
        self.suppressed.clear();
    }

    /// Forget the document entirely
    pub fn clear(&mut self) {
        self.reset(0);
    }

    pub fn is_navigating(&self) -> bool {
        self.is_navigating_at(Instant::now())
    }

    pub fn is_navigating_at(&self, now: Instant) -> bool {
        self.pending.is_some_and(|pending| !self.expired(&pending, now))
    }

    /// Make `page_index` current and ask the host to scroll to it smoothly.
    pub fn navigate_to(&mut self, page_index: PageIndex) -> Result<ScrollCommand, NavigationError> {
        self.navigate_at(page_index, ScrollBehavior::Smooth, Instant::now())
    }

    /// Like [`navigate_to`](Self::navigate_to) without the scroll animation
    pub fn jump_to(&mut self, page_index: PageIndex) -> Result<ScrollCommand, NavigationError> {
        self.navigate_at(page_index, ScrollBehavior::Instant, Instant::now())
    }

    pub fn navigate_at(
        &mut self,
        page_index: PageIndex,
        behavior: ScrollBehavior,
        now: Instant,
    ) -> Result<ScrollCommand, NavigationError> {
        let target = self.resolve(page_index)?;

        self.last_generation += 1;
        let generation = self.last_generation;
        self.current_page = Some(target);
        self.pending = Some(PendingNavigation { target, generation, started_at: now });
        self.suppressed.clear();

        log::debug!("navigate to page {target} (generation {generation})");
        Ok(ScrollCommand { page_index: target, behavior, generation })
    }

    /// Navigate one page forward. `None` on the last page or without a document.
    pub fn next_page(&mut self) -> Option<ScrollCommand> {
        self.expire_at(Instant::now());
        let current = self.current_page?;
        if current + 1 >= self.page_count {
            return None;
        }
        self.navigate_to(current + 1).ok()
    }

    /// Navigate one page back. `None` on the first page or without a document.
    pub fn previous_page(&mut self) -> Option<ScrollCommand> {
        self.expire_at(Instant::now());
        let current = self.current_page?;
        if current == 0 {
            return None;
        }
        self.navigate_to(current - 1).ok()
    }

    pub fn on_visibility_crossed(&mut self, page_index: PageIndex) -> CrossingOutcome {
        self.on_visibility_crossed_at(page_index, Instant::now())
    }

    pub fn on_visibility_crossed_at(&mut self, page_index: PageIndex, now: Instant) -> CrossingOutcome {
        if page_index >= self.page_count {
            return CrossingOutcome::Ignored;
        }

        if self.guard == NavigationGuard::Generation {
            if let Some(pending) = self.pending {
                if self.expired(&pending, now) {
                    log::trace!("navigation {} timed out", pending.generation);
                } else if pending.target != page_index {
                    log::trace!(
                        "suppressed crossing for page {page_index} while navigating to {}",
                        pending.target
                    );
                    self.suppressed.retain(|&page| page != page_index);
                    self.suppressed.push(page_index);
                    return CrossingOutcome::Suppressed;
                }
                self.pending = None;
                self.suppressed.clear();
            }
        }

        self.current_page = Some(page_index);
        CrossingOutcome::Applied
    }

    /// A page dropped back below the visibility threshold.
    pub fn on_visibility_lost(&mut self, page_index: PageIndex) {
        self.suppressed.retain(|&page| page != page_index);
    }

    /// The host finished the scroll for `generation`.
    ///
    /// If the view was moved elsewhere before the target came into view, the
    /// latest suppressed page that is still visible becomes current. Returns
    /// `false` when that navigation is no longer the pending one.
    pub fn scroll_settled(&mut self, generation: u64) -> bool {
        match self.pending {
            Some(pending) if pending.generation == generation => {
                self.finish_pending();
                true
            }
            _ => false,
        }
    }

    fn expire_at(&mut self, now: Instant) {
        if self.pending.is_some_and(|pending| self.expired(&pending, now)) {
            self.finish_pending();
        }
    }

    fn finish_pending(&mut self) {
        self.pending = None;
        if let Some(page) = self.suppressed.pop() {
            log::debug!("navigation interrupted, page {page} is current");
            self.current_page = Some(page);
        }
        self.suppressed.clear();
    }

    fn resolve(&self, page_index: PageIndex) -> Result<PageIndex, NavigationError> {
        if self.page_count == 0 {
            return Err(NavigationError::NoDocument);
        }
        if page_index < self.page_count {
            return Ok(page_index);
        }

        match self.out_of_range {
            OutOfRangePolicy::Reject => {
                Err(NavigationError::OutOfRange { page: page_index, page_count: self.page_count })
            }
            OutOfRangePolicy::Clamp => Ok(self.page_count - 1),
        }
    }

    fn expired(&self, pending: &PendingNavigation, now: Instant) -> bool {
        now.saturating_duration_since(pending.started_at) >= self.suppression_window
    }
}

impl Default for CurrentPageController {
    fn default() -> Self {
        Self::new()
    }
}
