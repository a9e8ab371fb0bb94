//! Headless scroll container
//!
//! [`ScrollView`] stands in for the host UI: it owns the page layout and the
//! scroll position, animates programmatic scrolls, and reports how much of
//! each page is visible.

use crate::controller::{ScrollBehavior, ScrollCommand};
use crate::geometry::ViewportState;
use crate::navigator::ViewerHost;
use crate::visibility::VisibilitySample;
use std::time::Duration;

/// Frame duration the interpolation speed is expressed in
const FRAME: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone)]
pub struct ScrollView {
    layout: ViewportState,

    /// Where the animation is heading
    target_offset: f32,

    /// Fraction of the remaining distance covered per 60 Hz frame
    interpolation_speed: f32,

    /// Navigation the running animation belongs to
    pending_generation: Option<u64>,

    /// Navigation whose scroll has finished but was not collected yet
    settled_generation: Option<u64>,
}

impl ScrollView {
    pub fn new(layout: ViewportState) -> Self {
        let target_offset = layout.scroll_offset_px.clamp(0.0, layout.max_scroll_offset());
        Self {
            layout: ViewportState { scroll_offset_px: target_offset, ..layout },
            target_offset,
            interpolation_speed: 0.15,
            pending_generation: None,
            settled_generation: None,
        }
    }

    /// Evenly sized pages, the common case for a freshly loaded document
    pub fn uniform(page_count: u32, page_height_px: f32, spacing_px: f32, viewport_height_px: f32) -> Self {
        let heights = vec![page_height_px; page_count as usize];
        Self::new(ViewportState::new(heights, spacing_px, viewport_height_px))
    }

    pub fn with_interpolation_speed(mut self, speed: f32) -> Self {
        self.interpolation_speed = speed.clamp(0.01, 1.0);
        self
    }

    pub fn layout(&self) -> &ViewportState {
        &self.layout
    }

    /// Replace the page layout, keeping the scroll position where possible
    pub fn set_layout(&mut self, layout: ViewportState) {
        let max_scroll = layout.max_scroll_offset();
        let offset = self.layout.scroll_offset_px.clamp(0.0, max_scroll);
        self.target_offset = self.target_offset.clamp(0.0, max_scroll);
        self.layout = ViewportState { scroll_offset_px: offset, ..layout };
    }

    pub fn scroll_offset(&self) -> f32 {
        self.layout.scroll_offset_px
    }

    pub fn target_scroll_offset(&self) -> f32 {
        self.target_offset
    }

    pub fn is_animating(&self) -> bool {
        (self.layout.scroll_offset_px - self.target_offset).abs() > 0.5
    }

    /// Scroll to an offset with smooth animation
    pub fn scroll_to(&mut self, offset: f32) {
        self.target_offset = offset.clamp(0.0, self.layout.max_scroll_offset());
    }

    /// Jump to an offset without animation.
    ///
    /// This is how user scrolling reaches the view, so it also finishes any
    /// programmatic scroll in progress.
    pub fn scroll_immediate(&mut self, offset: f32) {
        let offset = offset.clamp(0.0, self.layout.max_scroll_offset());
        self.layout.scroll_offset_px = offset;
        self.target_offset = offset;
        self.finish_pending();
    }

    pub fn scroll_by(&mut self, delta: f32) {
        self.scroll_immediate(self.layout.scroll_offset_px + delta);
    }

    /// Advance the animation (call every frame).
    ///
    /// Returns true if the scroll position changed.
    pub fn update(&mut self, delta_time: Duration) -> bool {
        let offset_diff = self.target_offset - self.layout.scroll_offset_px;
        let mut changed = false;

        if offset_diff.abs() > 0.5 {
            let frames = delta_time.as_secs_f32() / FRAME.as_secs_f32();
            let step = 1.0 - (1.0 - self.interpolation_speed).powf(frames);
            let new_offset = self.layout.scroll_offset_px + offset_diff * step;
            self.layout.scroll_offset_px = new_offset.clamp(0.0, self.layout.max_scroll_offset());
            changed = true;
        } else if offset_diff.abs() > 0.01 {
            // snap when very close
            self.layout.scroll_offset_px = self.target_offset;
            changed = true;
        }

        if (self.target_offset - self.layout.scroll_offset_px).abs() <= 0.01 {
            self.finish_pending();
        }

        changed
    }

    /// Visible fraction of every page at the current position
    pub fn samples(&self) -> Vec<VisibilitySample> {
        self.layout.visibility_samples()
    }

    /// Generation of a programmatic scroll that has come to rest, at most once
    pub fn take_settled(&mut self) -> Option<u64> {
        self.settled_generation.take()
    }

    fn finish_pending(&mut self) {
        if let Some(generation) = self.pending_generation.take() {
            self.settled_generation = Some(generation);
        }
    }
}

impl Default for ScrollView {
    fn default() -> Self {
        Self::new(ViewportState::default())
    }
}

impl ViewerHost for ScrollView {
    fn scroll_into_view(&mut self, command: &ScrollCommand) {
        let offset = self.layout.scroll_offset_for_page(command.page_index);

        // a newer command replaces the running one without settling it
        self.pending_generation = Some(command.generation);
        self.settled_generation = None;

        match command.behavior {
            ScrollBehavior::Smooth => self.scroll_to(offset),
            ScrollBehavior::Instant => self.scroll_immediate(offset),
        }
    }
}
