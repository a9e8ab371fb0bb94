use crate::visibility::VisibilitySample;
use crate::PageIndex;

/// Vertical layout of a continuous page list inside a scrolling viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub viewport_height_px: f32,
    pub scroll_offset_px: f32,
    pub page_heights_px: Vec<f32>,
    pub page_spacing_px: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            viewport_height_px: 800.0,
            scroll_offset_px: 0.0,
            page_heights_px: Vec::new(),
            page_spacing_px: 16.0,
        }
    }
}

impl ViewportState {
    pub fn new(page_heights_px: Vec<f32>, page_spacing_px: f32, viewport_height_px: f32) -> Self {
        Self { viewport_height_px, scroll_offset_px: 0.0, page_heights_px, page_spacing_px }
    }

    pub fn page_count(&self) -> u32 {
        self.page_heights_px.len() as u32
    }

    pub fn content_height(&self) -> f32 {
        let pages: f32 = self.page_heights_px.iter().sum();
        let gaps = self.page_heights_px.len().saturating_sub(1) as f32 * self.page_spacing_px;
        pages + gaps
    }

    pub fn max_scroll_offset(&self) -> f32 {
        (self.content_height() - self.viewport_height_px).max(0.0)
    }

    /// Top edge of a page in content coordinates. Past the last page this is
    /// where the next page would start.
    pub fn page_start_offset(&self, page_index: PageIndex) -> f32 {
        self.page_heights_px
            .iter()
            .take(page_index as usize)
            .map(|height| height + self.page_spacing_px)
            .sum()
    }

    /// Scroll offset that brings a page's top edge into view, clamped to the
    /// scrollable range.
    pub fn scroll_offset_for_page(&self, page_index: PageIndex) -> f32 {
        self.page_start_offset(page_index).min(self.max_scroll_offset())
    }

    /// Fraction of a page's own height currently inside the viewport.
    pub fn visible_fraction(&self, page_index: PageIndex) -> f32 {
        let Some(&height) = self.page_heights_px.get(page_index as usize) else {
            return 0.0;
        };
        if height <= 0.0 {
            return 0.0;
        }

        let top = self.page_start_offset(page_index);
        let bottom = top + height;
        let view_top = self.scroll_offset_px;
        let view_bottom = view_top + self.viewport_height_px;

        let overlap = (bottom.min(view_bottom) - top.max(view_top)).max(0.0);
        (overlap / height).clamp(0.0, 1.0)
    }

    /// One sample per page, in page order.
    pub fn visibility_samples(&self) -> Vec<VisibilitySample> {
        (0..self.page_count())
            .map(|page_index| VisibilitySample::new(page_index, self.visible_fraction(page_index)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_pages() -> ViewportState {
        ViewportState::new(vec![1000.0, 1000.0, 1000.0], 100.0, 1000.0)
    }

    #[test]
    fn visible_fraction_is_relative_to_page_height() {
        let state = ViewportState { scroll_offset_px: 1500.0, ..three_pages() };

        // page 1 spans 1100..2100, page 2 spans 2200..3200, viewport is 1500..2500
        assert_eq!(state.visible_fraction(0), 0.0);
        assert!((state.visible_fraction(1) - 0.6).abs() < 1e-6);
        assert!((state.visible_fraction(2) - 0.3).abs() < 1e-6);
        assert_eq!(state.visible_fraction(7), 0.0);
    }

    #[test]
    fn scroll_target_is_clamped_to_content() {
        let state = three_pages();

        assert_eq!(state.content_height(), 3200.0);
        assert_eq!(state.max_scroll_offset(), 2200.0);
        assert_eq!(state.scroll_offset_for_page(1), 1100.0);
        assert_eq!(state.scroll_offset_for_page(2), 2200.0);
        assert_eq!(state.page_start_offset(2), 2200.0);
    }

    #[test]
    fn samples_cover_every_page_in_order() {
        let samples = three_pages().visibility_samples();

        let pages: Vec<u32> = samples.iter().map(|sample| sample.page_index).collect();
        assert_eq!(pages, vec![0, 1, 2]);
        assert_eq!(samples[0].fraction, 1.0);
        assert_eq!(samples[1].fraction, 0.0);
    }

    #[test]
    fn empty_layout_has_no_scroll_range() {
        let state = ViewportState::default();

        assert_eq!(state.content_height(), 0.0);
        assert_eq!(state.max_scroll_offset(), 0.0);
        assert!(state.visibility_samples().is_empty());
        assert_eq!(state.page_start_offset(3), 0.0);
    }
}
