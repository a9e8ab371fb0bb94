//! Threshold-based page visibility tracking
//!
//! The tracker turns raw visibility fractions reported by the host into
//! discrete "page became visible" events. It never decides which page is
//! current; that belongs to [`crate::CurrentPageController`].

use crate::config::ConfigError;
use crate::PageIndex;
use std::collections::BTreeMap;

/// Default fraction of a page that must be visible to count as visible
pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.5;

/// Visible fraction of one page container, in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilitySample {
    pub page_index: PageIndex,
    pub fraction: f32,
}

impl VisibilitySample {
    /// Create a sample, clamping `fraction` into `[0, 1]` (NaN counts as hidden)
    pub fn new(page_index: PageIndex, fraction: f32) -> Self {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        Self { page_index, fraction }
    }
}

/// A threshold crossing for one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityEvent {
    pub page_index: PageIndex,
    pub became_visible: bool,
}

/// Long-lived observer over the current set of page containers
#[derive(Debug, Clone)]
pub struct PageVisibilityTracker {
    threshold: f32,
    /// Observed pages and whether each is currently at or above the threshold
    observed: BTreeMap<PageIndex, bool>,
}

impl PageVisibilityTracker {
    /// Create a tracker. `threshold` must lie in `[0, 1]`.
    pub fn new(threshold: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        Ok(Self { threshold, observed: BTreeMap::new() })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Re-target the tracker at a new set of page containers.
    ///
    /// Every page starts out below the threshold, so the first sample at or
    /// above it produces an event.
    pub fn observe<I>(&mut self, pages: I)
    where
        I: IntoIterator<Item = PageIndex>,
    {
        self.observed = pages.into_iter().map(|page| (page, false)).collect();
        log::debug!("observing {} page containers", self.observed.len());
    }

    pub fn unobserve_all(&mut self) {
        self.observed.clear();
    }

    pub fn is_observing(&self, page_index: PageIndex) -> bool {
        self.observed.contains_key(&page_index)
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Whether the last sample for a page was at or above the threshold
    pub fn is_visible(&self, page_index: PageIndex) -> bool {
        self.observed.get(&page_index).copied().unwrap_or(false)
    }

    /// Feed a batch of samples and collect threshold crossings in sample order.
    ///
    /// Samples for pages that are not observed are ignored. A page that drops
    /// below the threshold reports `became_visible: false` and is re-armed for
    /// its next upward crossing.
    pub fn record<I>(&mut self, samples: I) -> Vec<VisibilityEvent>
    where
        I: IntoIterator<Item = VisibilitySample>,
    {
        let mut events = Vec::new();

        for sample in samples {
            let Some(above) = self.observed.get_mut(&sample.page_index) else {
                continue;
            };

            let now_above = sample.fraction >= self.threshold;
            if now_above != *above {
                events.push(VisibilityEvent {
                    page_index: sample.page_index,
                    became_visible: now_above,
                });
            }
            *above = now_above;
        }

        events
    }
}

impl Default for PageVisibilityTracker {
    fn default() -> Self {
        Self { threshold: DEFAULT_VISIBILITY_THRESHOLD, observed: BTreeMap::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(fractions: &[(u32, f32)]) -> Vec<VisibilitySample> {
        fractions.iter().map(|&(page, fraction)| VisibilitySample::new(page, fraction)).collect()
    }

    fn pages(events: &[VisibilityEvent]) -> Vec<u32> {
        events.iter().filter(|event| event.became_visible).map(|event| event.page_index).collect()
    }

    #[test]
    fn threshold_must_be_a_fraction() {
        assert!(PageVisibilityTracker::new(0.0).is_ok());
        assert!(PageVisibilityTracker::new(1.0).is_ok());
        assert!(matches!(PageVisibilityTracker::new(1.5), Err(ConfigError::InvalidThreshold(_))));
        assert!(PageVisibilityTracker::new(-0.1).is_err());
        assert!(PageVisibilityTracker::new(f32::NAN).is_err());
    }

    #[test]
    fn reports_each_crossing_once() {
        let mut tracker = PageVisibilityTracker::default();
        tracker.observe(0..3);

        let events = tracker.record(samples(&[(0, 0.2), (1, 0.6), (2, 0.1)]));
        assert_eq!(events, vec![VisibilityEvent { page_index: 1, became_visible: true }]);

        // still above: no repeat
        assert!(tracker.record(samples(&[(1, 0.9)])).is_empty());
        assert!(tracker.is_visible(1));
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut tracker = PageVisibilityTracker::default();
        tracker.observe([4]);

        assert_eq!(pages(&tracker.record(samples(&[(4, 0.5)]))), vec![4]);
    }

    #[test]
    fn dropping_below_rearms_a_page() {
        let mut tracker = PageVisibilityTracker::default();
        tracker.observe(0..2);

        assert_eq!(pages(&tracker.record(samples(&[(0, 1.0)]))), vec![0]);
        assert_eq!(
            tracker.record(samples(&[(0, 0.3)])),
            vec![VisibilityEvent { page_index: 0, became_visible: false }]
        );
        assert!(!tracker.is_visible(0));
        assert_eq!(pages(&tracker.record(samples(&[(0, 0.7)]))), vec![0]);
    }

    #[test]
    fn simultaneous_crossings_keep_sample_order() {
        let mut tracker = PageVisibilityTracker::new(0.25).unwrap();
        tracker.observe(0..4);

        let events = tracker.record(samples(&[(2, 0.4), (1, 0.3), (3, 0.1)]));
        assert_eq!(pages(&events), vec![2, 1]);
    }

    #[test]
    fn unobserved_pages_are_ignored() {
        let mut tracker = PageVisibilityTracker::default();
        tracker.observe(0..2);

        assert!(tracker.record(samples(&[(5, 1.0)])).is_empty());
        assert!(!tracker.is_observing(5));
    }

    #[test]
    fn retargeting_resets_state() {
        let mut tracker = PageVisibilityTracker::default();
        tracker.observe(0..3);
        tracker.record(samples(&[(0, 1.0)]));

        tracker.observe(0..2);
        assert_eq!(tracker.observed_count(), 2);
        assert!(!tracker.is_observing(2));
        assert_eq!(pages(&tracker.record(samples(&[(0, 1.0)]))), vec![0]);

        tracker.unobserve_all();
        assert!(tracker.record(samples(&[(1, 1.0)])).is_empty());
    }

    #[test]
    fn samples_are_clamped() {
        assert_eq!(VisibilitySample::new(0, 1.7).fraction, 1.0);
        assert_eq!(VisibilitySample::new(0, -3.0).fraction, 0.0);
        assert_eq!(VisibilitySample::new(0, f32::NAN).fraction, 0.0);
    }
}
