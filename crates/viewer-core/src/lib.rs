//! Viewer state shared by every front end
//!
//! Keeps the current page in sync with both scroll-to-page navigation and
//! what is actually visible in the viewport.

pub mod config;
pub mod controller;
pub mod geometry;
pub mod navigator;
pub mod scroll;
pub mod visibility;

/// Zero-based page index
pub type PageIndex = u32;

pub use config::{ConfigError, LoadPolicy, ViewerConfig};
pub use controller::{
    CrossingOutcome, CurrentPageController, NavigationError, NavigationGuard, OutOfRangePolicy,
    ScrollBehavior, ScrollCommand, DEFAULT_SUPPRESSION_WINDOW,
};
pub use geometry::ViewportState;
pub use navigator::{PageNavigator, ViewerHost};
pub use scroll::ScrollView;
pub use visibility::{
    PageVisibilityTracker, VisibilityEvent, VisibilitySample, DEFAULT_VISIBILITY_THRESHOLD,
};
