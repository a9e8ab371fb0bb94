//! PDF Viewer Core Library
//!
//! Document loading and the viewing session built on top of it.

pub mod loader;
pub mod session;

pub use loader::{DocumentLoader, LoadError, LoadResult, LoadState, LoadSummary, LoaderOptions};
pub use session::ViewerSession;
