//! PDF Viewer Render Library
//!
//! Turns one page of an open document into a pair of encoded images: a
//! lossless full-quality image and a lossy preview at the same pixel size.

pub mod encode;
pub mod page;

pub use encode::{EncodedImage, ImageEncoding};
pub use page::{
    PageRenderer, RenderError, RenderResult, RenderedPage, DEFAULT_PREVIEW_QUALITY, DEFAULT_SCALE,
};
