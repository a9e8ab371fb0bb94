//! Viewer configuration
//!
//! One place for the knobs shared by the loader and the page navigator.
//! Configuration can be loaded from a TOML file, environment variables, or
//! built programmatically.

use crate::controller::{NavigationGuard, OutOfRangePolicy};
use crate::visibility::DEFAULT_VISIBILITY_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// How a batch page load reacts to a single failed page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// The first failed page fails the whole load
    #[default]
    FailFast,

    /// Failures are recorded per page and the load completes with the rest
    PerPage,
}

/// Configuration for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Visible fraction at which a page counts as visible
    pub threshold: f32,
    /// Render scale (pixels per PDF point)
    pub scale: f32,
    /// JPEG quality for preview images
    pub preview_quality: u8,
    /// How long a programmatic scroll suppresses other pages' crossings
    pub suppression_window_ms: u64,
    pub navigation_guard: NavigationGuard,
    pub out_of_range: OutOfRangePolicy,
    pub load_policy: LoadPolicy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VISIBILITY_THRESHOLD,
            scale: 2.0,
            preview_quality: 50,
            suppression_window_ms: 600,
            navigation_guard: NavigationGuard::default(),
            out_of_range: OutOfRangePolicy::default(),
            load_policy: LoadPolicy::default(),
        }
    }
}

impl ViewerConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_preview_quality(mut self, quality: u8) -> Self {
        self.preview_quality = quality;
        self
    }

    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_navigation_guard(mut self, guard: NavigationGuard) -> Self {
        self.navigation_guard = guard;
        self
    }

    pub fn with_out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.out_of_range = policy;
        self
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::invalid("scale", self.scale));
        }
        if !(1..=100).contains(&self.preview_quality) {
            return Err(ConfigError::invalid("preview_quality", self.preview_quality));
        }
        Ok(())
    }

    /// Loads configuration from environment variables, starting from defaults.
    ///
    /// Environment variables:
    /// - `PDF_VIEWER_THRESHOLD`: visibility threshold (default: 0.5)
    /// - `PDF_VIEWER_SCALE`: render scale (default: 2.0)
    /// - `PDF_VIEWER_PREVIEW_QUALITY`: preview JPEG quality (default: 50)
    /// - `PDF_VIEWER_SUPPRESSION_MS`: navigation suppression window (default: 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("PDF_VIEWER_THRESHOLD") {
            config.threshold = parse_env("PDF_VIEWER_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("PDF_VIEWER_SCALE") {
            config.scale = parse_env("PDF_VIEWER_SCALE", &value)?;
        }
        if let Some(value) = lookup("PDF_VIEWER_PREVIEW_QUALITY") {
            config.preview_quality = parse_env("PDF_VIEWER_PREVIEW_QUALITY", &value)?;
        }
        if let Some(value) = lookup("PDF_VIEWER_SUPPRESSION_MS") {
            config.suppression_window_ms = parse_env("PDF_VIEWER_SUPPRESSION_MS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Missing keys keep their defaults:
    /// ```toml
    /// threshold = 0.5
    /// scale = 2.0
    /// preview_quality = 50
    /// suppression_window_ms = 600
    /// navigation_guard = "generation"
    /// out_of_range = "reject"
    /// load_policy = "fail-fast"
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string(self)?;
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::invalid(key, value))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("visibility threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("invalid value for configuration key {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString) -> Self {
        Self::InvalidValue { key: key.to_owned(), value: value.to_string() }
    }
}
