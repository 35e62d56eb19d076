//! Configuration for the aggregation pipeline.
//!
//! This module provides [`PipelineConfig`], which centralizes the spatial
//! boundary, the spatial and temporal resolutions and the normalization
//! strategy. The values are supplied once at pipeline construction and never
//! change for the lifetime of a run.
//!
//! # Example
//!
//! ```
//! use displacement_matrix::{Boundary, NormalizationStrategy, PipelineConfig};
//!
//! let config = PipelineConfig::default()
//!     .with_boundary(Boundary::new(0.0, 0.0, 100.0, 100.0))
//!     .with_spatial_resolution(10.0)
//!     .with_temporal_resolution(60.0)
//!     .with_normalization(NormalizationStrategy::MinMax);
//! assert!(config.validate().is_ok());
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::record::RawPositionRecord;

/// Default clipping constant for the logit strategy.
pub const DEFAULT_LOGIT_EPSILON: f64 = 1e-15;

/// Axis-aligned spatial boundary of the simulated area.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Boundary {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Boundary {
    /// Creates a boundary from its corners.
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Tight bounding box of a record set, or `None` when it is empty.
    #[must_use]
    pub fn from_records(records: &[RawPositionRecord]) -> Option<Self> {
        let first = records.first()?;
        let init = Self::new(first.x, first.y, first.x, first.y);
        Some(records.iter().fold(init, |b, r| Self {
            min_x: b.min_x.min(r.x),
            min_y: b.min_y.min(r.y),
            max_x: b.max_x.max(r.x),
            max_y: b.max_y.max(r.y),
        }))
    }

    /// Whether `(x, y)` lies inside the boundary, edges included.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Horizontal extent.
    #[must_use]
    pub fn span_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Vertical extent.
    #[must_use]
    pub fn span_y(&self) -> f64 {
        self.max_y - self.min_y
    }

    fn is_finite(&self) -> bool {
        self.min_x.is_finite() && self.min_y.is_finite() && self.max_x.is_finite() && self.max_y.is_finite()
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1000.0, 1000.0)
    }
}

/// Row normalization strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NormalizationStrategy {
    /// Divide by the temporal resolution, clip to `[epsilon, 1 - epsilon]`
    /// and apply `ln(p / (1 - p))`.
    Logit {
        /// Clipping constant keeping the transform finite.
        epsilon: f64,
    },
    /// Rescale to `[0, 1]` by the row's own min and max.
    MinMax,
}

impl NormalizationStrategy {
    /// Logit strategy with the default clipping constant.
    #[must_use]
    pub const fn logit() -> Self {
        Self::Logit {
            epsilon: DEFAULT_LOGIT_EPSILON,
        }
    }
}

impl Default for NormalizationStrategy {
    fn default() -> Self {
        Self::logit()
    }
}

/// Configuration consumed at pipeline construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// Spatial boundary of the simulated area.
    pub boundary: Boundary,

    /// Edge length of one square cell, in simulation units.
    pub spatial_resolution: f64,

    /// Duration of one window, in simulation time units.
    pub temporal_resolution: f64,

    /// How accumulated stay-times are normalized before being stored.
    pub normalization: NormalizationStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            boundary: Boundary::default(),
            spatial_resolution: 10.0,
            temporal_resolution: 60.0,
            normalization: NormalizationStrategy::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration whose boundary is the bounding box of `records`.
    ///
    /// # Errors
    ///
    /// Returns an error if `records` is empty or the resulting configuration
    /// does not validate (e.g. all records share one coordinate).
    pub fn from_records(
        records: &[RawPositionRecord],
        spatial_resolution: f64,
        temporal_resolution: f64,
    ) -> Result<Self> {
        let boundary = Boundary::from_records(records)
            .ok_or_else(|| PipelineError::invalid_config("cannot derive a boundary from zero records"))?;
        let config = Self {
            boundary,
            spatial_resolution,
            temporal_resolution,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range or the grid
    /// would have zero cells.
    pub fn validate(&self) -> Result<()> {
        if !(self.spatial_resolution.is_finite() && self.spatial_resolution > 0.0) {
            return Err(PipelineError::invalid_config(
                "spatial_resolution must be positive and finite",
            ));
        }
        if !(self.temporal_resolution.is_finite() && self.temporal_resolution > 0.0) {
            return Err(PipelineError::invalid_config(
                "temporal_resolution must be positive and finite",
            ));
        }
        if !self.boundary.is_finite() {
            return Err(PipelineError::invalid_config("boundary must be finite"));
        }
        if self.boundary.span_x() < self.spatial_resolution || self.boundary.span_y() < self.spatial_resolution {
            return Err(PipelineError::invalid_config(format!(
                "boundary {:?} is smaller than one {} unit cell",
                self.boundary, self.spatial_resolution
            )));
        }
        if let NormalizationStrategy::Logit { epsilon } = self.normalization {
            if !(epsilon > 0.0 && epsilon < 0.5) {
                return Err(PipelineError::invalid_config("logit epsilon must lie in (0, 0.5)"));
            }
        }
        Ok(())
    }

    /// Set the spatial boundary.
    #[must_use]
    pub const fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Set the cell edge length.
    #[must_use]
    pub const fn with_spatial_resolution(mut self, resolution: f64) -> Self {
        self.spatial_resolution = resolution;
        self
    }

    /// Set the window duration.
    #[must_use]
    pub const fn with_temporal_resolution(mut self, resolution: f64) -> Self {
        self.temporal_resolution = resolution;
        self
    }

    /// Set the normalization strategy.
    #[must_use]
    pub const fn with_normalization(mut self, normalization: NormalizationStrategy) -> Self {
        self.normalization = normalization;
        self
    }
}
