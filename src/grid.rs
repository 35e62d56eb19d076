//! Spatial discretization of continuous positions into grid cells.
//!
//! Cells are laid out column-major over the boundary: the flat index of the
//! cell at `(x_index, y_index)` is `x_index * height + y_index`, so reshaping
//! a row into a row-major `(width, height)` array puts `x` on the first axis.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{Boundary, PipelineConfig};
use crate::error::{PipelineError, Result};

/// Fixed grid over a boundary with square cells of `resolution` units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialGrid {
    boundary: Boundary,
    resolution: f64,
    width: usize,
    height: usize,
}

impl SpatialGrid {
    /// Creates a grid with `width = floor(span_x / resolution)` and
    /// `height = floor(span_y / resolution)`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the resolution is not
    /// positive or either dimension would be zero.
    pub fn new(boundary: Boundary, resolution: f64) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(PipelineError::invalid_config(
                "spatial resolution must be positive and finite",
            ));
        }
        let width = cells_along(boundary.span_x(), resolution);
        let height = cells_along(boundary.span_y(), resolution);
        Self::with_dims(boundary, resolution, width, height)
    }

    /// Grid for a validated pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.boundary, config.spatial_resolution)
    }

    /// Grid whose boundary is grown on its max edges until both dimensions
    /// are multiples of `multiple`.
    ///
    /// Convolutional encoders halve the input once per layer, so callers
    /// typically pass `2^layers`.
    ///
    /// # Errors
    ///
    /// Returns an error if `multiple` is zero or the base grid is invalid.
    pub fn aligned(boundary: Boundary, resolution: f64, multiple: usize) -> Result<Self> {
        if multiple == 0 {
            return Err(PipelineError::invalid_config("alignment multiple must be at least 1"));
        }
        let base = Self::new(boundary, resolution)?;
        let width = base.width.div_ceil(multiple) * multiple;
        let height = base.height.div_ceil(multiple) * multiple;
        let grown = Boundary::new(
            boundary.min_x,
            boundary.min_y,
            boundary.min_x + width as f64 * resolution,
            boundary.min_y + height as f64 * resolution,
        );
        Self::with_dims(grown, resolution, width, height)
    }

    fn with_dims(boundary: Boundary, resolution: f64, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::invalid_config(format!(
                "grid over {boundary:?} at resolution {resolution} has zero cells ({width}x{height})"
            )));
        }
        Ok(Self {
            boundary,
            resolution,
            width,
            height,
        })
    }

    /// Number of cells along x.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of cells along y.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells, the length of every displacement row.
    #[must_use]
    pub const fn cells(&self) -> usize {
        self.width * self.height
    }

    #[must_use]
    pub const fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    #[must_use]
    pub const fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Flat cell index of a position.
    ///
    /// Positions outside the boundary are clamped onto the nearest edge cell;
    /// the simulator may report positions marginally outside it.
    #[must_use]
    pub fn cell_of(&self, x: f64, y: f64) -> usize {
        let x_index = axis_index(x - self.boundary.min_x, self.resolution, self.width);
        let y_index = axis_index(y - self.boundary.min_y, self.resolution, self.height);
        x_index * self.height + y_index
    }

    /// Inverse of [`cell_of`](Self::cell_of): `(x_index, y_index)` of a flat index.
    #[must_use]
    pub const fn cell_coords(&self, cell: usize) -> Option<(usize, usize)> {
        if cell >= self.cells() {
            return None;
        }
        Some((cell / self.height, cell % self.height))
    }
}

fn cells_along(span: f64, resolution: f64) -> usize {
    let n = (span / resolution).floor();
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

fn axis_index(offset: f64, resolution: f64, len: usize) -> usize {
    let raw = (offset / resolution).floor();
    // NaN and negatives saturate to 0 on the cast.
    (raw.max(0.0) as usize).min(len - 1)
}
