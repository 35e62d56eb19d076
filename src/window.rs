//! Mapping of simulation time onto fixed-duration windows.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One fixed-duration time bucket, `[start_time, end_time)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Window {
    pub index: u64,
    pub start_time: f64,
    pub end_time: f64,
}

impl Window {
    /// Whether `timestamp` falls inside this window.
    #[must_use]
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start_time && timestamp < self.end_time
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Maps timestamps to window indices for a fixed temporal resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowIndexer {
    temporal_resolution: f64,
}

impl WindowIndexer {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] unless the resolution is
    /// positive and finite.
    pub fn new(temporal_resolution: f64) -> Result<Self> {
        if !(temporal_resolution.is_finite() && temporal_resolution > 0.0) {
            return Err(PipelineError::invalid_config(
                "temporal resolution must be positive and finite",
            ));
        }
        Ok(Self { temporal_resolution })
    }

    #[must_use]
    pub const fn temporal_resolution(&self) -> f64 {
        self.temporal_resolution
    }

    /// `floor(timestamp / temporal_resolution)`; timestamps before zero map to window 0.
    #[must_use]
    pub fn window_of(&self, timestamp: f64) -> u64 {
        let w = (timestamp / self.temporal_resolution).floor();
        if w > 0.0 {
            w as u64
        } else {
            0
        }
    }

    /// Bounds of the window with the given index.
    #[must_use]
    pub fn window(&self, index: u64) -> Window {
        let start_time = index as f64 * self.temporal_resolution;
        Window {
            index,
            start_time,
            end_time: start_time + self.temporal_resolution,
        }
    }
}
