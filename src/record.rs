//! Raw position records as delivered by the mobility simulator.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One observed position of one entity.
///
/// Records are transient: they are read once, accumulated into a window's
/// cell stay-times and discarded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawPositionRecord {
    /// Stable identifier of the tracked entity.
    pub entity_id: String,
    /// Horizontal position in simulation units.
    pub x: f64,
    /// Vertical position in simulation units.
    pub y: f64,
    /// Simulation time of the observation.
    pub timestamp: f64,
}

impl RawPositionRecord {
    /// Creates a new record.
    pub fn new(entity_id: impl Into<String>, x: f64, y: f64, timestamp: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            x,
            y,
            timestamp,
        }
    }

    /// Rejects records with non-finite fields or an empty identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRecord`] describing the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.is_empty() {
            return Err(PipelineError::invalid_record("empty entity identifier"));
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(PipelineError::invalid_record(format!(
                "entity '{}' has non-finite position ({}, {})",
                self.entity_id, self.x, self.y
            )));
        }
        if !self.timestamp.is_finite() {
            return Err(PipelineError::invalid_record(format!(
                "entity '{}' has non-finite timestamp {}",
                self.entity_id, self.timestamp
            )));
        }
        Ok(())
    }
}
