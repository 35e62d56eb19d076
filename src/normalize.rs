//! Row-level normalization of accumulated cell stay-times.
//!
//! Both strategies are pure and total over a fixed-length vector: the output
//! always has the input's length and never contains `NaN` or infinities.
//!
//! | Strategy | Output range | Constant input |
//! |----------|--------------|----------------|
//! | Logit | `[logit(eps), logit(1-eps)]` | constant output |
//! | Min-max | `[0, 1]` | all zeros |

use crate::config::{NormalizationStrategy, PipelineConfig};
use crate::error::{PipelineError, Result};

/// Applies the configured [`NormalizationStrategy`] to displacement rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    strategy: NormalizationStrategy,
    temporal_resolution: f64,
}

impl Normalizer {
    /// # Errors
    ///
    /// Returns an error if the temporal resolution is not positive or the
    /// logit epsilon lies outside `(0, 0.5)`.
    pub fn new(strategy: NormalizationStrategy, temporal_resolution: f64) -> Result<Self> {
        if !(temporal_resolution.is_finite() && temporal_resolution > 0.0) {
            return Err(PipelineError::invalid_config(
                "temporal resolution must be positive and finite",
            ));
        }
        if let NormalizationStrategy::Logit { epsilon } = strategy {
            if !(epsilon > 0.0 && epsilon < 0.5) {
                return Err(PipelineError::invalid_config("logit epsilon must lie in (0, 0.5)"));
            }
        }
        Ok(Self {
            strategy,
            temporal_resolution,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.normalization, config.temporal_resolution)
    }

    #[must_use]
    pub const fn strategy(&self) -> NormalizationStrategy {
        self.strategy
    }

    /// Normalizes a raw stay-time row into a new vector.
    #[must_use]
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        let mut row = raw.to_vec();
        self.normalize_in_place(&mut row);
        row
    }

    /// Normalizes a raw stay-time row in place.
    pub fn normalize_in_place(&self, row: &mut [f64]) {
        match self.strategy {
            NormalizationStrategy::Logit { epsilon } => {
                logit_in_place(row, self.temporal_resolution, epsilon);
            }
            NormalizationStrategy::MinMax => min_max_in_place(row),
        }
    }
}

/// `ln(p / (1 - p))`.
#[must_use]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Divides by the temporal resolution, clips into `[epsilon, 1 - epsilon]`
/// and applies [`logit`].
pub fn logit_in_place(row: &mut [f64], temporal_resolution: f64, epsilon: f64) {
    for v in row.iter_mut() {
        let p = *v / temporal_resolution;
        let p = if p.is_nan() { epsilon } else { p.clamp(epsilon, 1.0 - epsilon) };
        *v = logit(p);
    }
}

/// Rescales by the row's own range; a constant row becomes all zeros.
pub fn min_max_in_place(row: &mut [f64]) {
    let Some((min, max)) = row_range(row) else {
        return;
    };
    let span = max - min;
    if span > 0.0 && span.is_finite() {
        for v in row.iter_mut() {
            *v = (*v - min) / span;
        }
    } else {
        row.fill(0.0);
    }
}

/// `(min, max)` of a row, or `None` when it is empty.
#[must_use]
pub fn row_range(row: &[f64]) -> Option<(f64, f64)> {
    let first = *row.first()?;
    Some(
        row.iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}
