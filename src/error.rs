//! Error types for displacement matrix operations.
//!
//! Data-quality conditions (malformed or stale records) are recoverable and
//! only reduce the data available for one window. Storage failures are fatal
//! and propagate to the caller untouched.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the aggregation pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A row does not match the table's configured cell count.
    #[error("Dimension mismatch for entity '{entity}': expected {expected} cells, got {actual}")]
    DimensionMismatch {
        entity: String,
        expected: usize,
        actual: usize,
    },

    /// Timestamps within one entity/window record set are not strictly increasing.
    #[error(
        "Malformed sequence for entity '{entity}' in window {window}: \
         non-positive time delta {delta} at record {index}"
    )]
    MalformedSequence {
        entity: String,
        window: u64,
        index: usize,
        delta: f64,
    },

    /// A record arrived for a window that has already been closed.
    #[error("Stale record for entity '{entity}': window {window} is before open window {open_window}")]
    StaleRecord {
        entity: String,
        window: u64,
        open_window: u64,
    },

    /// A row was offered for a window the entity's table has already passed.
    #[error("Window {window} already closed for entity '{entity}': next window is {next_window}")]
    WindowAlreadyClosed {
        entity: String,
        window: u64,
        next_window: u64,
    },

    /// A record carries non-finite values or an unusable identifier.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A persisted table could not be parsed.
    #[error("Corrupt table {path} at line {line}: {reason}")]
    CorruptTable {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Sample array assembly failed.
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Storage I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a dimension mismatch error.
    #[must_use]
    pub fn dimension_mismatch(entity: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            entity: entity.into(),
            expected,
            actual,
        }
    }

    /// Create a malformed sequence error.
    #[must_use]
    pub fn malformed_sequence(entity: impl Into<String>, window: u64, index: usize, delta: f64) -> Self {
        Self::MalformedSequence {
            entity: entity.into(),
            window,
            index,
            delta,
        }
    }

    /// Create a stale record error.
    #[must_use]
    pub fn stale_record(entity: impl Into<String>, window: u64, open_window: u64) -> Self {
        Self::StaleRecord {
            entity: entity.into(),
            window,
            open_window,
        }
    }

    /// Create a window already closed error.
    #[must_use]
    pub fn window_already_closed(entity: impl Into<String>, window: u64, next_window: u64) -> Self {
        Self::WindowAlreadyClosed {
            entity: entity.into(),
            window,
            next_window,
        }
    }

    /// Create an invalid record error.
    #[must_use]
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a corrupt table error.
    #[must_use]
    pub fn corrupt_table(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::CorruptTable {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Whether the condition only affects one entity/window and the run may continue.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedSequence { .. } | Self::StaleRecord { .. } | Self::InvalidRecord(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::dimension_mismatch("veh7", 100, 99);
        let msg = err.to_string();
        assert!(msg.contains("veh7"));
        assert!(msg.contains("100"));
        assert!(msg.contains("99"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PipelineError::malformed_sequence("a", 3, 1, 0.0).is_recoverable());
        assert!(PipelineError::stale_record("a", 1, 2).is_recoverable());
        assert!(!PipelineError::dimension_mismatch("a", 4, 3).is_recoverable());

        let io = PipelineError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(!io.is_recoverable());
    }
}
