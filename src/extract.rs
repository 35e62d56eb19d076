//! Extraction of learning-ready sample tensors from stored rows.
//!
//! A window range of one entity's table becomes an array of shape
//! `(n_samples, width, height, 1)`. Rows without spatial variation carry no
//! signal and are dropped.

use ndarray::{Array2, Array4};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::grid::SpatialGrid;
use crate::normalize::row_range;
use crate::store::MatrixStore;

/// Whether a row has no spatial variation (its min equals its max).
#[must_use]
pub fn is_degenerate(row: &[f64]) -> bool {
    row_range(row).map_or(true, |(min, max)| min == max)
}

/// Reshapes and filters one entity's rows into a sample tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleExtractor {
    width: usize,
    height: usize,
}

impl SampleExtractor {
    #[must_use]
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn for_grid(grid: &SpatialGrid) -> Self {
        Self::new(grid.width(), grid.height())
    }

    #[must_use]
    pub const fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Reshapes a flat row into its `(width, height)` grid.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the row does not hold `width * height` values.
    pub fn reshape(&self, row: &[f64]) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_vec((self.width, self.height), row.to_vec())?)
    }

    /// Samples for windows `[start_window, end_window)` of one entity.
    ///
    /// Returns `None` when no non-degenerate row is available, including when
    /// the entity has no table or too few rows.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DimensionMismatch`] if the store's tables do not match
    /// this extractor's grid.
    pub fn extract<S: MatrixStore + ?Sized>(
        &self,
        store: &S,
        entity_id: &str,
        start_window: u64,
        end_window: u64,
    ) -> Result<Option<Array4<f64>>> {
        if store.cells() != self.cells() {
            return Err(PipelineError::dimension_mismatch(entity_id, self.cells(), store.cells()));
        }

        let rows = store.read_range(entity_id, start_window, end_window);
        let mut flat = Vec::with_capacity(rows.len() * self.cells());
        let mut n_samples = 0;
        for row in rows.iter().filter(|r| !is_degenerate(r)) {
            flat.extend_from_slice(row);
            n_samples += 1;
        }
        debug!(
            entity = entity_id,
            start_window,
            end_window,
            read = rows.len(),
            kept = n_samples,
            "extracted samples"
        );

        if n_samples == 0 {
            return Ok(None);
        }
        let samples = Array4::from_shape_vec((n_samples, self.width, self.height, 1), flat)?;
        Ok(Some(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_is_degenerate() {
        assert!(is_degenerate(&[0.0, 0.0, 0.0]));
        assert!(is_degenerate(&[-34.5; 4]));
        assert!(is_degenerate(&[]));
        assert!(!is_degenerate(&[0.0, 1.0]));
    }

    #[test]
    fn test_reshape_puts_x_first() {
        let extractor = SampleExtractor::new(2, 3);
        let grid = extractor.reshape(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(grid.dim(), (2, 3));
        assert_eq!(grid[[1, 0]], 3.0);
        assert_eq!(grid[[0, 2]], 2.0);
        assert!(extractor.reshape(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_extract_filters_degenerate_rows() {
        let mut store = MemoryStore::new(4);
        store.append_row("e1", &[0.0, 1.0, 0.0, 0.0]).unwrap();
        store.append_row("e1", &[0.0; 4]).unwrap();
        store.append_row("e1", &[0.5, 0.5, 0.0, 1.0]).unwrap();

        let extractor = SampleExtractor::new(2, 2);
        let samples = extractor.extract(&store, "e1", 0, 3).unwrap().unwrap();
        assert_eq!(samples.dim(), (2, 2, 2, 1));
        assert_eq!(samples[[0, 0, 1, 0]], 1.0);
        assert_eq!(samples[[1, 1, 1, 0]], 1.0);
        assert_eq!(samples[[1, 0, 0, 0]], 0.5);
    }

    #[test]
    fn test_extract_empty_cases() {
        let mut store = MemoryStore::new(4);
        store.append_row("flat", &[0.3; 4]).unwrap();
        let extractor = SampleExtractor::new(2, 2);
        assert!(extractor.extract(&store, "flat", 0, 1).unwrap().is_none());
        assert!(extractor.extract(&store, "ghost", 0, 1).unwrap().is_none());
        assert!(extractor.extract(&store, "flat", 0, 2).unwrap().is_none());
    }

    #[test]
    fn test_extract_grid_mismatch() {
        let store = MemoryStore::new(9);
        let extractor = SampleExtractor::new(2, 2);
        assert!(matches!(
            extractor.extract(&store, "e1", 0, 1),
            Err(PipelineError::DimensionMismatch { expected: 4, actual: 9, .. })
        ));
    }
}
