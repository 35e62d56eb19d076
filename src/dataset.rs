//! Assembly of per-entity sample tensors into a training/inference batch.
//!
//! Entities are visited in lexicographic order of their identifiers, so two
//! calls over the same stored state and window range return the same
//! entities in the same positions. Sample counts differ between entities;
//! consumers must not assume a uniform first dimension.

use ndarray::Array4;
use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::extract::SampleExtractor;
use crate::grid::SpatialGrid;
use crate::store::MatrixStore;

/// Non-empty per-entity sample arrays and the entities they belong to.
///
/// `samples`, `entities` and `indices` are parallel. `indices` holds each
/// entity's position in the store's lexicographic entity order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub samples: Vec<Array4<f64>>,
    pub entities: Vec<String>,
    pub indices: Vec<usize>,
}

impl Dataset {
    /// Number of entities with at least one sample.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sum of sample counts over all entities.
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.samples.iter().map(|s| s.dim().0).sum()
    }

    /// `(entity, index, samples)` triples in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize, &Array4<f64>)> {
        self.entities
            .iter()
            .zip(&self.indices)
            .zip(&self.samples)
            .map(|((entity, &index), samples)| (entity.as_str(), index, samples))
    }
}

/// Runs the [`SampleExtractor`] over every known entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedDatasetAssembler {
    extractor: SampleExtractor,
}

impl WindowedDatasetAssembler {
    #[must_use]
    pub const fn new(extractor: SampleExtractor) -> Self {
        Self { extractor }
    }

    #[must_use]
    pub const fn for_grid(grid: &SpatialGrid) -> Self {
        Self::new(SampleExtractor::for_grid(grid))
    }

    #[must_use]
    pub const fn extractor(&self) -> &SampleExtractor {
        &self.extractor
    }

    /// Samples for windows `[start_window, end_window)` of every entity that
    /// has at least one non-degenerate row in the range.
    ///
    /// Entities are extracted in parallel; the result order is the store's
    /// lexicographic entity order regardless of scheduling.
    ///
    /// # Errors
    ///
    /// Propagates the first extraction error.
    pub fn assemble<S: MatrixStore + Sync + ?Sized>(
        &self,
        store: &S,
        start_window: u64,
        end_window: u64,
    ) -> Result<Dataset> {
        let entities = store.entities();
        let known = entities.len();
        let extracted: Vec<_> = entities
            .par_iter()
            .map(|entity| self.extractor.extract(store, entity, start_window, end_window))
            .collect::<Result<_>>()?;

        let mut dataset = Dataset::default();
        for (index, (entity, samples)) in entities.into_iter().zip(extracted).enumerate() {
            if let Some(samples) = samples {
                dataset.samples.push(samples);
                dataset.entities.push(entity);
                dataset.indices.push(index);
            }
        }
        debug!(
            start_window,
            end_window,
            known,
            included = dataset.len(),
            samples = dataset.total_samples(),
            "assembled dataset"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store_with(rows: &[(&str, [f64; 4])]) -> MemoryStore {
        let mut store = MemoryStore::new(4);
        for (id, row) in rows {
            store.append_row(id, row).unwrap();
        }
        store
    }

    #[test]
    fn test_assemble_skips_empty_entities() {
        let varied = [0.0, 1.0, 0.0, 0.0];
        let flat = [0.0; 4];
        let store = store_with(&[("b", varied), ("a", flat), ("c", varied), ("c", flat)]);
        let assembler = WindowedDatasetAssembler::new(SampleExtractor::new(2, 2));

        let ds = assembler.assemble(&store, 0, 1).unwrap();
        assert_eq!(ds.entities, vec!["b", "c"]);
        assert_eq!(ds.indices, vec![1, 2]);
        assert_eq!(ds.total_samples(), 2);

        let ds = assembler.assemble(&store, 0, 2).unwrap();
        assert_eq!(ds.entities, vec!["c"]);
        assert_eq!(ds.samples[0].dim(), (1, 2, 2, 1));
    }

    #[test]
    fn test_assemble_is_reproducible() {
        let mut store = MemoryStore::new(4);
        for i in 0..20 {
            let id = format!("veh{i}");
            for w in 0..3 {
                let v = f64::from(i * 3 + w);
                store.append_row(&id, &[v, 0.0, 0.0, 1.0]).unwrap();
            }
        }
        let assembler = WindowedDatasetAssembler::new(SampleExtractor::new(2, 2));
        let first = assembler.assemble(&store, 0, 3).unwrap();
        let second = assembler.assemble(&store, 0, 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
        assert_eq!(first.entities[0], "veh0");
        assert_eq!(first.entities[2], "veh10");
        assert!(first.iter().all(|(e, i, _)| store.entities()[i] == e));
    }

    #[test]
    fn test_assemble_empty_store() {
        let store = MemoryStore::new(4);
        let assembler = WindowedDatasetAssembler::new(SampleExtractor::new(2, 2));
        assert!(assembler.assemble(&store, 0, 5).unwrap().is_empty());
    }
}
