use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::{row_bounds, MatrixStore, TableHandle};
use crate::error::{PipelineError, Result};
use crate::grid::SpatialGrid;

/// One entity's rows, stored contiguously with a stride of `cells`.
#[derive(Debug, Clone, Default)]
pub(crate) struct RowArena {
    data: Vec<f64>,
    rows: usize,
}

impl RowArena {
    pub(crate) fn push(&mut self, row: &[f64]) {
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    pub(crate) const fn rows(&self) -> usize {
        self.rows
    }

    fn slice(&self, cells: usize, start: usize, end: usize) -> Vec<&[f64]> {
        if cells == 0 {
            return vec![&[][..]; end - start];
        }
        self.data[start * cells..end * cells].chunks_exact(cells).collect()
    }
}

/// In-memory [`MatrixStore`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    cells: usize,
    tables: BTreeMap<String, RowArena>,
}

impl MemoryStore {
    /// Store whose tables carry `cells` columns.
    #[must_use]
    pub fn new(cells: usize) -> Self {
        Self {
            cells,
            tables: BTreeMap::new(),
        }
    }

    /// Store sized for a grid.
    #[must_use]
    pub fn for_grid(grid: &SpatialGrid) -> Self {
        Self::new(grid.cells())
    }

    pub(crate) fn check_len(&self, entity_id: &str, row: &[f64]) -> Result<()> {
        if row.len() == self.cells {
            Ok(())
        } else {
            Err(PipelineError::dimension_mismatch(entity_id, self.cells, row.len()))
        }
    }

    pub(crate) fn insert_table(&mut self, entity_id: &str, arena: RowArena) {
        self.tables.insert(entity_id.to_owned(), arena);
    }

    pub(crate) fn handle(&self, entity_id: &str) -> Option<TableHandle> {
        self.tables.get(entity_id).map(|t| TableHandle {
            cells: self.cells,
            rows: t.rows(),
        })
    }

    /// Appends a row whose length has already been checked.
    pub(crate) fn push_unchecked(&mut self, entity_id: &str, row: &[f64]) {
        self.tables.entry(entity_id.to_owned()).or_default().push(row);
    }
}

impl MatrixStore for MemoryStore {
    fn cells(&self) -> usize {
        self.cells
    }

    fn get_or_create(&mut self, entity_id: &str) -> Result<TableHandle> {
        if !self.tables.contains_key(entity_id) {
            debug!(entity = entity_id, cells = self.cells, "created table");
            self.tables.insert(entity_id.to_owned(), RowArena::default());
        }
        Ok(TableHandle {
            cells: self.cells,
            rows: self.row_count(entity_id),
        })
    }

    fn append_row(&mut self, entity_id: &str, row: &[f64]) -> Result<()> {
        self.check_len(entity_id, row)?;
        self.get_or_create(entity_id)?;
        self.push_unchecked(entity_id, row);
        trace!(entity = entity_id, rows = self.row_count(entity_id), "appended row");
        Ok(())
    }

    fn read_range(&self, entity_id: &str, start_window: u64, end_window: u64) -> Vec<&[f64]> {
        let Some(table) = self.tables.get(entity_id) else {
            return Vec::new();
        };
        match row_bounds(table.rows(), start_window, end_window) {
            Some((start, end)) => table.slice(self.cells, start, end),
            None => Vec::new(),
        }
    }

    fn row_count(&self, entity_id: &str) -> usize {
        self.tables.get(entity_id).map_or(0, RowArena::rows)
    }

    fn entities(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn contains(&self, entity_id: &str) -> bool {
        self.tables.contains_key(entity_id)
    }
}
