//! Durable per-entity displacement matrices.
//!
//! Every entity owns one append-only table: one row per closed window, one
//! column per grid cell. Row `i` of a table always holds window `i`, so a
//! table's row count is the index of the next window it can accept.
//!
//! Two back ends implement [`MatrixStore`]:
//!
//! - [`MemoryStore`]: flat row arenas behind an entity-keyed ordered map.
//! - [`FileStore`]: one comma-separated table per entity on disk, mirrored
//!   in memory so reads never touch the file system.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// Column and row counts of one entity's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHandle {
    /// Fixed number of columns, `width * height`.
    pub cells: usize,
    /// Number of committed rows.
    pub rows: usize,
}

/// Entity-keyed, append-only storage of displacement rows.
///
/// Appends to one entity's table must come from a single logical writer in
/// window order. Readers only ever observe fully committed rows.
pub trait MatrixStore {
    /// Number of columns every table carries.
    fn cells(&self) -> usize;

    /// Returns the entity's table state, creating an empty table if absent.
    ///
    /// # Errors
    ///
    /// Storage errors, or a persisted table that cannot be parsed.
    fn get_or_create(&mut self, entity_id: &str) -> Result<TableHandle>;

    /// Appends one row to the entity's table, creating the table if needed.
    ///
    /// # Errors
    ///
    /// [`DimensionMismatch`](crate::PipelineError::DimensionMismatch) if
    /// `row.len() != cells()`, checked before anything is written, or a
    /// storage error. A failed append leaves the table unchanged.
    fn append_row(&mut self, entity_id: &str, row: &[f64]) -> Result<()>;

    /// Rows for windows `[start_window, end_window)` in ascending order.
    ///
    /// Empty when the range is empty, the entity has no table, or the table
    /// has fewer than `end_window` rows.
    fn read_range(&self, entity_id: &str, start_window: u64, end_window: u64) -> Vec<&[f64]>;

    /// Committed rows for an entity, 0 when it has no table.
    fn row_count(&self, entity_id: &str) -> usize;

    /// Known entities in lexicographic order.
    fn entities(&self) -> Vec<String>;

    /// Whether the entity has a table.
    fn contains(&self, entity_id: &str) -> bool;
}

/// Converts a window range to row bounds, or `None` if it cannot be served.
pub(crate) fn row_bounds(rows: usize, start_window: u64, end_window: u64) -> Option<(usize, usize)> {
    let start = usize::try_from(start_window).ok()?;
    let end = usize::try_from(end_window).ok()?;
    (start < end && end <= rows).then_some((start, end))
}
