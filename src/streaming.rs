//! Streaming windower for time-ordered simulator output.
//!
//! This module provides [`TraceWindower`], which buffers the records of the
//! currently open window and materializes rows only for windows that can no
//! longer receive records.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::builder::{DisplacementMatrixBuilder, WindowReport};
use crate::config::PipelineConfig;
use crate::dataset::{Dataset, WindowedDatasetAssembler};
use crate::error::{PipelineError, Result};
use crate::record::RawPositionRecord;
use crate::store::MatrixStore;
use crate::window::WindowIndexer;

/// Groups a record stream into windows and commits closed windows.
///
/// A window is closed when the first record of a later window arrives, or by
/// an explicit [`finish`](Self::finish). On closure every entity seen so far
/// receives exactly one row for that window; entities without records in it
/// get the normalized zero vector.
///
/// # Example
///
/// ```
/// use displacement_matrix::{
///     Boundary, MemoryStore, PipelineConfig, RawPositionRecord, TraceWindower,
/// };
///
/// let config = PipelineConfig::default()
///     .with_boundary(Boundary::new(0.0, 0.0, 100.0, 100.0))
///     .with_spatial_resolution(10.0)
///     .with_temporal_resolution(60.0);
/// let mut windower = TraceWindower::new(&config, MemoryStore::new(100))?;
///
/// windower.push(RawPositionRecord::new("veh0", 12.0, 40.0, 5.0))?;
/// windower.push(RawPositionRecord::new("veh0", 18.0, 41.0, 30.0))?;
/// // Opens window 1 and closes window 0.
/// let reports = windower.push(RawPositionRecord::new("veh0", 25.0, 44.0, 61.0))?;
/// assert_eq!(reports.len(), 1);
/// assert_eq!(windower.open_window(), 1);
/// # Ok::<(), displacement_matrix::PipelineError>(())
/// ```
#[derive(Debug)]
pub struct TraceWindower<S> {
    builder: DisplacementMatrixBuilder,
    indexer: WindowIndexer,
    store: S,

    /// Index of the window currently receiving records.
    open_window: u64,

    /// Records of the open window, per entity.
    pending: BTreeMap<String, Vec<RawPositionRecord>>,

    /// Every entity seen so far.
    known: BTreeSet<String>,
}

impl<S: MatrixStore> TraceWindower<S> {
    /// Creates a windower writing into `store`, starting at window 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate or the store's
    /// column count differs from the configured grid.
    pub fn new(config: &PipelineConfig, store: S) -> Result<Self> {
        let builder = DisplacementMatrixBuilder::from_config(config)?;
        let indexer = WindowIndexer::new(config.temporal_resolution)?;
        Self::with_parts(builder, indexer, store)
    }

    /// Creates a windower from prebuilt components.
    ///
    /// # Errors
    ///
    /// Returns an error if the store's column count differs from the grid.
    pub fn with_parts(builder: DisplacementMatrixBuilder, indexer: WindowIndexer, store: S) -> Result<Self> {
        if store.cells() != builder.grid().cells() {
            return Err(PipelineError::invalid_config(format!(
                "store has {} columns but the grid has {} cells",
                store.cells(),
                builder.grid().cells()
            )));
        }
        Ok(Self {
            builder,
            indexer,
            store,
            open_window: 0,
            pending: BTreeMap::new(),
            known: BTreeSet::new(),
        })
    }

    /// Adds one record, closing every window before the record's window.
    ///
    /// Returns one report per window closed by this call, oldest first.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidRecord`] for non-finite fields.
    /// - [`PipelineError::StaleRecord`] if the record's window is already closed.
    /// - Any storage failure while committing closed windows. The record is
    ///   not buffered then; windows closed before the failure stay closed and
    ///   pushing the record again resumes at the failed window.
    pub fn push(&mut self, record: RawPositionRecord) -> Result<Vec<WindowReport>> {
        record.validate()?;
        let window = self.indexer.window_of(record.timestamp);
        if window < self.open_window {
            return Err(PipelineError::stale_record(record.entity_id, window, self.open_window));
        }

        let mut reports = Vec::new();
        while self.open_window < window {
            reports.push(self.close_open_window()?);
        }

        self.known.insert(record.entity_id.clone());
        self.pending.entry(record.entity_id.clone()).or_default().push(record);
        Ok(reports)
    }

    /// Adds records in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Same as [`push`](Self::push).
    pub fn push_batch<I>(&mut self, records: I) -> Result<Vec<WindowReport>>
    where
        I: IntoIterator<Item = RawPositionRecord>,
    {
        let mut reports = Vec::new();
        for record in records {
            reports.extend(self.push(record)?);
        }
        Ok(reports)
    }

    /// Closes the open window, e.g. at the end of a simulation run.
    ///
    /// # Errors
    ///
    /// Any storage failure while committing the window. The window stays
    /// open with its records buffered, so the call can be retried.
    pub fn finish(&mut self) -> Result<WindowReport> {
        self.close_open_window()
    }

    // Buffered records are only dropped once the commit succeeded; a failed
    // close leaves the windower as it was, apart from rows already stored,
    // which the next attempt skips.
    fn close_open_window(&mut self) -> Result<WindowReport> {
        let window = self.open_window;
        let batches: Vec<(&str, &[RawPositionRecord])> = self
            .known
            .iter()
            .map(|id| (id.as_str(), self.pending.get(id).map_or(&[][..], Vec::as_slice)))
            .collect();

        let report = self.builder.commit_window(&mut self.store, window, &batches)?;
        let entities = batches.len();
        self.pending.clear();
        self.open_window += 1;
        debug!(window, entities, "closed window");
        Ok(report)
    }

    /// Samples for closed windows `[start_window, end_window)`.
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn dataset(&self, start_window: u64, end_window: u64) -> Result<Dataset>
    where
        S: Sync,
    {
        WindowedDatasetAssembler::for_grid(self.builder.grid()).assemble(&self.store, start_window, end_window)
    }

    /// Index of the window currently receiving records; also the number of
    /// closed windows.
    #[must_use]
    pub const fn open_window(&self) -> u64 {
        self.open_window
    }

    /// Records buffered for the open window.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Entities seen so far, in lexicographic order.
    pub fn known_entities(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    #[must_use]
    pub const fn builder(&self) -> &DisplacementMatrixBuilder {
        &self.builder
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the windower, dropping records of the open window.
    pub fn into_store(self) -> S {
        self.store
    }
}
