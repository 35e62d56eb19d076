//! Per-entity, per-window accumulation of cell stay-times.
//!
//! For one entity and one closed window, the builder walks the window's
//! records in time order and credits each record's cell with the time elapsed
//! since the previous record. The first record is credited with a fixed
//! one-unit dwell, so its contribution is always bounded. The vector is then
//! normalized and appended to the entity's table.
//!
//! Row `i` of a table always holds window `i`. When an entity's table is
//! behind the window being appended, the missing windows are filled with the
//! normalized zero vector (the entity was absent for them).

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::grid::SpatialGrid;
use crate::normalize::Normalizer;
use crate::record::RawPositionRecord;
use crate::store::MatrixStore;

/// Dwell credited to the first record of a window.
pub const FIRST_RECORD_DWELL: f64 = 1.0;

/// How one entity's row for one window came about.
#[derive(Debug)]
pub enum AppendOutcome {
    /// Accumulated from this many records.
    Observed { records: usize },
    /// No records: the normalized zero vector was stored.
    Absent,
    /// The record set was rejected; the normalized zero vector was stored.
    Rejected(PipelineError),
}

/// Summary of one window's commit across entities.
#[derive(Debug, Default)]
pub struct WindowReport {
    pub window: u64,
    /// Rows accumulated from records.
    pub observed: usize,
    /// Rows stored as the zero vector because the entity had no records.
    pub absent: usize,
    /// Earlier windows zero-filled for entities whose tables lagged behind.
    pub backfilled: usize,
    /// Entity/window pairs whose record sets were rejected.
    pub rejected: Vec<PipelineError>,
    /// Entities skipped because an earlier, interrupted commit already
    /// stored their row.
    pub resumed: usize,
}

impl WindowReport {
    /// Rows appended for `window` itself by this commit.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.observed + self.absent + self.rejected.len()
    }
}

/// Builds displacement rows and appends them to a [`MatrixStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementMatrixBuilder {
    grid: SpatialGrid,
    normalizer: Normalizer,
}

impl DisplacementMatrixBuilder {
    #[must_use]
    pub const fn new(grid: SpatialGrid, normalizer: Normalizer) -> Self {
        Self { grid, normalizer }
    }

    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(
            SpatialGrid::from_config(config)?,
            Normalizer::from_config(config)?,
        ))
    }

    #[must_use]
    pub const fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    #[must_use]
    pub const fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Raw cell stay-times for one entity's records in one window.
    ///
    /// Records must already be restricted to the window and ordered by time;
    /// no window filtering happens here.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::MalformedSequence`] if a timestamp does not strictly
    ///   increase over its predecessor.
    /// - [`PipelineError::InvalidRecord`] for non-finite values or a record of
    ///   another entity.
    pub fn accumulate(
        &self,
        entity_id: &str,
        window: u64,
        records: &[RawPositionRecord],
    ) -> Result<Vec<f64>> {
        let mut stay = vec![0.0; self.grid.cells()];
        let Some(first) = records.first() else {
            return Ok(stay);
        };

        let mut previous = first.timestamp - FIRST_RECORD_DWELL;
        for (index, record) in records.iter().enumerate() {
            record.validate()?;
            if record.entity_id != entity_id {
                return Err(PipelineError::invalid_record(format!(
                    "record of '{}' handed to the builder for '{entity_id}'",
                    record.entity_id
                )));
            }
            let delta = record.timestamp - previous;
            if delta.is_nan() || delta <= 0.0 {
                return Err(PipelineError::malformed_sequence(entity_id, window, index, delta));
            }
            stay[self.grid.cell_of(record.x, record.y)] += delta;
            previous = record.timestamp;
        }
        Ok(stay)
    }

    /// Normalized row for one entity's records in one window.
    ///
    /// # Errors
    ///
    /// Same as [`accumulate`](Self::accumulate).
    pub fn build_row(&self, entity_id: &str, window: u64, records: &[RawPositionRecord]) -> Result<Vec<f64>> {
        let mut row = self.accumulate(entity_id, window, records)?;
        self.normalizer.normalize_in_place(&mut row);
        Ok(row)
    }

    /// The normalized zero vector stored for absent entities.
    #[must_use]
    pub fn zero_row(&self) -> Vec<f64> {
        self.normalizer.normalize(&vec![0.0; self.grid.cells()])
    }

    /// Builds and appends one entity's row for `window`.
    ///
    /// Rejected record sets are stored as the zero vector and reported in the
    /// outcome; only storage and ordering failures are returned as errors.
    ///
    /// # Errors
    ///
    /// [`PipelineError::WindowAlreadyClosed`] if the entity's table already
    /// holds `window`, or any storage error.
    pub fn append_window<S: MatrixStore + ?Sized>(
        &self,
        store: &mut S,
        entity_id: &str,
        window: u64,
        records: &[RawPositionRecord],
    ) -> Result<AppendOutcome> {
        let built = self.build_row(entity_id, window, records);
        let zero = self.zero_row();
        self.commit(store, entity_id, window, built, records.len(), &zero)
            .map(|(outcome, _)| outcome)
    }

    /// Builds rows for every entity of one window in parallel, then appends
    /// them in the given order.
    ///
    /// Every entity that should receive a row for `window` must be listed,
    /// with an empty record slice when it was absent.
    ///
    /// Entities whose table already holds `window` are skipped, so a call
    /// that failed partway can be repeated with the same batches and picks up
    /// where it stopped.
    ///
    /// # Errors
    ///
    /// The first ordering or storage failure. Rows appended before the
    /// failure stay committed.
    pub fn commit_window<S: MatrixStore + ?Sized>(
        &self,
        store: &mut S,
        window: u64,
        batches: &[(&str, &[RawPositionRecord])],
    ) -> Result<WindowReport> {
        let built: Vec<Result<Vec<f64>>> = batches
            .par_iter()
            .map(|(entity, records)| self.build_row(entity, window, records))
            .collect();

        let zero = self.zero_row();
        let mut report = WindowReport {
            window,
            ..WindowReport::default()
        };
        for ((entity, records), row) in batches.iter().zip(built) {
            if store.row_count(entity) as u64 == window + 1 {
                report.resumed += 1;
                continue;
            }
            let (outcome, backfilled) = self.commit(store, entity, window, row, records.len(), &zero)?;
            report.backfilled += backfilled;
            match outcome {
                AppendOutcome::Observed { .. } => report.observed += 1,
                AppendOutcome::Absent => report.absent += 1,
                AppendOutcome::Rejected(err) => report.rejected.push(err),
            }
        }
        debug!(
            window,
            observed = report.observed,
            absent = report.absent,
            rejected = report.rejected.len(),
            resumed = report.resumed,
            "committed window"
        );
        Ok(report)
    }

    fn commit<S: MatrixStore + ?Sized>(
        &self,
        store: &mut S,
        entity_id: &str,
        window: u64,
        built: Result<Vec<f64>>,
        n_records: usize,
        zero: &[f64],
    ) -> Result<(AppendOutcome, usize)> {
        let next = store.get_or_create(entity_id)?.rows as u64;
        if window < next {
            return Err(PipelineError::window_already_closed(entity_id, window, next));
        }
        for _ in next..window {
            store.append_row(entity_id, zero)?;
        }
        let backfilled = (window - next) as usize;
        if backfilled > 0 {
            debug!(entity = entity_id, from = next, to = window, "zero-filled missing windows");
        }

        let outcome = match built {
            Ok(row) => {
                store.append_row(entity_id, &row)?;
                if n_records == 0 {
                    AppendOutcome::Absent
                } else {
                    AppendOutcome::Observed { records: n_records }
                }
            }
            Err(err) if err.is_recoverable() => {
                warn!(entity = entity_id, window, error = %err, "rejected window records");
                store.append_row(entity_id, zero)?;
                AppendOutcome::Rejected(err)
            }
            Err(err) => return Err(err),
        };
        Ok((outcome, backfilled))
    }
}
