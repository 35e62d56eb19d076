//! End-to-end tests for windowed displacement matrix aggregation.
//!
//! These run the scenarios from the grid through the store to the assembled
//! dataset, against both the in-memory and the file-backed store.

use approx::assert_relative_eq;
use displacement_matrix::normalize::logit;
use displacement_matrix::{
    is_degenerate, Boundary, DisplacementMatrixBuilder, FileStore, MatrixStore, MemoryStore,
    NormalizationStrategy, PipelineConfig, PipelineError, RawPositionRecord, SampleExtractor,
    SpatialGrid, TraceWindower, WindowIndexer, WindowedDatasetAssembler, DEFAULT_LOGIT_EPSILON,
    FIRST_RECORD_DWELL,
};
use tempfile::tempdir;

// =============================================================================
// FIXTURES
// =============================================================================

fn config(strategy: NormalizationStrategy) -> PipelineConfig {
    PipelineConfig::default()
        .with_boundary(Boundary::new(0.0, 0.0, 100.0, 100.0))
        .with_spatial_resolution(10.0)
        .with_temporal_resolution(60.0)
        .with_normalization(strategy)
}

/// Entity circling around `center` with one record per second.
fn generate_loop(entity: &str, center: (f64, f64), radius: f64, start: f64, seconds: u32) -> Vec<RawPositionRecord> {
    (0..seconds)
        .map(|i| {
            let t = start + f64::from(i);
            let angle = 2.0 * std::f64::consts::PI * f64::from(i) / 45.0;
            RawPositionRecord::new(entity, center.0 + radius * angle.cos(), center.1 + radius * angle.sin(), t)
        })
        .collect()
}

// =============================================================================
// GRID AND WINDOW PROPERTIES
// =============================================================================

#[test]
fn test_cells_in_range_within_boundary() {
    let grid = SpatialGrid::from_config(&config(NormalizationStrategy::MinMax)).unwrap();
    for xi in 0..=200 {
        for yi in 0..=200 {
            let x = f64::from(xi) * 0.5;
            let y = f64::from(yi) * 0.5;
            assert!(grid.cell_of(x, y) < grid.cells());
        }
    }
}

#[test]
fn test_window_index_steps_by_one() {
    let indexer = WindowIndexer::new(60.0).unwrap();
    for i in 0..500 {
        let t = f64::from(i) * 1.5;
        let a = indexer.window_of(t);
        let b = indexer.window_of(t + 60.0);
        assert_eq!(b, a + 1);
    }
}

// =============================================================================
// SPECIFIED SCENARIOS
// =============================================================================

#[test]
fn test_single_record_scenario_logit() {
    let cfg = config(NormalizationStrategy::logit());
    let builder = DisplacementMatrixBuilder::from_config(&cfg).unwrap();
    assert_eq!(builder.grid().width(), 10);
    assert_eq!(builder.grid().height(), 10);
    assert_eq!(builder.grid().cell_of(55.0, 5.0), 50);

    let mut store = MemoryStore::for_grid(builder.grid());
    let record = RawPositionRecord::new("e1", 55.0, 5.0, 120.0);
    let window = WindowIndexer::new(60.0).unwrap().window_of(record.timestamp);
    assert_eq!(window, 2);

    builder.append_window(&mut store, "e1", window, &[record]).unwrap();
    let row = store.read_range("e1", 2, 3)[0];
    assert_relative_eq!(row[50], logit(FIRST_RECORD_DWELL / 60.0), epsilon = 1e-12);
    let floor = logit(DEFAULT_LOGIT_EPSILON);
    for (i, &v) in row.iter().enumerate() {
        assert!(v.is_finite());
        if i != 50 {
            assert_eq!(v, floor);
        }
    }
}

#[test]
fn test_single_record_scenario_min_max() {
    let builder = DisplacementMatrixBuilder::from_config(&config(NormalizationStrategy::MinMax)).unwrap();
    let row = builder
        .build_row("e1", 2, &[RawPositionRecord::new("e1", 55.0, 5.0, 120.0)])
        .unwrap();
    assert_eq!(row[50], 1.0);
    assert_eq!(row.iter().filter(|&&v| v == 0.0).count(), 99);
}

#[test]
fn test_absent_entity_excluded_under_min_max() {
    let builder = DisplacementMatrixBuilder::from_config(&config(NormalizationStrategy::MinMax)).unwrap();
    let mut store = MemoryStore::for_grid(builder.grid());
    builder.append_window(&mut store, "idle", 0, &[]).unwrap();

    let row = store.read_range("idle", 0, 1)[0];
    assert!(row.iter().all(|&v| v == 0.0));

    let extractor = SampleExtractor::for_grid(builder.grid());
    assert!(extractor.extract(&store, "idle", 0, 1).unwrap().is_none());
}

#[test]
fn test_two_entities_one_empty() {
    let builder = DisplacementMatrixBuilder::from_config(&config(NormalizationStrategy::logit())).unwrap();
    let mut store = MemoryStore::for_grid(builder.grid());

    let moving = generate_loop("mover", (50.0, 50.0), 20.0, 0.0, 180);
    for window in 0..3u64 {
        let in_window: Vec<_> = moving
            .iter()
            .filter(|r| (r.timestamp / 60.0).floor() as u64 == window)
            .cloned()
            .collect();
        builder.append_window(&mut store, "mover", window, &in_window).unwrap();
        builder.append_window(&mut store, "parked", window, &[]).unwrap();
    }

    let dataset = WindowedDatasetAssembler::for_grid(builder.grid())
        .assemble(&store, 0, 3)
        .unwrap();
    assert_eq!(dataset.entities, vec!["mover"]);
    assert_eq!(dataset.indices, vec![0]);
    let (n, w, h, c) = dataset.samples[0].dim();
    assert!(n <= 3);
    assert_eq!((w, h, c), (10, 10, 1));
}

// =============================================================================
// STORE CONTRACT (BOTH BACK ENDS)
// =============================================================================

fn check_store_contract<S: MatrixStore>(store: &mut S) {
    let cells = store.cells();
    let rows: Vec<Vec<f64>> = (0..6)
        .map(|i| (0..cells).map(|c| f64::from(i) * 0.1 + c as f64 * 1e-3).collect())
        .collect();

    for (w, row) in rows.iter().enumerate() {
        store.append_row("e1", row).unwrap();
        let read = store.read_range("e1", w as u64, w as u64 + 1);
        assert_eq!(read, vec![row.as_slice()]);
    }

    let all = store.read_range("e1", 0, 6);
    assert_eq!(all.len(), 6);
    for (read, written) in all.iter().zip(&rows) {
        assert_eq!(*read, written.as_slice());
    }

    assert!(matches!(
        store.append_row("e1", &[0.0]),
        Err(PipelineError::DimensionMismatch { .. })
    ));
    assert_eq!(store.row_count("e1"), 6);
    assert!(store.read_range("e1", 4, 7).is_empty());
    assert!(store.read_range("nobody", 0, 1).is_empty());
}

#[test]
fn test_memory_store_contract() {
    check_store_contract(&mut MemoryStore::new(12));
}

#[test]
fn test_file_store_contract() {
    let dir = tempdir().unwrap();
    check_store_contract(&mut FileStore::open(dir.path(), 12).unwrap());
}

// =============================================================================
// STREAMING RUNS
// =============================================================================

fn stream_run<S: MatrixStore + Sync>(store: S) -> TraceWindower<S> {
    let mut windower = TraceWindower::new(&config(NormalizationStrategy::logit()), store).unwrap();
    let mut records = generate_loop("veh1", (30.0, 30.0), 15.0, 0.0, 300);
    records.extend(generate_loop("veh0", (70.0, 60.0), 25.0, 130.0, 170));
    records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    windower.push_batch(records).unwrap();
    windower.finish().unwrap();
    windower
}

#[test]
fn test_streaming_rows_align_with_windows() {
    let windower = stream_run(MemoryStore::new(100));
    assert_eq!(windower.open_window(), 5);
    assert_eq!(windower.store().row_count("veh0"), 5);
    assert_eq!(windower.store().row_count("veh1"), 5);

    let zero = windower.builder().zero_row();
    let early = windower.store().read_range("veh0", 0, 2);
    assert!(early.iter().all(|row| *row == zero.as_slice()));

    let dataset = windower.dataset(0, 5).unwrap();
    assert_eq!(dataset.entities, vec!["veh0", "veh1"]);
    assert_eq!(dataset.samples[1].dim().0, 5);
    assert!(dataset.samples[0].dim().0 <= 3);
    for samples in &dataset.samples {
        for sample in samples.outer_iter() {
            let flat: Vec<f64> = sample.iter().copied().collect();
            assert!(!is_degenerate(&flat));
        }
    }
}

#[test]
fn test_file_and_memory_runs_agree() {
    let dir = tempdir().unwrap();
    let mem = stream_run(MemoryStore::new(100));
    let file = stream_run(FileStore::open(dir.path(), 100).unwrap());

    assert_eq!(mem.dataset(0, 5).unwrap(), file.dataset(0, 5).unwrap());

    let mut reopened = FileStore::open(dir.path(), 100).unwrap();
    reopened.get_or_create("veh1").unwrap();
    assert_eq!(
        reopened.read_range("veh1", 0, 5),
        mem.store().read_range("veh1", 0, 5)
    );
}

#[test]
fn test_malformed_window_does_not_corrupt_history() {
    let mut windower = TraceWindower::new(&config(NormalizationStrategy::MinMax), MemoryStore::new(100)).unwrap();
    windower.push(RawPositionRecord::new("e1", 5.0, 5.0, 1.0)).unwrap();
    windower.push(RawPositionRecord::new("e1", 15.0, 5.0, 30.0)).unwrap();
    windower.push(RawPositionRecord::new("e1", 55.0, 5.0, 61.0)).unwrap();
    windower.push(RawPositionRecord::new("e1", 65.0, 5.0, 61.0)).unwrap();

    let report = windower.finish().unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert!(report.rejected[0].is_recoverable());

    let store = windower.store();
    assert_eq!(store.row_count("e1"), 2);
    assert!(!is_degenerate(store.read_range("e1", 0, 1)[0]));
    assert!(is_degenerate(store.read_range("e1", 1, 2)[0]));
}

#[test]
fn test_file_store_accepts_any_record_identifier() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path(), 100).unwrap();
    let mut windower = TraceWindower::new(&config(NormalizationStrategy::MinMax), store).unwrap();
    windower.push(RawPositionRecord::new("veh/1", 55.0, 5.0, 1.0)).unwrap();
    windower.push(RawPositionRecord::new(".veh2", 5.0, 5.0, 2.0)).unwrap();
    let report = windower.finish().unwrap();
    assert_eq!(report.observed, 2);

    let mut reopened = FileStore::open(dir.path(), 100).unwrap();
    assert_eq!(reopened.get_or_create("veh/1").unwrap().rows, 1);
    assert_eq!(reopened.read_range("veh/1", 0, 1)[0][50], 1.0);
    assert_eq!(reopened.get_or_create(".veh2").unwrap().rows, 1);
}
