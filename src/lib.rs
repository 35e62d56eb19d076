//! Displacement Matrix Library
//!
//! Spatiotemporal aggregation of mobility traces into windowed displacement
//! matrices for learning pipelines.
//!
//! Raw `(entity, x, y, timestamp)` records from a mobility simulator are
//! discretized onto a fixed spatial grid and bucketed into fixed-duration
//! windows. For every entity and every closed window, the time spent in each
//! cell is accumulated, normalized and appended as one row of that entity's
//! displacement matrix. Window ranges of those matrices are then extracted as
//! `(n_samples, width, height, 1)` tensors for downstream training and
//! inference.
//!
//! # Features
//!
//! - **Incremental**: one row per entity per closed window, appended to an
//!   append-only store that survives across calls
//! - **Numerically safe**: logit normalization is clipped, min-max
//!   normalization of constant rows yields zeros
//! - **Deterministic batches**: entities are always visited in lexicographic
//!   order
//! - **Two stores**: in-memory arenas or one comma-separated table per entity
//!
//! # Quick Start
//!
//! ```
//! use displacement_matrix::{
//!     Boundary, DisplacementMatrixBuilder, MatrixStore, MemoryStore, NormalizationStrategy,
//!     PipelineConfig, RawPositionRecord, WindowedDatasetAssembler,
//! };
//!
//! let config = PipelineConfig::default()
//!     .with_boundary(Boundary::new(0.0, 0.0, 100.0, 100.0))
//!     .with_spatial_resolution(10.0)
//!     .with_temporal_resolution(60.0)
//!     .with_normalization(NormalizationStrategy::MinMax);
//!
//! let builder = DisplacementMatrixBuilder::from_config(&config)?;
//! let mut store = MemoryStore::for_grid(builder.grid());
//!
//! let records = vec![
//!     RawPositionRecord::new("veh0", 55.0, 5.0, 120.0),
//!     RawPositionRecord::new("veh0", 65.0, 5.0, 150.0),
//! ];
//! builder.append_window(&mut store, "veh0", 2, &records)?;
//! assert_eq!(store.row_count("veh0"), 3);
//!
//! let dataset = WindowedDatasetAssembler::for_grid(builder.grid()).assemble(&store, 0, 3)?;
//! assert_eq!(dataset.entities, vec!["veh0"]);
//! assert_eq!(dataset.samples[0].dim(), (1, 10, 10, 1));
//! # Ok::<(), displacement_matrix::PipelineError>(())
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]

pub mod builder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod grid;
pub mod normalize;
pub mod record;
pub mod store;
pub mod streaming;
pub mod window;

// Re-exports for convenient access
pub use builder::{AppendOutcome, DisplacementMatrixBuilder, WindowReport, FIRST_RECORD_DWELL};
pub use config::{Boundary, NormalizationStrategy, PipelineConfig, DEFAULT_LOGIT_EPSILON};
pub use dataset::{Dataset, WindowedDatasetAssembler};
pub use error::{PipelineError, Result};
pub use extract::{is_degenerate, SampleExtractor};
pub use grid::SpatialGrid;
pub use normalize::Normalizer;
pub use record::RawPositionRecord;
pub use store::{FileStore, MatrixStore, MemoryStore, TableHandle};
pub use streaming::TraceWindower;
pub use window::{Window, WindowIndexer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
