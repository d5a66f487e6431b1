//! doiharvest DataCite - resumable harvest of the DataCite DOI catalog
//!
//! Cursor-paginated `/dois` requests with retry, per-page checkpoints keyed
//! by the query signature, and incremental Parquet shards.
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use doiharvest_core::ProgressContext;
//! use doiharvest_datacite::{Config, TypeMode, run};
//!
//! let config = Config {
//!     resource_type: "Preprint".into(),
//!     type_mode: TypeMode::Both,
//!     date_start: NaiveDate::from_ymd_opt(2024, 1, 1),
//!     client_ids: vec!["arxiv.content".into()],
//!     ..Default::default()
//! };
//!
//! let summary = run(&config, &ProgressContext::new()).expect("harvest failed");
//! println!("{} rows in {} shards", summary.rows_written, summary.shards_written);
//! ```

pub mod api;
pub mod checkpoint;
pub mod config;
pub mod ndjson;
pub mod pager;
pub mod params;
pub mod runner;
pub mod schema;
pub mod shards;
pub mod transform;

// Re-exports for convenience
pub use api::{Fetcher, Page};
pub use checkpoint::{Checkpoint, CheckpointError, Signature, checkpoint_path, compute_signature};
pub use config::{Config, DateField, Selection, TypeMode};
pub use pager::PassStream;
pub use params::QueryParams;
pub use runner::{HarvestSummary, PassOutcome, PassSummary, run, run_with};
pub use transform::{DoiAccumulator, DoiRow, map_record};
