//! ratingscan - Resumable rating census over a club → player hierarchy.
//!
//! ## Architecture
//!
//! - **Club workers**: a fixed pool draining a bounded club queue; each
//!   worker fetches a club's players and their rating histories
//! - **Collector**: single consumer of worker outcomes; owns the result set
//!   and saves the checkpoint periodically
//! - **Statistics**: after the join barrier, (gender, age) groups get
//!   percentile tables and every player is ranked by current rating
//!
//! ## Resumability
//!
//! - Every finished club and player lands in the checkpoint ledger
//! - Fetched histories are cached per player until the player completes
//! - Saves are atomic (temp file + rename), so a crash never corrupts state
//! - A resumed run reproduces the output of an uninterrupted one

pub mod checkpoint;
pub mod client;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod stats;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointStore, RunSnapshot};
pub use client::{HttpSource, MemorySource, RatingSource};
pub use models::{Config, OutputRecord, Result, RunSummary, ScanError, SourceError};
pub use pipeline::{CensusOutput, CensusPipeline};
pub use pool::{NoopObserver, RunObserver, TracingObserver};
pub use stats::GroupStatistics;
