//! Checkpoint module for resumable runs.
//!
//! Provides:
//! - `Checkpoint`: ledger, partial cache and results of one run
//! - `CheckpointStore`: locking owner with atomic persistence

mod state;
mod store;

pub use state::*;
pub use store::*;
