//! Pipeline module - the resumable rating census.

mod census;

pub use census::*;
