//! Core data models for ratingscan.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): `entity` and `record`, plain types the engine trusts
//! - B_i (Beliefs): remote data arrives as `Result`, absent values as `Option`
//! - I^R (Resolvable): `config`, every tunable of a run
//! - I^B (Bounded): `error`, failures a run can absorb or must stop on

mod config;
mod entity;
mod error;
mod record;

pub use config::*;
pub use entity::*;
pub use error::*;
pub use record::*;
