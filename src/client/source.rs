//! The remote rating source seen by the engine.
//!
//! Pagination and per-request retries are the implementation's business;
//! callers see flattened lists and a single error per call.

use crate::models::{Club, Player, RatingPoint, SourceError};
use async_trait::async_trait;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Read access to clubs, their players and player rating histories.
#[async_trait]
pub trait RatingSource: Send + Sync {
    /// All clubs whose id starts with `prefix` (empty prefix: all clubs).
    async fn list_clubs(&self, prefix: &str) -> SourceResult<Vec<Club>>;

    /// Players registered with a club.
    async fn list_players(&self, club_id: &str) -> SourceResult<Vec<Player>>;

    /// Rating history of a player; `SourceError::NotFound` if the service
    /// has none.
    async fn fetch_history(&self, player_id: &str) -> SourceResult<Vec<RatingPoint>>;
}
