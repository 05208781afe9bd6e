//! In-memory rating source.
//!
//! Serves fixtures and tests: fixed data, injected failures, latency,
//! call counters and the peak number of concurrent calls.

use crate::client::{RatingSource, SourceResult};
use crate::models::{Club, Player, RatingPoint, SourceError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Rating source backed by plain collections.
#[derive(Debug, Default)]
pub struct MemorySource {
    clubs: Vec<Club>,
    players: HashMap<String, Vec<Player>>,
    histories: HashMap<String, Vec<RatingPoint>>,
    /// Club list fails outright
    clubs_unavailable: AtomicBool,
    /// Clubs whose player list fails
    failing_rosters: HashSet<String>,
    /// Remaining injected history failures per player
    history_failures: DashMap<String, u32>,
    latency: Option<Duration>,
    history_calls: AtomicUsize,
    roster_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a call as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a club with its players.
    pub fn with_club(mut self, club: Club, players: Vec<Player>) -> Self {
        self.players.insert(club.id.clone(), players);
        self.clubs.push(club);
        self
    }

    pub fn with_history(mut self, player_id: &str, history: Vec<RatingPoint>) -> Self {
        self.histories.insert(player_id.to_string(), history);
        self
    }

    /// Make the player list of `club_id` fail on every call.
    pub fn with_failing_roster(mut self, club_id: &str) -> Self {
        self.failing_rosters.insert(club_id.to_string());
        self
    }

    /// Make the next `times` history fetches for `player_id` fail.
    pub fn with_history_failures(self, player_id: &str, times: u32) -> Self {
        self.history_failures.insert(player_id.to_string(), times);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_clubs_unavailable(&self, unavailable: bool) {
        self.clubs_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn roster_calls(&self) -> usize {
        self.roster_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Enter a call: track concurrency, then apply the configured latency.
    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

#[async_trait]
impl RatingSource for MemorySource {
    async fn list_clubs(&self, prefix: &str) -> SourceResult<Vec<Club>> {
        let _call = self.enter().await;
        if self.clubs_unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Other("club listing unavailable".to_string()));
        }
        Ok(self
            .clubs
            .iter()
            .filter(|c| c.id.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn list_players(&self, club_id: &str) -> SourceResult<Vec<Player>> {
        let _call = self.enter().await;
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_rosters.contains(club_id) {
            return Err(SourceError::Other(format!("roster of {club_id} unavailable")));
        }
        self.players
            .get(club_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("club {club_id}")))
    }

    async fn fetch_history(&self, player_id: &str) -> SourceResult<Vec<RatingPoint>> {
        let _call = self.enter().await;
        self.history_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(mut remaining) = self.history_failures.get_mut(player_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::Other(format!(
                    "history of {player_id} temporarily unavailable"
                )));
            }
        }

        self.histories
            .get(player_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("history of {player_id}")))
    }
}
